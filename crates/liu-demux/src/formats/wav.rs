//! WAV (RIFF WAVE) 格式插件.
//!
//! 支持 PCM 与 IEEE 浮点 WAV, 通过引擎的 [`DataSource`] 读取, 可用于拉模式与直播推流.
//!
//! WAV 文件结构:
//! ```text
//! RIFF header:  "RIFF" + file_size-8 + "WAVE"
//! fmt  chunk:   "fmt " + chunk_size + audio_format + channels + sample_rate
//!              + byte_rate + block_align + bits_per_sample
//! data chunk:   "data" + data_size + PCM samples...
//! ```

use std::io::Cursor;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::BytesMut;
use liu_core::{LiuError, LiuResult, MediaType, Meta, Sample, SampleFlags, SeekMode, tag};
use liu_source::Seekable;
use log::{debug, warn};

use crate::format::{DataSource, FormatPlugin, MediaInfo};
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};

/// 插件名称
pub const WAV_FORMAT_NAME: &str = "wav";
/// 轨道 mime
pub const MIME_AUDIO_RAW: &str = "audio/raw";

const WAV_FORMAT_PCM: u16 = 0x0001;
const WAV_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAV_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// 每个样本包含的采样块数
const FRAMES_PER_PACKET: usize = 1024;

/// 跳过未知块时允许的最大块数
const MAX_CHUNKS: usize = 64;

/// 解析后的 fmt/data 信息
#[derive(Debug, Clone, Copy)]
struct WavHeader {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
    /// data 块在流中的起始偏移
    data_offset: u64,
    /// data 块大小, `None` 表示未知 (直播流)
    data_size: Option<u64>,
}

impl WavHeader {
    fn total_frames(&self) -> Option<u64> {
        self.data_size.map(|s| s / u64::from(self.block_align))
    }

    fn duration_us(&self) -> Option<i64> {
        self.total_frames()
            .map(|frames| (frames as i128 * 1_000_000 / i128::from(self.sample_rate)) as i64)
    }

    fn frames_to_us(&self, frames: u64) -> i64 {
        (frames as i128 * 1_000_000 / i128::from(self.sample_rate)) as i64
    }

    fn pcm_encoding(&self) -> &'static str {
        match (self.audio_format, self.bits_per_sample) {
            (WAV_FORMAT_IEEE_FLOAT, 32) => "f32le",
            (WAV_FORMAT_IEEE_FLOAT, 64) => "f64le",
            (_, 8) => "u8",
            (_, 16) => "s16le",
            (_, 24) => "s24le",
            _ => "s32le",
        }
    }
}

/// WAV 格式插件
#[derive(Default)]
pub struct WavFormat {
    source: Option<Arc<dyn DataSource>>,
    header: Option<WavHeader>,
    /// 当前读取位置 (相对于 data 块起始)
    data_pos: u64,
    selected: bool,
}

impl WavFormat {
    /// 创建 WAV 格式插件实例 (工厂函数)
    pub fn create() -> LiuResult<Box<dyn FormatPlugin>> {
        Ok(Box::new(Self::default()))
    }

    fn source(&self) -> LiuResult<&Arc<dyn DataSource>> {
        self.source
            .as_ref()
            .ok_or_else(|| LiuError::WrongState("WAV: 尚未绑定数据源".into()))
    }

    fn header(&self) -> LiuResult<&WavHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| LiuError::WrongState("WAV: 头部尚未解析".into()))
    }

    fn check_track(&self, track_id: usize) -> LiuResult<()> {
        if track_id != 0 {
            return Err(LiuError::InvalidParameter(format!(
                "WAV: 无效的轨道编号 {}",
                track_id
            )));
        }
        Ok(())
    }

    /// 读取恰好 `len` 字节的头部数据
    fn read_exact(source: &dyn DataSource, offset: u64, len: usize) -> LiuResult<BytesMut> {
        let mut buf = BytesMut::with_capacity(len);
        while buf.len() < len {
            let before = buf.len();
            source.read_at((offset + before as u64) as i64, &mut buf, len - before)?;
            if buf.len() == before {
                return Err(LiuError::NotEnoughData);
            }
        }
        Ok(buf)
    }

    fn parse_header(source: &dyn DataSource) -> LiuResult<WavHeader> {
        let riff = Self::read_exact(source, 0, 12)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(LiuError::UnsupportedFormat("WAV: 不是有效的 RIFF/WAVE 数据".into()));
        }
        debug!("检测到 RIFF/WAVE 数据");

        let mut pos = 12u64;
        let mut fmt: Option<(u16, u16, u32, u16, u16)> = None;
        for _ in 0..MAX_CHUNKS {
            let chunk = Self::read_exact(source, pos, 8)?;
            let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let chunk_size = u64::from(Cursor::new(&chunk[4..8]).read_u32::<LittleEndian>()?);
            pos += 8;

            match &id {
                b"fmt " => {
                    if chunk_size < 16 {
                        return Err(LiuError::UnsupportedFormat("WAV: fmt 块大小不足 16 字节".into()));
                    }
                    let body = Self::read_exact(source, pos, 16)?;
                    let mut rd = Cursor::new(&body[..]);
                    let mut audio_format = rd.read_u16::<LittleEndian>()?;
                    let channels = rd.read_u16::<LittleEndian>()?;
                    let sample_rate = rd.read_u32::<LittleEndian>()?;
                    let _byte_rate = rd.read_u32::<LittleEndian>()?;
                    let block_align = rd.read_u16::<LittleEndian>()?;
                    let bits_per_sample = rd.read_u16::<LittleEndian>()?;
                    if audio_format == WAV_FORMAT_EXTENSIBLE {
                        audio_format = if bits_per_sample == 32 && chunk_size >= 40 {
                            Self::extensible_sub_format(source, pos)?
                        } else {
                            WAV_FORMAT_PCM
                        };
                    }
                    debug!(
                        "fmt: format={}, channels={}, rate={}, block_align={}, bits={}",
                        audio_format, channels, sample_rate, block_align, bits_per_sample,
                    );
                    fmt = Some((audio_format, channels, sample_rate, block_align, bits_per_sample));
                }
                b"data" => {
                    let Some((audio_format, channels, sample_rate, block_align, bits_per_sample)) = fmt
                    else {
                        return Err(LiuError::UnsupportedFormat("WAV: data 块出现在 fmt 块之前".into()));
                    };
                    if !matches!(audio_format, WAV_FORMAT_PCM | WAV_FORMAT_IEEE_FLOAT) {
                        return Err(LiuError::UnsupportedFormat(format!(
                            "WAV: 不支持的格式码 0x{:04X}",
                            audio_format
                        )));
                    }
                    if channels == 0 || sample_rate == 0 || block_align == 0 {
                        return Err(LiuError::UnsupportedFormat("WAV: fmt 参数无效".into()));
                    }
                    // 直播流的 data 大小常填 0 或 0xFFFFFFFF
                    let data_size = match chunk_size {
                        0 | 0xFFFF_FFFF => None,
                        n => Some(n),
                    };
                    debug!("data: offset={}, size={:?}", pos, data_size);
                    return Ok(WavHeader {
                        audio_format,
                        channels,
                        sample_rate,
                        block_align,
                        bits_per_sample,
                        data_offset: pos,
                        data_size,
                    });
                }
                _ => warn!(
                    "跳过未知块: '{}', 大小={}",
                    String::from_utf8_lossy(&id),
                    chunk_size
                ),
            }
            // 块要求偶数对齐
            pos += chunk_size + (chunk_size & 1);
        }
        Err(LiuError::UnsupportedFormat("WAV: 未找到 data 块".into()))
    }

    /// WAVE_FORMAT_EXTENSIBLE 的子格式 GUID 前两字节即格式码
    fn extensible_sub_format(source: &dyn DataSource, fmt_pos: u64) -> LiuResult<u16> {
        let guid = Self::read_exact(source, fmt_pos + 24, 2)?;
        Ok(Cursor::new(&guid[..]).read_u16::<LittleEndian>()?)
    }

    /// 下一个样本的字节数, 已读完时为 0
    fn packet_len(&self) -> LiuResult<usize> {
        let header = self.header()?;
        let ba = usize::from(header.block_align);
        let full = ba * FRAMES_PER_PACKET;
        Ok(match header.data_size {
            Some(size) => {
                let remaining = size.saturating_sub(self.data_pos) as usize;
                (full.min(remaining) / ba) * ba
            }
            None => full,
        })
    }

    fn general_meta(header: &WavHeader) -> Meta {
        let bitrate = i64::from(header.sample_rate) * i64::from(header.block_align) * 8;
        let mut meta = Meta::new()
            .with(tag::MEDIA_FORMAT, WAV_FORMAT_NAME)
            .with(tag::MEDIA_BITRATE, bitrate);
        if let Some(d) = header.duration_us() {
            meta.set(tag::MEDIA_DURATION, d);
        }
        meta
    }

    fn track_meta(header: &WavHeader) -> Meta {
        let mut meta = Meta::new()
            .with(tag::MIME_TYPE, MIME_AUDIO_RAW)
            .with(tag::MEDIA_TYPE, MediaType::Audio.as_str())
            .with(tag::AUDIO_SAMPLE_RATE, header.sample_rate)
            .with(tag::AUDIO_CHANNEL_COUNT, u32::from(header.channels))
            .with(tag::AUDIO_BITS_PER_SAMPLE, u32::from(header.bits_per_sample))
            .with("pcm_encoding", header.pcm_encoding())
            .with(tag::MEDIA_START_TIME, 0i64);
        if let Some(d) = header.duration_us() {
            meta.set(tag::MEDIA_DURATION, d);
        }
        meta
    }
}

impl FormatPlugin for WavFormat {
    fn name(&self) -> &str {
        WAV_FORMAT_NAME
    }

    fn reset(&mut self) -> LiuResult<()> {
        *self = Self::default();
        Ok(())
    }

    fn deinit(&mut self) -> LiuResult<()> {
        self.reset()
    }

    fn set_data_source(&mut self, source: Arc<dyn DataSource>) -> LiuResult<()> {
        let header = Self::parse_header(source.as_ref())?;
        debug!(
            "WAV 打开完成: {} Hz, {} 声道, {} 位, 总采样数={:?}",
            header.sample_rate,
            header.channels,
            header.bits_per_sample,
            header.total_frames(),
        );
        self.header = Some(header);
        self.source = Some(source);
        self.data_pos = 0;
        Ok(())
    }

    fn media_info(&mut self) -> LiuResult<MediaInfo> {
        let header = self.header()?;
        Ok(MediaInfo {
            general: Self::general_meta(header),
            tracks: vec![Self::track_meta(header)],
        })
    }

    fn select_track(&mut self, track_id: usize) -> LiuResult<()> {
        self.check_track(track_id)?;
        self.selected = true;
        Ok(())
    }

    fn unselect_track(&mut self, track_id: usize) -> LiuResult<()> {
        self.check_track(track_id)?;
        self.selected = false;
        Ok(())
    }

    fn next_sample_size(&mut self, track_id: usize) -> LiuResult<usize> {
        self.check_track(track_id)?;
        self.packet_len()
    }

    fn read_sample(&mut self, track_id: usize, sample: &mut Sample) -> LiuResult<()> {
        self.check_track(track_id)?;
        let header = *self.header()?;
        let len = self.packet_len()?;
        sample.track_id = track_id;
        if len == 0 {
            sample.data.clear();
            sample.flags = SampleFlags::EOS;
            return Ok(());
        }
        if sample.data.capacity() < len {
            sample.flags |= SampleFlags::PARTIAL_FRAME;
            return Ok(());
        }

        let offset = header.data_offset + self.data_pos;
        sample.data.clear();
        match self.source()?.read_at(offset as i64, &mut sample.data, len) {
            Ok(()) => {}
            Err(LiuError::EndOfStream) => {
                sample.data.clear();
                sample.flags = SampleFlags::EOS;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        // 短读时丢弃不完整的采样块
        let ba = usize::from(header.block_align);
        let aligned = (sample.data.len() / ba) * ba;
        sample.data.truncate(aligned);
        if aligned == 0 {
            return Err(LiuError::Again);
        }

        let frame_index = self.data_pos / u64::from(header.block_align);
        let frames = (aligned / ba) as u64;
        sample.pts = header.frames_to_us(frame_index);
        sample.dts = sample.pts;
        sample.duration = header.frames_to_us(frame_index + frames) - sample.pts;
        sample.flags = SampleFlags::SYNC_FRAME;
        sample.droppable = false;
        self.data_pos += aligned as u64;
        Ok(())
    }

    fn seek_to(&mut self, _track_id: Option<usize>, time_us: i64, _mode: SeekMode) -> LiuResult<i64> {
        let header = *self.header()?;
        if self.source()?.seekable() != Seekable::Seekable {
            return Err(LiuError::InvalidOperation("WAV: 数据源不可 seek".into()));
        }
        let target = time_us.max(0) as i128 * i128::from(header.sample_rate) / 1_000_000;
        let mut frame = target as u64;
        if let Some(total) = header.total_frames() {
            frame = frame.min(total);
        }
        self.data_pos = frame * u64::from(header.block_align);
        let real = header.frames_to_us(frame);
        debug!("WAV seek: 目标 {} us, 实际 {} us, 字节偏移={}", time_us, real, self.data_pos);
        Ok(real)
    }

    fn flush(&mut self) -> LiuResult<()> {
        Ok(())
    }
}

/// WAV 格式探测器
pub struct WavProbe;

impl FormatProbe for WavProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return Some(SCORE_MAX);
        }
        let lower = filename?.to_ascii_lowercase();
        (lower.ends_with(".wav") || lower.ends_with(".wave")).then_some(SCORE_EXTENSION)
    }

    fn format_name(&self) -> &str {
        WAV_FORMAT_NAME
    }
}
