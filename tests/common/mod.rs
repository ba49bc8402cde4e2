//! 集成测试公共设施: 内存传输插件、脚本化格式插件、WAV 生成与事件收集.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use liu::core::{DrmInfo, LiuError, LiuResult, Meta, Sample, SampleFlags, SeekMode, tag};
use liu::demux::probe::SCORE_MAX;
use liu::demux::{
    DataSource, DemuxerConfig, DemuxerEvent, DrmObserver, EventReceiver, FormatPlugin, FormatProbe,
    FormatRegistry, MediaDemuxer, MediaInfo, ProbeScore,
};
use liu::source::{MediaSource, Seekable, SourceCallback, SourceRegistry, TransportPlugin};

/// 脚本格式的魔数
pub const SCRIPT_MAGIC: &[u8; 4] = b"LIUS";
pub const SCRIPT_FORMAT: &str = "script";
/// 每条轨道的样本数
pub const SAMPLES_PER_TRACK: usize = 20;
/// 相邻样本间隔 (微秒)
pub const FRAME_US: i64 = 40_000;
/// 每隔多少个视频样本出现一个 IDR
pub const GOP: usize = 5;

// ============================================================
// 内存传输插件
// ============================================================

/// `mem://` 协议的内存传输插件
pub struct MemoryTransport {
    data: Bytes,
    pos: Mutex<u64>,
    callback: Mutex<Option<Arc<dyn SourceCallback>>>,
}

impl MemoryTransport {
    pub fn new(data: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            data: data.into(),
            pos: Mutex::new(0),
            callback: Mutex::new(None),
        })
    }

    /// 模拟传输层上报事件
    pub fn fire(&self, event: liu::source::PluginEvent) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback.on_event(event);
        }
    }
}

impl TransportPlugin for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn set_callback(&self, callback: Arc<dyn SourceCallback>) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn set_source(&self, source: &MediaSource) -> LiuResult<()> {
        match source.uri_str() {
            Some(uri) if uri.starts_with("mem://") => Ok(()),
            _ => Err(LiuError::InvalidParameter("memory 只接受 mem:// URI".into())),
        }
    }

    fn read(&self, offset: Option<u64>, len: usize) -> LiuResult<Bytes> {
        let mut pos = self.pos.lock().unwrap();
        let start = offset.unwrap_or(*pos);
        if start >= self.data.len() as u64 {
            return Err(LiuError::EndOfStream);
        }
        let start = start as usize;
        let end = (start + len).min(self.data.len());
        *pos = end as u64;
        Ok(self.data.slice(start..end))
    }

    fn seek_to(&self, offset: u64) -> LiuResult<()> {
        *self.pos.lock().unwrap() = offset;
        Ok(())
    }

    fn size(&self) -> LiuResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn seekable(&self) -> Seekable {
        Seekable::Seekable
    }
}

/// 只注册一个内存传输插件的注册表
pub fn memory_registry(transport: &Arc<MemoryTransport>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    let transport = Arc::clone(transport);
    registry.register("memory", &["mem"], move || {
        Ok(Arc::clone(&transport) as Arc<dyn TransportPlugin>)
    });
    registry
}

// ============================================================
// 脚本化格式插件: 轨道 0 为 H.264 视频, 轨道 1 为 AAC 音频
// ============================================================

/// 测试与插件共享的脚本状态
#[derive(Default)]
pub struct Script {
    /// 下一次 `drm_info` 返回的 DRM 信息
    pub pending_drm: Vec<DrmInfo>,
    /// 每条轨道已读出的样本数
    pub cursor: [usize; 2],
    pub selected: [bool; 2],
    pub seeks: Vec<i64>,
    /// 额外的纯音频轨道数 (追加在轨道 1 之后)
    pub extra_audio: usize,
    /// 为真时 reset/deinit 均返回错误
    pub teardown_fails: bool,
    pub deinits: usize,
}

pub type SharedScript = Arc<Mutex<Script>>;

pub struct ScriptFormat {
    script: SharedScript,
    source: Option<Arc<dyn DataSource>>,
}

impl ScriptFormat {
    fn video_payload(index: usize) -> Vec<u8> {
        // Annex B, IDR = 0x65, 非 IDR = 0x41
        let nal = if index % GOP == 0 { 0x65 } else { 0x41 };
        vec![0, 0, 0, 1, nal, index as u8, 0xAA, 0xBB]
    }
}

impl FormatPlugin for ScriptFormat {
    fn name(&self) -> &str {
        SCRIPT_FORMAT
    }

    fn deinit(&mut self) -> LiuResult<()> {
        let mut script = self.script.lock().unwrap();
        script.deinits += 1;
        if script.teardown_fails {
            return Err(LiuError::Unknown("释放失败".into()));
        }
        Ok(())
    }

    fn reset(&mut self) -> LiuResult<()> {
        if self.script.lock().unwrap().teardown_fails {
            return Err(LiuError::Unknown("重置失败".into()));
        }
        Ok(())
    }

    fn set_data_source(&mut self, source: Arc<dyn DataSource>) -> LiuResult<()> {
        let mut head = BytesMut::with_capacity(4);
        source.read_at(0, &mut head, 4)?;
        if head.as_ref() != SCRIPT_MAGIC {
            return Err(LiuError::UnsupportedFormat("不是脚本格式".into()));
        }
        self.source = Some(source);
        Ok(())
    }

    fn media_info(&mut self) -> LiuResult<MediaInfo> {
        let duration = SAMPLES_PER_TRACK as i64 * FRAME_US;
        let extra = self.script.lock().unwrap().extra_audio;
        let mut tracks = vec![
            Meta::new()
                .with(tag::MIME_TYPE, "video/avc")
                .with(tag::MEDIA_START_TIME, 0i64)
                .with(tag::VIDEO_WIDTH, 640u32)
                .with(tag::VIDEO_HEIGHT, 360u32),
            Meta::new().with(tag::MIME_TYPE, "audio/mp4a-latm"),
        ];
        for _ in 0..extra {
            tracks.push(Meta::new().with(tag::MIME_TYPE, "audio/mp4a-latm"));
        }
        Ok(MediaInfo {
            general: Meta::new()
                .with(tag::MEDIA_FORMAT, SCRIPT_FORMAT)
                .with(tag::MEDIA_DURATION, duration),
            tracks,
        })
    }

    fn select_track(&mut self, track_id: usize) -> LiuResult<()> {
        if let Some(flag) = self.script.lock().unwrap().selected.get_mut(track_id) {
            *flag = true;
        }
        Ok(())
    }

    fn unselect_track(&mut self, track_id: usize) -> LiuResult<()> {
        if let Some(flag) = self.script.lock().unwrap().selected.get_mut(track_id) {
            *flag = false;
        }
        Ok(())
    }

    fn next_sample_size(&mut self, _track_id: usize) -> LiuResult<usize> {
        Ok(64)
    }

    fn read_sample(&mut self, track_id: usize, sample: &mut Sample) -> LiuResult<()> {
        let slot = track_id.min(1);
        let index = {
            let mut script = self.script.lock().unwrap();
            let index = script.cursor[slot];
            if index >= SAMPLES_PER_TRACK {
                return Err(LiuError::EndOfStream);
            }
            script.cursor[slot] += 1;
            index
        };
        sample.data.clear();
        if track_id == 0 {
            sample.data.extend_from_slice(&Self::video_payload(index));
            sample.flags = if index % GOP == 0 {
                SampleFlags::SYNC_FRAME
            } else {
                SampleFlags::empty()
            };
            sample.droppable = index % GOP != 0;
        } else {
            sample.data.extend_from_slice(&[0xFF, 0xF1, index as u8]);
            sample.flags = SampleFlags::SYNC_FRAME;
        }
        sample.pts = index as i64 * FRAME_US;
        sample.dts = sample.pts;
        sample.duration = FRAME_US;
        sample.track_id = track_id;
        Ok(())
    }

    fn seek_to(&mut self, _track_id: Option<usize>, time_us: i64, _mode: SeekMode) -> LiuResult<i64> {
        let index = (time_us.max(0) / FRAME_US) as usize;
        let mut script = self.script.lock().unwrap();
        // 视频回退到 GOP 起点之前一帧, 验证 seek 后的 IDR 门控
        let video = index.saturating_sub(1).min(SAMPLES_PER_TRACK);
        script.cursor = [video, index.min(SAMPLES_PER_TRACK)];
        script.seeks.push(time_us);
        Ok(index as i64 * FRAME_US)
    }

    fn drm_info(&mut self) -> LiuResult<Vec<DrmInfo>> {
        Ok(std::mem::take(&mut self.script.lock().unwrap().pending_drm))
    }

    fn user_meta(&mut self) -> LiuResult<Meta> {
        Ok(Meta::new().with("title", "scripted"))
    }
}

struct ScriptProbe;

impl FormatProbe for ScriptProbe {
    fn probe(&self, data: &[u8], _filename: Option<&str>) -> Option<ProbeScore> {
        data.starts_with(SCRIPT_MAGIC).then_some(SCORE_MAX)
    }

    fn format_name(&self) -> &str {
        SCRIPT_FORMAT
    }
}

pub fn script_registry(script: &SharedScript) -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    let script = Arc::clone(script);
    registry.register(
        SCRIPT_FORMAT,
        Box::new(move || {
            Ok(Box::new(ScriptFormat {
                script: Arc::clone(&script),
                source: None,
            }) as Box<dyn FormatPlugin>)
        }),
    );
    registry.register_probe(Box::new(ScriptProbe));
    registry
}

/// 脚本格式的引擎夹具
pub struct Fixture {
    pub demuxer: MediaDemuxer,
    pub transport: Arc<MemoryTransport>,
    pub script: SharedScript,
    pub events: Arc<EventLog>,
}

pub fn script_fixture(config: DemuxerConfig) -> Fixture {
    script_fixture_with(config, Script::default())
}

pub fn script_fixture_with(config: DemuxerConfig, script: Script) -> Fixture {
    let mut data = SCRIPT_MAGIC.to_vec();
    data.resize(256, 0);
    let transport = MemoryTransport::new(data);
    let script = Arc::new(Mutex::new(script));
    let demuxer = MediaDemuxer::new(
        Arc::new(memory_registry(&transport)),
        Arc::new(script_registry(&script)),
        config,
    );
    let events = Arc::new(EventLog::default());
    demuxer.set_event_receiver(events.clone());
    demuxer
        .set_data_source(&MediaSource::uri("mem://script"))
        .expect("打开脚本数据源失败");
    Fixture {
        demuxer,
        transport,
        script,
        events,
    }
}

/// 加快测试节奏的配置
pub fn fast_config() -> DemuxerConfig {
    DemuxerConfig {
        retry_backoff_ms: 5,
        pause_spin_ms: 2,
        first_frame_wait_ms: 2_000,
        ..DemuxerConfig::default()
    }
}

// ============================================================
// 事件与 DRM 收集
// ============================================================

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<DemuxerEvent>>,
}

impl EventLog {
    pub fn snapshot(&self) -> Vec<DemuxerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&DemuxerEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventReceiver for EventLog {
    fn on_event(&self, event: DemuxerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct DrmLog {
    pub calls: Mutex<Vec<Vec<DrmInfo>>>,
}

impl DrmObserver for DrmLog {
    fn on_drm_info_changed(&self, infos: &[DrmInfo]) {
        self.calls.lock().unwrap().push(infos.to_vec());
    }
}

// ============================================================
// WAV
// ============================================================

/// 生成 16 位 PCM WAV 文件内容
pub fn make_wav(pcm: &[u8], channels: u16, sample_rate: u32) -> Vec<u8> {
    let block_align = channels * 2;
    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// 正弦波 PCM S16LE
pub fn sine_s16(sample_rate: u32, freq: f64, frames: usize, channels: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frames * usize::from(channels) * 2);
    for i in 0..frames {
        let t = i as f64 / f64::from(sample_rate);
        let value = ((t * freq * 2.0 * std::f64::consts::PI).sin() * 32767.0) as i16;
        for _ in 0..channels {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
    buf
}

pub fn write_temp_wav(dir: &Path, name: &str, wav: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, wav).expect("写入临时 WAV 失败");
    path.to_string_lossy().to_string()
}

/// 轮询直到条件成立或超时
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
