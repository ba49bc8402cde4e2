//! 流解封装器.
//!
//! 位于数据源与格式插件之间: 负责格式探测, 并按 [`DemuxerState`] 把格式插件的
//! 读请求分派到拉模式缓存窗口或推模式累积器. 两种模式在 `set_data_source` 时
//! 按数据源是否可 seek 选定, 之后不再改变.

pub mod data_packer;
pub mod pull;
pub mod push;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use liu_core::{LiuError, LiuResult};
use liu_source::{Seekable, Source};
use log::{debug, info};

use crate::config::DemuxerConfig;
use crate::registry::FormatRegistry;
use crate::state::{DemuxerState, SharedDemuxerState};
use crate::type_finder::TypeFinder;

use pull::PullReader;
use push::PushReader;

/// 具体读取方式
pub enum StreamKind {
    /// 可 seek 数据源
    Pull(PullReader),
    /// 直播/不可 seek 数据源
    Push(PushReader),
}

/// 流解封装器
pub struct StreamDemuxer {
    source: Arc<Source>,
    state: SharedDemuxerState,
    ignore_parse: AtomicBool,
    kind: StreamKind,
}

impl StreamDemuxer {
    /// 拉模式
    pub fn pull(source: Arc<Source>) -> Self {
        Self::with_kind(Arc::clone(&source), StreamKind::Pull(PullReader::new(source)))
    }

    /// 推模式
    pub fn push(source: Arc<Source>, config: DemuxerConfig) -> Self {
        Self::with_kind(
            Arc::clone(&source),
            StreamKind::Push(PushReader::new(source, config)),
        )
    }

    fn with_kind(source: Arc<Source>, kind: StreamKind) -> Self {
        Self {
            source,
            state: SharedDemuxerState::default(),
            ignore_parse: AtomicBool::new(false),
            kind,
        }
    }

    pub fn kind(&self) -> &StreamKind {
        &self.kind
    }

    pub fn is_push(&self) -> bool {
        matches!(self.kind, StreamKind::Push(_))
    }

    pub fn state(&self) -> DemuxerState {
        self.state.get()
    }

    /// 切换状态, 进入逐帧解析时通知数据源
    pub fn set_state(&self, state: DemuxerState) {
        if self.state.set(state) {
            debug!("解封装状态 -> {}", state);
            if state == DemuxerState::ParseFrame {
                self.source.notify_parse_frame();
            }
        }
    }

    fn promote_first_frame(&self) {
        if self.state.promote_first_frame() {
            debug!("解封装状态 -> {}", DemuxerState::ParseFrame);
            self.source.notify_parse_frame();
        }
    }

    /// 暂停期间置位, 读不到数据时返回状态错误而不是重试
    pub fn set_ignore_parse(&self, ignore: bool) {
        self.ignore_parse.store(ignore, Ordering::Release);
    }

    pub fn is_ignore_parse(&self) -> bool {
        self.ignore_parse.load(Ordering::Acquire)
    }

    /// 探测容器格式, 返回格式插件名称
    ///
    /// 推模式会先启动后台读取任务.
    pub fn init(&self, uri: &str, size: u64, registry: &FormatRegistry, config: &DemuxerConfig) -> LiuResult<String> {
        let finder = TypeFinder::new(registry, config);
        let format = match &self.kind {
            StreamKind::Pull(reader) => finder.find_media_type(
                uri,
                size,
                |_, _| true,
                |offset, len| reader.get_range(offset, len).ok(),
            )?,
            StreamKind::Push(reader) => {
                reader.start_reader()?;
                let packer = reader.packer();
                finder.find_media_type(
                    uri,
                    size,
                    |_, min_len| packer.len() >= min_len || packer.is_eos(),
                    |offset, len| Some(packer.peek_available(offset, len)),
                )?
            }
        };
        info!("探测到容器格式: {}", format);
        Ok(format)
    }

    pub fn start(&self) -> LiuResult<()> {
        match &self.kind {
            StreamKind::Push(reader) => reader.resume(),
            StreamKind::Pull(_) => Ok(()),
        }
    }

    pub fn stop(&self) -> LiuResult<()> {
        if let StreamKind::Push(reader) = &self.kind {
            reader.stop();
        }
        Ok(())
    }

    pub fn pause(&self) -> LiuResult<()> {
        if let StreamKind::Push(reader) = &self.kind {
            reader.pause();
        }
        Ok(())
    }

    pub fn resume(&self) -> LiuResult<()> {
        match &self.kind {
            StreamKind::Push(reader) => reader.resume(),
            StreamKind::Pull(_) => Ok(()),
        }
    }

    pub fn flush(&self) -> LiuResult<()> {
        if let StreamKind::Push(reader) = &self.kind {
            reader.flush();
        }
        Ok(())
    }

    pub fn reset(&self) -> LiuResult<()> {
        if let StreamKind::Pull(reader) = &self.kind {
            reader.reset();
        }
        Ok(())
    }

    /// 格式插件的读回调
    ///
    /// 读到的数据追加到 `buffer`.
    pub fn callback_read_at(&self, offset: u64, buffer: &mut BytesMut, expected_len: usize) -> LiuResult<()> {
        match self.state.get() {
            DemuxerState::Null => Err(LiuError::WrongState("解封装器尚未就绪".into())),
            DemuxerState::ParseHeader => self.read_header(offset, buffer, expected_len),
            DemuxerState::ParseFirstFrame | DemuxerState::ParseFrame => {
                let result = self.read_frame(offset, buffer, expected_len);
                if matches!(result, Ok(()) | Err(LiuError::EndOfStream)) {
                    self.promote_first_frame();
                }
                result
            }
        }
    }

    fn read_header(&self, offset: u64, buffer: &mut BytesMut, expected_len: usize) -> LiuResult<()> {
        match &self.kind {
            StreamKind::Pull(reader) => match reader.get_range(offset, expected_len) {
                Ok(data) if !data.is_empty() => {
                    buffer.extend_from_slice(&data);
                    Ok(())
                }
                _ if expected_len == 0 => Err(LiuError::EndOfStream),
                _ => Err(LiuError::NotEnoughData),
            },
            StreamKind::Push(reader) => {
                let packer = reader.packer();
                let wait = reader.config().header_data_wait();
                if packer.is_pre_download() && self.source.seekable() == Seekable::Unseekable {
                    packer.get_or_wait_data_available(offset, expected_len, wait);
                    let data = packer.peek_range(offset, expected_len, wait).ok_or(LiuError::EndOfStream)?;
                    buffer.extend_from_slice(&data);
                    return Ok(());
                }
                if packer.is_empty() && !packer.get_or_wait_data_available(offset, 1, wait) {
                    return Err(LiuError::NotEnoughData);
                }
                let data = packer.peek_range(offset, expected_len, wait).ok_or(LiuError::NotEnoughData)?;
                buffer.extend_from_slice(&data);
                Ok(())
            }
        }
    }

    fn read_frame(&self, offset: u64, buffer: &mut BytesMut, expected_len: usize) -> LiuResult<()> {
        let data: Bytes = match &self.kind {
            StreamKind::Pull(reader) => match reader.get_range(offset, expected_len) {
                Ok(data) => data,
                Err(LiuError::EndOfStream) => return Err(LiuError::EndOfStream),
                Err(e) => {
                    // 帧阶段读取失败按流结束处理
                    debug!("读取 [{}, +{}) 失败, 视为流结束: {}", offset, expected_len, e);
                    return Err(LiuError::EndOfStream);
                }
            },
            StreamKind::Push(reader) => {
                // 推模式忽略请求偏移, 仅首帧按偏移对齐
                let align = self.state.get() == DemuxerState::ParseFirstFrame;
                let wait = reader.config().push_data_wait();
                reader
                    .packer()
                    .get_range(expected_len, offset, align, wait)
                    .ok_or(LiuError::EndOfStream)?
            }
        };
        if data.is_empty() && expected_len > 0 {
            if self.is_ignore_parse() {
                return Err(LiuError::WrongState("暂停中, 稍后重试".into()));
            }
            return Err(LiuError::Again);
        }
        buffer.extend_from_slice(&data);
        Ok(())
    }
}
