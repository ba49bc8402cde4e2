//! 解封装状态机.
//!
//! `Null -> ParseHeader -> ParseFirstFrame -> ParseFrame`, 只能前进,
//! 唯一的回退是显式重置回 `Null`. 流解封装器与格式插件通过读回调共享此状态.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 解封装状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DemuxerState {
    /// 未就绪, 拒绝一切读取
    Null = 0,
    /// 探测/解析头部, 只允许范围读取
    ParseHeader = 1,
    /// 解析首帧
    ParseFirstFrame = 2,
    /// 逐帧解析
    ParseFrame = 3,
}

impl DemuxerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ParseHeader,
            2 => Self::ParseFirstFrame,
            3 => Self::ParseFrame,
            _ => Self::Null,
        }
    }

    /// 是否处于样本读取阶段
    pub fn is_parsing_frames(&self) -> bool {
        matches!(self, Self::ParseFirstFrame | Self::ParseFrame)
    }
}

impl fmt::Display for DemuxerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::ParseHeader => "parse_header",
            Self::ParseFirstFrame => "parse_first_frame",
            Self::ParseFrame => "parse_frame",
        };
        write!(f, "{name}")
    }
}

/// 可跨线程共享的解封装状态
#[derive(Debug)]
pub struct SharedDemuxerState(AtomicU8);

impl Default for SharedDemuxerState {
    fn default() -> Self {
        Self(AtomicU8::new(DemuxerState::Null as u8))
    }
}

impl SharedDemuxerState {
    pub fn get(&self) -> DemuxerState {
        DemuxerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// 切换状态
    ///
    /// 只接受前进或重置回 `Null`; 后退请求被忽略并返回 `false`.
    pub fn set(&self, next: DemuxerState) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if next != DemuxerState::Null && (next as u8) < current {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// 重置回 `Null`
    pub fn reset(&self) {
        self.0.store(DemuxerState::Null as u8, Ordering::Release);
    }

    /// 若当前为 `ParseFirstFrame` 则提升为 `ParseFrame`, 返回是否发生了提升
    pub fn promote_first_frame(&self) -> bool {
        self.0
            .compare_exchange(
                DemuxerState::ParseFirstFrame as u8,
                DemuxerState::ParseFrame as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
