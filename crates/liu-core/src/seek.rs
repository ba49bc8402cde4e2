//! 定位 (seek) 模式.

/// 定位模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeekMode {
    /// 目标时间之前最近的同步帧
    #[default]
    PreviousSync,
    /// 目标时间之后最近的同步帧
    NextSync,
    /// 距目标时间最近的同步帧
    ClosestSync,
    /// 精确定位到目标时间 (由引擎降级为 `PreviousSync` 后交给插件)
    ClosestInner,
}
