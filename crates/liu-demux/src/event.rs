//! 引擎对外事件.

use liu_core::DrmInfo;

/// 致命错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 传输层客户端/服务端错误
    DataSourceIo,
    /// 持续读取失败 (未知错误或重试预算耗尽)
    DataSourceUnknown,
}

/// 引擎事件
#[derive(Debug, Clone, PartialEq)]
pub enum DemuxerEvent {
    /// 不可恢复的数据源错误, 由调用方决定后续处理
    Error(ErrorCode),
    /// 数据源不可 seek, 按直播流处理
    IsLiveStream,
    /// 新发现的 DRM 信息 (已去重)
    DrmInfoUpdated(Vec<DrmInfo>),
    BufferingStart,
    BufferingEnd,
    /// 视频分辨率变化
    ResolutionChange { width: u32, height: u32 },
}

/// 事件接收方
pub trait EventReceiver: Send + Sync {
    fn on_event(&self, event: DemuxerEvent);
}

/// DRM 信息观察者
pub trait DrmObserver: Send + Sync {
    /// 每个不同的 `(uuid, pssh)` 只会回调一次
    fn on_drm_info_changed(&self, infos: &[DrmInfo]);
}
