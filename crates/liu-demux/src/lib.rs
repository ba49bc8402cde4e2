//! # liu-demux
//!
//! Liu 解封装引擎, 负责容器格式探测、数据读取调度与多轨样本生产.
//!
//! 三层结构: [`liu_source::Source`] 提供字节访问, [`StreamDemuxer`] 按可 seek 状态
//! 选择拉/推读取方式, [`MediaDemuxer`] 驱动格式插件并把样本交给调用方.

pub mod config;
pub mod drm;
pub mod event;
pub mod format;
pub mod formats;
pub mod frame_drop;
pub mod idr;
pub mod media_demuxer;
pub mod probe;
pub mod queue;
pub mod registry;
pub mod state;
pub mod stream;
pub mod task;
pub mod type_finder;

// 重导出常用类型
pub use config::DemuxerConfig;
pub use drm::DrmInfoSet;
pub use event::{DemuxerEvent, DrmObserver, ErrorCode, EventReceiver};
pub use format::{DataSource, FormatPlugin, MediaInfo};
pub use idr::{IdrDetector, NalIdrDetector};
pub use media_demuxer::{MediaDemuxer, TrackStatus};
pub use probe::{FormatProbe, ProbeResult, ProbeScore};
pub use queue::{BufferConfig, OutputQueueProducer, SampleQueue};
pub use registry::FormatRegistry;
pub use state::DemuxerState;
pub use stream::StreamDemuxer;
pub use task::{Task, TaskHandle, TaskState};
pub use type_finder::TypeFinder;

/// 创建注册了全部内置格式插件的注册表
pub fn default_format_registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    formats::register_all(&mut registry);
    registry
}
