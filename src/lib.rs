//! # Liu (流)
//!
//! 纯 Rust 实现的媒体解封装引擎.
//!
//! - **数据源**: 按 URI / 文件描述符 / 字节流解析协议, 选择传输插件
//! - **流读取**: 可 seek 的点播走拉模式 (单窗口缓存), 直播走推模式 (后台读取 + 数据打包器)
//! - **解封装**: 驱动格式插件, 按轨道生产样本, 处理 seek / 暂停 / DRM / 丢帧
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use liu::core::Sample;
//! use liu::demux::{DemuxerConfig, MediaDemuxer};
//! use liu::source::MediaSource;
//!
//! let demuxer = MediaDemuxer::new(
//!     Arc::new(liu::default_source_registry()),
//!     Arc::new(liu::default_format_registry()),
//!     DemuxerConfig::default(),
//! );
//! demuxer.set_data_source(&MediaSource::uri("test.wav")).unwrap();
//! demuxer.select_track(0).unwrap();
//!
//! let mut sample = Sample::with_capacity(64 * 1024);
//! while demuxer.read_sample(0, &mut sample).is_ok() && !sample.is_eos() {
//!     println!("pts={} len={}", sample.pts, sample.data.len());
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 错误、元数据、样本、DRM 等公共类型 |
//! | `liu-source` | 数据源与传输插件 (file / stream / http) |
//! | `liu-demux` | 流读取、格式插件、解封装引擎 |

pub mod logging;

/// 公共类型
pub use liu_core as core;

/// 数据源层
pub use liu_source as source;

/// 解封装层
pub use liu_demux as demux;

/// 获取 Liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置传输插件的注册表
pub fn default_source_registry() -> liu_source::SourceRegistry {
    let mut registry = liu_source::SourceRegistry::new();
    liu_source::register_all(&mut registry);
    registry
}

/// 创建已注册所有内置格式插件的注册表
pub fn default_format_registry() -> liu_demux::FormatRegistry {
    liu_demux::default_format_registry()
}
