//! # liu-source
//!
//! Liu 解封装引擎数据源层.
//!
//! [`Source`] 把 URI、文件描述符或字节流解析为协议, 从 [`SourceRegistry`]
//! 中选出传输插件, 向解封装层提供统一的读取、定位与事件转发.

pub mod media_source;
pub mod plugin;
pub mod registry;
pub mod source;
pub mod transports;

pub use media_source::{MediaSource, SharedReader};
pub use plugin::{PluginEvent, Seekable, SourceCallback, TransportPlugin};
pub use registry::SourceRegistry;
pub use source::Source;
pub use transports::register_all;
