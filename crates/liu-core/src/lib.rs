//! # liu-core
//!
//! Liu 解封装引擎核心库, 提供错误类型、元数据、样本与 DRM 信息等基础定义.
//!
//! 传输插件、格式插件与引擎本身共享这些类型.

pub mod drm;
pub mod error;
pub mod media_type;
pub mod meta;
pub mod sample;
pub mod seek;
pub mod time;

// 重导出常用类型
pub use drm::DrmInfo;
pub use error::{LiuError, LiuResult};
pub use media_type::MediaType;
pub use meta::{Meta, MetaValue, tag};
pub use sample::{NOPTS_VALUE, Sample, SampleFlags};
pub use seek::SeekMode;
