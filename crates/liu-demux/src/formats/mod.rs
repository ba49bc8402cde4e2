//! 内置格式插件.

pub mod wav;

use crate::registry::FormatRegistry;

pub use wav::{WavFormat, WavProbe};

/// 注册所有内置格式插件与探测器
pub fn register_all(registry: &mut FormatRegistry) {
    registry.register(wav::WAV_FORMAT_NAME, Box::new(WavFormat::create));
    registry.register_probe(Box::new(WavProbe));
}
