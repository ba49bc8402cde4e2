//! 内置传输插件.

pub mod file;
#[cfg(feature = "http")]
pub mod http;
pub mod stream;

use crate::registry::SourceRegistry;

/// 注册所有内置传输插件
pub fn register_all(registry: &mut SourceRegistry) {
    registry.register("file", &["file", "fd"], file::FileTransport::create);
    registry.register("stream", &["stream"], stream::StreamTransport::create);
    #[cfg(feature = "http")]
    registry.register("http", &["http", "https"], http::HttpTransport::create);
}
