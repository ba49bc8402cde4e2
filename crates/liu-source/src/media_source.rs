//! 媒体源描述符.
//!
//! 调用方以 URI、文件描述符或字节流的形式描述输入, 由 [`Source`](crate::Source)
//! 解析出协议并选择传输插件.

use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex};

/// 由调用方提供的共享字节流
pub type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;

/// 媒体源描述符
#[derive(Clone)]
pub enum MediaSource {
    /// URI 或本地路径 (无 `scheme://` 前缀时视为本地文件)
    Uri(String),
    /// 已打开的文件描述符, `size` 为 0 表示直到文件末尾
    Fd { fd: i32, offset: u64, size: u64 },
    /// 不可 seek 的字节流 (直播推流)
    Stream(SharedReader),
}

impl MediaSource {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    /// 包装任意 `Read` 为流式源
    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Self::Stream(Arc::new(Mutex::new(Box::new(reader))))
    }

    /// URI 文本 (用于扩展名探测等); 字节流返回 `None`
    pub fn uri_str(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) => Some(uri.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            Self::Fd { fd, offset, size } => f
                .debug_struct("Fd")
                .field("fd", fd)
                .field("offset", offset)
                .field("size", size)
                .finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
