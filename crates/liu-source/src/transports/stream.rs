//! 字节流传输插件.
//!
//! 包装调用方提供的 `Read`, 不可 seek, 总大小未知, 用作直播推流输入.

use std::io::Read;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use liu_core::{LiuError, LiuResult};

use crate::media_source::{MediaSource, SharedReader};
use crate::plugin::{Seekable, TransportPlugin};

/// 字节流传输插件
#[derive(Default)]
pub struct StreamTransport {
    reader: Mutex<Option<SharedReader>>,
}

impl StreamTransport {
    /// 创建字节流传输插件实例 (工厂函数)
    pub fn create() -> LiuResult<Arc<dyn TransportPlugin>> {
        Ok(Arc::new(Self::default()))
    }

    fn current(&self) -> Option<SharedReader> {
        self.reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TransportPlugin for StreamTransport {
    fn name(&self) -> &str {
        "stream"
    }

    fn reset(&self) -> LiuResult<()> {
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    fn set_source(&self, source: &MediaSource) -> LiuResult<()> {
        match source {
            MediaSource::Stream(reader) => {
                *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(reader));
                Ok(())
            }
            _ => Err(LiuError::InvalidParameter("字节流插件只接受 Stream 源".into())),
        }
    }

    /// 忽略 `offset`, 总是从流的当前位置继续读取
    fn read(&self, _offset: Option<u64>, len: usize) -> LiuResult<Bytes> {
        let reader = self
            .current()
            .ok_or_else(|| LiuError::InvalidOperation("未绑定字节流".into()))?;
        let mut reader = reader.lock().unwrap_or_else(|e| e.into_inner());
        let mut buf = BytesMut::zeroed(len);
        let n = loop {
            match reader.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(Bytes::new()),
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 && len > 0 {
            return Err(LiuError::EndOfStream);
        }
        buf.truncate(n);
        Ok(buf.freeze())
    }

    fn seek_to(&self, _offset: u64) -> LiuResult<()> {
        Err(LiuError::InvalidOperation("字节流不支持 seek".into()))
    }

    fn size(&self) -> LiuResult<u64> {
        Ok(0)
    }

    fn seekable(&self) -> Seekable {
        if self.current().is_some() {
            Seekable::Unseekable
        } else {
            Seekable::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_读取直到流末尾() {
        let plugin = StreamTransport::default();
        plugin
            .set_source(&MediaSource::stream(Cursor::new(vec![1u8, 2, 3, 4, 5])))
            .unwrap();
        assert_eq!(plugin.seekable(), Seekable::Unseekable);
        assert_eq!(&plugin.read(Some(100), 3).unwrap()[..], &[1, 2, 3]);
        assert_eq!(&plugin.read(None, 3).unwrap()[..], &[4, 5]);
        assert!(matches!(plugin.read(None, 3), Err(LiuError::EndOfStream)));
        assert!(plugin.seek_to(0).is_err());
    }
}
