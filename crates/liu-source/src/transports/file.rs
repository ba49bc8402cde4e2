//! 本地文件传输插件.
//!
//! 支持 `file` 与 `fd` 协议. 文件描述符通过 `/proc/self/fd` 重新打开,
//! 不接管调用方描述符的所有权.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use liu_core::{LiuError, LiuResult};
use log::debug;

use crate::media_source::MediaSource;
use crate::plugin::{Seekable, TransportPlugin};

/// 已打开文件的读取状态
struct FileState {
    file: File,
    /// 数据区在文件中的起始偏移 (fd 源可指定)
    base: u64,
    /// 数据区大小
    size: u64,
    /// 当前位置 (相对数据区起始)
    position: u64,
}

/// 本地文件传输插件
#[derive(Default)]
pub struct FileTransport {
    state: Mutex<Option<FileState>>,
}

impl FileTransport {
    /// 创建文件传输插件实例 (工厂函数)
    pub fn create() -> LiuResult<Arc<dyn TransportPlugin>> {
        Ok(Arc::new(Self::default()))
    }

    fn lock(&self) -> MutexGuard<'_, Option<FileState>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(path: &str, base: u64, size: u64) -> LiuResult<FileState> {
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();
        if base > total {
            return Err(LiuError::InvalidParameter(format!(
                "偏移 {} 超出文件大小 {}",
                base, total
            )));
        }
        let available = total - base;
        let size = if size == 0 { available } else { size.min(available) };
        file.seek(SeekFrom::Start(base))?;
        debug!("打开文件: {}, base={}, size={}", path, base, size);
        Ok(FileState {
            file,
            base,
            size,
            position: 0,
        })
    }
}

impl TransportPlugin for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    fn reset(&self) -> LiuResult<()> {
        *self.lock() = None;
        Ok(())
    }

    fn deinit(&self) -> LiuResult<()> {
        self.reset()
    }

    fn set_source(&self, source: &MediaSource) -> LiuResult<()> {
        let state = match source {
            MediaSource::Uri(uri) => {
                let path = uri.strip_prefix("file://").unwrap_or(uri);
                Self::open(path, 0, 0)?
            }
            MediaSource::Fd { fd, offset, size } => {
                if *fd < 0 {
                    return Err(LiuError::InvalidParameter(format!("无效的文件描述符: {}", fd)));
                }
                Self::open(&format!("/proc/self/fd/{}", fd), *offset, *size)?
            }
            MediaSource::Stream(_) => {
                return Err(LiuError::InvalidParameter("文件插件不接受字节流".into()));
            }
        };
        *self.lock() = Some(state);
        Ok(())
    }

    fn read(&self, offset: Option<u64>, len: usize) -> LiuResult<Bytes> {
        let mut guard = self.lock();
        let st = guard
            .as_mut()
            .ok_or_else(|| LiuError::InvalidOperation("文件未打开".into()))?;

        if let Some(off) = offset {
            if off != st.position {
                st.file.seek(SeekFrom::Start(st.base + off))?;
                st.position = off;
            }
        }
        if st.position >= st.size {
            return Err(LiuError::EndOfStream);
        }

        let want = len.min((st.size - st.position) as usize);
        let mut buf = BytesMut::zeroed(want);
        let mut filled = 0;
        while filled < want {
            let n = st.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 && want > 0 {
            return Err(LiuError::EndOfStream);
        }
        buf.truncate(filled);
        st.position += filled as u64;
        Ok(buf.freeze())
    }

    fn seek_to(&self, offset: u64) -> LiuResult<()> {
        let mut guard = self.lock();
        let st = guard
            .as_mut()
            .ok_or_else(|| LiuError::InvalidOperation("文件未打开".into()))?;
        if offset > st.size {
            return Err(LiuError::InvalidParameter(format!(
                "seek 位置 {} 超出大小 {}",
                offset, st.size
            )));
        }
        st.file.seek(SeekFrom::Start(st.base + offset))?;
        st.position = offset;
        Ok(())
    }

    fn size(&self) -> LiuResult<u64> {
        self.lock()
            .as_ref()
            .map(|st| st.size)
            .ok_or_else(|| LiuError::InvalidOperation("文件未打开".into()))
    }

    fn seekable(&self) -> Seekable {
        if self.lock().is_some() {
            Seekable::Seekable
        } else {
            Seekable::Invalid
        }
    }
}
