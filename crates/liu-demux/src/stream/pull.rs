//! 拉模式 (可 seek 数据源) 读取.
//!
//! 所有读取经过唯一的缓存窗口: 窗口内的请求直接拷贝; 只覆盖前缀时拷贝前缀,
//! 再从窗口末尾补读剩余部分并扩展窗口; 完全未命中时直接读取, 仅在尚无窗口时
//! 将结果采纳为窗口. 已有窗口只会被扩展, 不会被替换.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use liu_core::{LiuError, LiuResult};
use liu_source::Source;
use log::{debug, trace, warn};

/// 缓存窗口
#[derive(Debug)]
struct CacheWindow {
    offset: u64,
    data: BytesMut,
}

impl CacheWindow {
    fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    fn contains(&self, offset: u64) -> bool {
        !self.data.is_empty() && offset >= self.offset && offset < self.end()
    }
}

#[derive(Debug, Default)]
struct PullState {
    window: Option<CacheWindow>,
    /// 数据源当前读取位置, 与请求偏移不同时才 seek
    position: u64,
}

/// 拉模式读取器
pub struct PullReader {
    source: Arc<Source>,
    state: Mutex<PullState>,
    backing_reads: AtomicU64,
}

impl PullReader {
    pub fn new(source: Arc<Source>) -> Self {
        Self {
            source,
            state: Mutex::new(PullState::default()),
            backing_reads: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PullState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 已向数据源发起的读取次数
    pub fn backing_reads(&self) -> u64 {
        self.backing_reads.load(Ordering::Relaxed)
    }

    /// 当前窗口的 `(偏移, 长度)`
    pub fn window(&self) -> Option<(u64, usize)> {
        self.lock().window.as_ref().map(|w| (w.offset, w.data.len()))
    }

    /// 清除窗口
    pub fn reset(&self) {
        let mut st = self.lock();
        st.window = None;
        debug!("拉模式缓存窗口已清除");
    }

    /// 读取 `[offset, offset + size)`
    ///
    /// 返回空数据表示数据源暂时无数据.
    pub fn get_range(&self, offset: u64, size: usize) -> LiuResult<Bytes> {
        let mut st = self.lock();
        let hit = st.window.as_ref().is_some_and(|w| w.contains(offset));
        if hit {
            self.read_with_cache(&mut st, offset, size)
        } else {
            self.read_without_cache(&mut st, offset, size)
        }
    }

    fn read_with_cache(&self, st: &mut PullState, offset: u64, size: usize) -> LiuResult<Bytes> {
        let (window_end, prefix) = {
            let Some(window) = st.window.as_ref() else {
                return Err(LiuError::WrongState("缓存窗口不存在".into()));
            };
            let start = (offset - window.offset) as usize;
            let cached = window.data.len() - start;
            if size <= cached {
                trace!("缓存命中: offset={}, size={}", offset, size);
                return Ok(Bytes::copy_from_slice(&window.data[start..start + size]));
            }
            (window.end(), Bytes::copy_from_slice(&window.data[start..]))
        };

        let remain = size - prefix.len();
        match self.pull_data(st, window_end, remain) {
            Ok(extra) => {
                if let Some(window) = st.window.as_mut() {
                    window.data.extend_from_slice(&extra);
                    trace!("缓存窗口扩展至 [{}, {})", window.offset, window.end());
                }
                let mut out = BytesMut::with_capacity(prefix.len() + extra.len());
                out.extend_from_slice(&prefix);
                out.extend_from_slice(&extra);
                Ok(out.freeze())
            }
            // 窗口已到数据末尾, 返回缓存中的部分
            Err(LiuError::EndOfStream) => Ok(prefix),
            Err(e) => Err(e),
        }
    }

    fn read_without_cache(&self, st: &mut PullState, offset: u64, size: usize) -> LiuResult<Bytes> {
        let data = self.pull_data(st, offset, size)?;
        if st.window.is_none() && !data.is_empty() {
            st.window = Some(CacheWindow {
                offset,
                data: BytesMut::from(&data[..]),
            });
            debug!("建立缓存窗口: offset={}, size={}", offset, data.len());
        }
        Ok(data)
    }

    /// 从数据源读取
    fn pull_data(&self, st: &mut PullState, offset: u64, size: usize) -> LiuResult<Bytes> {
        self.backing_reads.fetch_add(1, Ordering::Relaxed);
        if self.source.is_seek_to_time_supported() {
            // 按时间定位的源, 偏移只是不透明的游标
            return absorb_again(self.source.read_data(Some(offset), size));
        }

        let mut len = size;
        let total = self.source.size().unwrap_or(0);
        if total > 0 {
            if offset >= total {
                return Err(LiuError::EndOfStream);
            }
            len = len.min((total - offset) as usize);
        }
        if st.position != offset {
            self.source.seek_to(offset).inspect_err(|e| {
                warn!("数据源 seek 到 {} 失败: {}", offset, e);
            })?;
            st.position = offset;
        }
        let data = absorb_again(self.source.read_data(Some(offset), len))?;
        st.position += data.len() as u64;
        Ok(data)
    }
}

fn absorb_again(result: LiuResult<Bytes>) -> LiuResult<Bytes> {
    match result {
        Err(LiuError::Again) => Ok(Bytes::new()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liu_source::{MediaSource, Seekable, SourceRegistry, TransportPlugin};
    use std::sync::atomic::AtomicUsize;

    /// 内存传输插件, 统计 read 调用次数
    struct MemoryTransport {
        data: Vec<u8>,
        reads: Arc<AtomicUsize>,
    }

    impl TransportPlugin for MemoryTransport {
        fn name(&self) -> &str {
            "memory"
        }

        fn set_source(&self, _source: &MediaSource) -> LiuResult<()> {
            Ok(())
        }

        fn read(&self, offset: Option<u64>, len: usize) -> LiuResult<Bytes> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let start = offset.unwrap_or(0) as usize;
            if start >= self.data.len() {
                return Err(LiuError::EndOfStream);
            }
            let end = (start + len).min(self.data.len());
            Ok(Bytes::copy_from_slice(&self.data[start..end]))
        }

        fn seek_to(&self, _offset: u64) -> LiuResult<()> {
            Ok(())
        }

        fn size(&self) -> LiuResult<u64> {
            Ok(self.data.len() as u64)
        }

        fn seekable(&self) -> Seekable {
            Seekable::Seekable
        }
    }

    fn reader(len: usize) -> (PullReader, Arc<AtomicUsize>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let mut registry = SourceRegistry::new();
        registry.register("memory", &["mem"], move || {
            Ok(Arc::new(MemoryTransport {
                data: data.clone(),
                reads: Arc::clone(&counter),
            }) as Arc<dyn TransportPlugin>)
        });
        let source = Arc::new(Source::new(Arc::new(registry)));
        source.set_source(&MediaSource::uri("mem://test")).unwrap();
        (PullReader::new(source), reads)
    }

    #[test]
    fn test_窗口内重复读取不触发数据源() {
        let (r, reads) = reader(1000);
        let first = r.get_range(0, 100).unwrap();
        let before = reads.load(Ordering::SeqCst);
        let second = r.get_range(0, 100).unwrap();
        assert_eq!(first, second);
        assert_eq!(reads.load(Ordering::SeqCst), before);
        assert_eq!(r.window(), Some((0, 100)));
    }

    #[test]
    fn test_跨越窗口末尾时扩展窗口() {
        let (r, _) = reader(1000);
        r.get_range(0, 100).unwrap();
        let data = r.get_range(50, 100).unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(data[0], 50);
        assert_eq!(r.window(), Some((0, 150)));
    }

    #[test]
    fn test_未命中不替换已有窗口() {
        let (r, _) = reader(1000);
        r.get_range(0, 10).unwrap();
        let data = r.get_range(500, 10).unwrap();
        assert_eq!(data[0], (500 % 251) as u8);
        assert_eq!(r.window(), Some((0, 10)));
    }

    #[test]
    fn test_超出总长度() {
        let (r, _) = reader(100);
        assert!(matches!(r.get_range(100, 10), Err(LiuError::EndOfStream)));
        assert_eq!(r.get_range(95, 10).unwrap().len(), 5);
    }

    #[test]
    fn test_窗口到达末尾返回缓存部分() {
        let (r, _) = reader(100);
        assert_eq!(r.get_range(0, 4096).unwrap().len(), 100);
        assert_eq!(r.get_range(44, 4096).unwrap().len(), 56);
    }

    #[test]
    fn test_重置清除窗口() {
        let (r, _) = reader(100);
        r.get_range(0, 10).unwrap();
        r.reset();
        assert!(r.window().is_none());
    }
}
