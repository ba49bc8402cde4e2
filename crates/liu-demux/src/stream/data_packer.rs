//! 推模式字节累积器.
//!
//! 后台读取任务把直播数据块追加进来, 格式插件从读游标处按序取走.
//! 缓冲区首字节对应的绝对偏移记录在 `base` 中, 探测阶段可按绝对偏移窥视.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace};

#[derive(Debug, Default)]
struct PackerState {
    buf: BytesMut,
    /// `buf[0]` 的绝对偏移
    base: u64,
    eos: bool,
    running: bool,
}

impl PackerState {
    fn end(&self) -> u64 {
        self.base + self.buf.len() as u64
    }

    /// `[offset, offset + size)` 中已在缓冲区内的字节数, `offset` 已被取走时为 `None`
    fn available_from(&self, offset: u64) -> Option<usize> {
        if offset < self.base {
            return None;
        }
        Some(self.end().saturating_sub(offset) as usize)
    }

    fn copy(&self, offset: u64, len: usize) -> Bytes {
        let start = (offset - self.base) as usize;
        Bytes::copy_from_slice(&self.buf[start..start + len])
    }
}

/// 推模式字节累积器
#[derive(Debug, Default)]
pub struct DataPacker {
    state: Mutex<PackerState>,
    cond: Condvar,
    pre_download: AtomicBool,
}

impl DataPacker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 在截止时间前等待一次数据变化, 返回是否已超时
    fn wait_until<'a>(
        &self,
        st: MutexGuard<'a, PackerState>,
        deadline: Instant,
    ) -> (MutexGuard<'a, PackerState>, bool) {
        let now = Instant::now();
        if now >= deadline {
            return (st, true);
        }
        let (st, _) = self
            .cond
            .wait_timeout(st, deadline - now)
            .unwrap_or_else(|e| e.into_inner());
        (st, false)
    }

    /// 预下载模式下窥视允许返回不完整的范围
    pub fn set_pre_download(&self, enabled: bool) {
        self.pre_download.store(enabled, Ordering::Release);
    }

    pub fn is_pre_download(&self) -> bool {
        self.pre_download.load(Ordering::Acquire)
    }

    /// 追加一块数据, 缓冲区为空时以 `offset` 作为新的基准偏移
    pub fn push_data(&self, data: &[u8], offset: u64) {
        if data.is_empty() {
            return;
        }
        let mut st = self.lock();
        if st.buf.is_empty() {
            st.base = offset;
        } else if st.end() != offset {
            trace!("数据块偏移不连续: 期望 {}, 实际 {}", st.end(), offset);
        }
        st.buf.extend_from_slice(data);
        drop(st);
        self.cond.notify_all();
    }

    pub fn set_eos(&self) {
        self.lock().eos = true;
        self.cond.notify_all();
        debug!("累积器收到流结束标记");
    }

    pub fn is_eos(&self) -> bool {
        self.lock().eos
    }

    pub fn start(&self) {
        self.lock().running = true;
        self.cond.notify_all();
    }

    /// 停止后所有等待立即返回
    pub fn stop(&self) {
        self.lock().running = false;
        self.cond.notify_all();
    }

    /// 清空缓冲区与流结束标记
    pub fn flush(&self) {
        let mut st = self.lock();
        st.buf.clear();
        st.base = 0;
        st.eos = false;
        drop(st);
        self.cond.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    /// 缓冲字节数
    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    /// 等待 `[offset, offset + size)` 全部到位, 流结束/停止/超时时返回 `false`
    pub fn get_or_wait_data_available(&self, offset: u64, size: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            match st.available_from(offset) {
                None => return false,
                Some(avail) if avail >= size => return true,
                Some(_) => {}
            }
            if st.eos || !st.running {
                return false;
            }
            let (next, timed_out) = self.wait_until(st, deadline);
            if timed_out {
                return false;
            }
            st = next;
        }
    }

    /// 按绝对偏移窥视, 不移动读游标
    ///
    /// 最多等待 `timeout` 让整个范围到位. 范围不完整时, 只有流已结束或处于预下载模式
    /// 才返回已有部分, 否则返回 `None`.
    pub fn peek_range(&self, offset: u64, size: usize, timeout: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            let avail = st.available_from(offset)?;
            if avail >= size {
                return Some(st.copy(offset, size));
            }
            let give_up = st.eos || !st.running;
            let timed_out = if give_up {
                true
            } else {
                let (next, timed_out) = self.wait_until(st, deadline);
                st = next;
                timed_out
            };
            if timed_out {
                let avail = st.available_from(offset)?;
                if avail > 0 && (st.eos || self.is_pre_download()) {
                    return Some(st.copy(offset, avail.min(size)));
                }
                return None;
            }
        }
    }

    /// 不等待地窥视已有数据, 最多 `size` 字节 (格式探测使用)
    pub fn peek_available(&self, offset: u64, size: usize) -> Bytes {
        let st = self.lock();
        match st.available_from(offset) {
            Some(avail) if avail > 0 => st.copy(offset, avail.min(size)),
            _ => Bytes::new(),
        }
    }

    /// 从读游标取走 `size` 字节
    ///
    /// `align` 为 `true` 时先丢弃 `offset` 之前的字节 (首帧对齐到头部之后).
    ///
    /// # 返回
    /// - `Some(bytes)`: 完整范围; 流结束时可能不足 `size`
    /// - `Some(空)`: 等待 `timeout` 后数据仍不足, 或累积器已停止, 未移动游标
    /// - `None`: 流已结束且缓冲区为空
    pub fn get_range(&self, size: usize, offset: u64, align: bool, timeout: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            if align && offset > st.base {
                let skip = ((offset - st.base) as usize).min(st.buf.len());
                st.buf.advance(skip);
                st.base += skip as u64;
            }
            let aligned = !align || st.base >= offset;
            if aligned && st.buf.len() >= size {
                st.base += size as u64;
                let out = st.buf.split_to(size).freeze();
                drop(st);
                self.cond.notify_all();
                return Some(out);
            }
            if st.eos {
                if st.buf.is_empty() {
                    return None;
                }
                let len = st.buf.len();
                st.base += len as u64;
                return Some(st.buf.split_to(len).freeze());
            }
            if !st.running {
                return Some(Bytes::new());
            }
            let (next, timed_out) = self.wait_until(st, deadline);
            if timed_out {
                return Some(Bytes::new());
            }
            st = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const WAIT: Duration = Duration::from_millis(20);

    fn running_packer() -> DataPacker {
        let p = DataPacker::new();
        p.start();
        p
    }

    #[test]
    fn test_按序取走() {
        let p = running_packer();
        p.push_data(b"hello", 0);
        p.push_data(b"world", 5);
        assert_eq!(p.get_range(3, 0, false, WAIT).unwrap(), Bytes::from_static(b"hel"));
        assert_eq!(p.get_range(7, 99, false, WAIT).unwrap(), Bytes::from_static(b"loworld"));
        assert!(p.is_empty());
    }

    #[test]
    fn test_数据不足返回空且不移动游标() {
        let p = running_packer();
        p.push_data(b"abc", 0);
        assert!(p.get_range(8, 0, false, WAIT).unwrap().is_empty());
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_流结束返回剩余与未命中() {
        let p = running_packer();
        p.push_data(b"abc", 0);
        p.set_eos();
        assert_eq!(p.get_range(8, 0, false, WAIT).unwrap(), Bytes::from_static(b"abc"));
        assert!(p.get_range(8, 0, false, WAIT).is_none());
    }

    #[test]
    fn test_首帧对齐丢弃头部() {
        let p = running_packer();
        p.push_data(b"HEADERframe", 0);
        assert_eq!(p.get_range(5, 6, true, WAIT).unwrap(), Bytes::from_static(b"frame"));
    }

    #[test]
    fn test_窥视不移动游标() {
        let p = running_packer();
        p.push_data(b"0123456789", 100);
        assert_eq!(p.peek_range(102, 3, WAIT).unwrap(), Bytes::from_static(b"234"));
        assert!(p.peek_range(108, 5, WAIT).is_none());
        assert!(p.peek_range(50, 1, WAIT).is_none());
        assert_eq!(p.len(), 10);
        assert_eq!(p.peek_available(108, 5), Bytes::from_static(b"89"));
    }

    #[test]
    fn test_预下载允许部分窥视() {
        let p = running_packer();
        p.set_pre_download(true);
        p.push_data(b"0123", 0);
        assert_eq!(p.peek_range(2, 10, WAIT).unwrap(), Bytes::from_static(b"23"));
    }

    #[test]
    fn test_停止时等待立即返回() {
        let p = DataPacker::new();
        let begin = Instant::now();
        assert!(p.get_range(4, 0, false, Duration::from_secs(5)).unwrap().is_empty());
        assert!(!p.get_or_wait_data_available(0, 4, Duration::from_secs(5)));
        assert!(begin.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_等待生产者() {
        let p = Arc::new(running_packer());
        let producer = Arc::clone(&p);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push_data(b"late", 0);
        });
        assert!(p.get_or_wait_data_available(0, 4, Duration::from_secs(5)));
        assert_eq!(p.get_range(4, 0, false, Duration::from_secs(5)).unwrap(), Bytes::from_static(b"late"));
        t.join().unwrap();
    }

    #[test]
    fn test_清空() {
        let p = running_packer();
        p.push_data(b"abc", 0);
        p.set_eos();
        p.flush();
        assert!(p.is_empty());
        assert!(!p.is_eos());
    }
}
