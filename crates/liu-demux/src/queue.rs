//! 输出队列.
//!
//! 推模式下每条被选中的轨道绑定一个 [`OutputQueueProducer`], 轨道循环向其申请缓冲区、
//! 填充样本并推回. 队列本身由外部持有, 引擎只是生产者.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use liu_core::{LiuError, LiuResult, Sample};

/// 缓冲区申请参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub track_id: usize,
    /// 所需容量 (字节)
    pub capacity: usize,
}

/// 输出队列生产端
pub trait OutputQueueProducer: Send + Sync {
    /// 申请一个容量不小于 `config.capacity` 的空样本
    ///
    /// 超时内无空闲槽位时返回 [`LiuError::NoBuffer`].
    fn request_buffer(&self, config: &BufferConfig, timeout: Duration) -> LiuResult<Sample>;

    /// 推回样本
    ///
    /// `available` 为 `false` 时样本被回收而不投递给消费者.
    fn push_buffer(&self, sample: Sample, available: bool) -> LiuResult<()>;

    /// 清空所有未消费的样本
    fn clear(&self);
}

#[derive(Debug, Default)]
struct QueueState {
    /// 已投递, 等待消费的样本
    ready: VecDeque<Sample>,
    /// 已申请但尚未推回的槽位数
    in_flight: usize,
    /// 被回收 (未投递) 的样本数
    dropped: u64,
}

/// 有界内存样本队列
///
/// 容量按槽位计: 已投递未消费的样本与已申请未推回的缓冲区之和不超过 `capacity`.
#[derive(Debug)]
pub struct SampleQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 取出最早投递的样本
    pub fn pop(&self) -> Option<Sample> {
        let sample = self.lock().ready.pop_front();
        if sample.is_some() {
            self.cond.notify_all();
        }
        sample
    }

    /// 等待至多 `timeout` 取出一个样本
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Sample> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        loop {
            if let Some(sample) = st.ready.pop_front() {
                drop(st);
                self.cond.notify_all();
                return Some(sample);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            st = self
                .cond
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// 已投递未消费的样本数
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ready.is_empty()
    }

    /// 被回收 (推回但未投递) 的样本总数
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

impl OutputQueueProducer for SampleQueue {
    fn request_buffer(&self, config: &BufferConfig, timeout: Duration) -> LiuResult<Sample> {
        let deadline = Instant::now() + timeout;
        let mut st = self.lock();
        while st.ready.len() + st.in_flight >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(LiuError::NoBuffer);
            }
            st = self
                .cond
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        st.in_flight += 1;
        let mut sample = Sample::with_capacity(config.capacity);
        sample.track_id = config.track_id;
        Ok(sample)
    }

    fn push_buffer(&self, sample: Sample, available: bool) -> LiuResult<()> {
        let mut st = self.lock();
        st.in_flight = st.in_flight.saturating_sub(1);
        if available {
            st.ready.push_back(sample);
        } else {
            st.dropped += 1;
        }
        drop(st);
        self.cond.notify_all();
        Ok(())
    }

    fn clear(&self) {
        self.lock().ready.clear();
        self.cond.notify_all();
    }
}
