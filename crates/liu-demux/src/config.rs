//! 引擎配置.
//!
//! 所有时间常量集中在 [`DemuxerConfig`] 中, 默认值即引擎的标准行为,
//! 可从 TOML 文档覆盖其中任意字段.

use std::time::Duration;

use liu_core::{LiuError, LiuResult};
use serde::{Deserialize, Serialize};

/// 解封装引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxerConfig {
    /// 暂停/忽略解析时轨道循环的空转间隔 (毫秒)
    pub pause_spin_ms: u64,
    /// 生产失败后的重试间隔 (毫秒)
    pub retry_backoff_ms: u64,
    /// 向输出队列申请缓冲区的超时 (毫秒), 0 表示不等待
    pub request_buffer_timeout_ms: u64,
    /// 连续申请缓冲区失败的上限, 达到后上报致命错误
    pub request_failed_retry_times: u32,
    /// `prepare_frame` 等待首帧的上限 (毫秒)
    pub first_frame_wait_ms: u64,
    /// 解码能力余量, 允许帧率 = 上限 * (1 + 该值)
    pub decode_rate_threshold: f64,
    /// 推模式后台读取块大小 (字节)
    pub push_read_size: usize,
    /// 推模式连续空读上限, 超过后视为流结束
    pub push_read_retry_times: u32,
    /// 推模式空读后的重试间隔 (毫秒)
    pub push_read_backoff_ms: u64,
    /// 推模式逐帧读取时等待数据到位的上限 (毫秒)
    pub push_data_wait_ms: u64,
    /// 推模式解析头部时等待所需数据到位的上限 (毫秒)
    pub header_data_wait_ms: u64,
    /// 格式探测读取的最大字节数
    pub probe_size: usize,
    /// 推模式探测时等待首批数据的轮询次数
    pub probe_wait_retry_times: u32,
    /// 探测轮询间隔 (毫秒)
    pub probe_wait_interval_ms: u64,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            pause_spin_ms: 6,
            retry_backoff_ms: 50,
            request_buffer_timeout_ms: 0,
            request_failed_retry_times: 12_000,
            first_frame_wait_ms: 3_000,
            decode_rate_threshold: 0.05,
            push_read_size: 4096,
            push_read_retry_times: 15,
            push_read_backoff_ms: 1,
            push_data_wait_ms: 20,
            header_data_wait_ms: 5_000,
            probe_size: 8192,
            probe_wait_retry_times: 300,
            probe_wait_interval_ms: 10,
        }
    }
}

impl DemuxerConfig {
    /// 从 TOML 文本解析, 缺省字段取默认值
    pub fn from_toml_str(text: &str) -> LiuResult<Self> {
        toml::from_str(text).map_err(|e| LiuError::InvalidParameter(format!("配置解析失败: {}", e)))
    }

    pub fn pause_spin(&self) -> Duration {
        Duration::from_millis(self.pause_spin_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_buffer_timeout(&self) -> Duration {
        Duration::from_millis(self.request_buffer_timeout_ms)
    }

    pub fn first_frame_wait(&self) -> Duration {
        Duration::from_millis(self.first_frame_wait_ms)
    }

    pub fn push_read_backoff(&self) -> Duration {
        Duration::from_millis(self.push_read_backoff_ms)
    }

    pub fn push_data_wait(&self) -> Duration {
        Duration::from_millis(self.push_data_wait_ms)
    }

    pub fn header_data_wait(&self) -> Duration {
        Duration::from_millis(self.header_data_wait_ms)
    }

    pub fn probe_wait_interval(&self) -> Duration {
        Duration::from_millis(self.probe_wait_interval_ms)
    }
}
