//! 推模式 (直播/不可 seek 数据源) 读取.
//!
//! 后台任务 `DataReader` 不断从数据源当前位置读取定长数据块, 连同递增的绝对偏移
//! 推入 [`DataPacker`]; 格式插件从累积器的读游标处按序取数据.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use liu_core::{LiuError, LiuResult};
use liu_source::Source;
use log::{error, info, trace};

use crate::config::DemuxerConfig;
use crate::stream::data_packer::DataPacker;
use crate::task::{Task, TaskHandle};

/// 读取任务名称
pub const READER_TASK_NAME: &str = "DataReader";

/// 推模式读取器
pub struct PushReader {
    source: Arc<Source>,
    packer: Arc<DataPacker>,
    media_offset: Arc<AtomicU64>,
    task: Mutex<Option<Task>>,
    config: DemuxerConfig,
}

impl PushReader {
    pub fn new(source: Arc<Source>, config: DemuxerConfig) -> Self {
        let packer = Arc::new(DataPacker::new());
        packer.start();
        Self {
            source,
            packer,
            media_offset: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
            config,
        }
    }

    pub fn packer(&self) -> &Arc<DataPacker> {
        &self.packer
    }

    /// 已推入累积器的字节数 (暂停后从 0 重新计数)
    pub fn media_offset(&self) -> u64 {
        self.media_offset.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DemuxerConfig {
        &self.config
    }

    /// 创建 (若尚未创建) 并启动读取任务
    pub fn start_reader(&self) -> LiuResult<()> {
        self.packer.set_pre_download(self.source.is_need_pre_download());
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        let task = slot.get_or_insert_with(|| {
            let mut job = ReadJob {
                source: Arc::clone(&self.source),
                packer: Arc::clone(&self.packer),
                media_offset: Arc::clone(&self.media_offset),
                retry_times: 0,
                config: self.config.clone(),
            };
            Task::new(READER_TASK_NAME, Box::new(move |handle| job.run_once(handle)))
        });
        info!("推模式读取任务启动");
        task.start()
    }

    fn stop_reader(&self) {
        let slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = slot.as_ref() {
            task.stop();
        }
    }

    /// 暂停: 停止累积器与读取任务, 偏移归零
    pub fn pause(&self) {
        info!("推模式读取暂停");
        self.packer.stop();
        self.media_offset.store(0, Ordering::Release);
        self.stop_reader();
    }

    /// 恢复: 重新启动累积器与 (已创建的) 读取任务, 从数据源当前位置继续
    pub fn resume(&self) -> LiuResult<()> {
        info!("推模式读取恢复");
        self.packer.start();
        let slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(task) => task.start(),
            None => Ok(()),
        }
    }

    pub fn stop(&self) {
        info!("推模式读取停止");
        self.packer.stop();
        self.media_offset.store(0, Ordering::Release);
        self.stop_reader();
    }

    /// 清空累积器, 不停止读取任务
    pub fn flush(&self) {
        self.packer.flush();
    }
}

impl Drop for PushReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 读取任务的一轮作业
struct ReadJob {
    source: Arc<Source>,
    packer: Arc<DataPacker>,
    media_offset: Arc<AtomicU64>,
    retry_times: u32,
    config: DemuxerConfig,
}

impl ReadJob {
    fn finish(&mut self, handle: &TaskHandle) -> Duration {
        handle.stop_async();
        self.retry_times = 0;
        self.packer.set_eos();
        Duration::ZERO
    }

    fn run_once(&mut self, handle: &TaskHandle) -> Duration {
        let data = match self.source.read_data(None, self.config.push_read_size) {
            Ok(data) => data,
            Err(LiuError::EndOfStream) => {
                info!("推模式读取到达流末尾");
                return self.finish(handle);
            }
            Err(LiuError::Again) => bytes::Bytes::new(),
            Err(e) => {
                error!("推模式读取失败: {}", e);
                return self.config.push_read_backoff();
            }
        };

        if data.is_empty() {
            if self.retry_times >= self.config.push_read_retry_times {
                error!("推模式连续 {} 次读取为空, 视为流结束", self.retry_times);
                return self.finish(handle);
            }
            self.retry_times += 1;
            return self.config.push_read_backoff();
        }
        self.retry_times = 0;

        let offset = self.media_offset.fetch_add(data.len() as u64, Ordering::AcqRel);
        trace!("推入数据块: offset={}, size={}", offset, data.len());
        self.packer.push_data(&data, offset);
        Duration::ZERO
    }
}
