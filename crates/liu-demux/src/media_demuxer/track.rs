//! 轨道表.
//!
//! 轨道编号即 [`MediaInfo::tracks`](crate::format::MediaInfo) 的下标, 会话期间不会被单独移除;
//! 选择/取消选择只切换生产状态.

use std::sync::Arc;

use liu_core::{LiuError, LiuResult, MediaType, Meta, tag};

use crate::queue::OutputQueueProducer;
use crate::task::Task;

/// 轨道状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackStatus {
    pub kind: MediaType,
    pub mime: String,
    pub selected: bool,
    pub eos: bool,
    /// 连续申请缓冲区失败次数
    pub error_count: u32,
    /// 是否绑定了输出队列
    pub bound: bool,
}

pub(crate) struct Track {
    pub meta: Meta,
    pub kind: MediaType,
    pub mime: String,
    pub selected: bool,
    pub eos: bool,
    pub error_count: u32,
    /// 本轮 (start/seek 之后) 是否已上报过致命错误
    pub error_reported: bool,
    pub queue: Option<Arc<dyn OutputQueueProducer>>,
    pub task: Option<Arc<Task>>,
}

impl Track {
    pub fn new(meta: Meta, task: Option<Arc<Task>>) -> Self {
        let kind = meta.media_type();
        let mime = meta.mime().unwrap_or_default().to_string();
        Self {
            meta,
            kind,
            mime,
            selected: false,
            eos: false,
            error_count: 0,
            error_reported: false,
            queue: None,
            task,
        }
    }

    pub fn status(&self) -> TrackStatus {
        TrackStatus {
            kind: self.kind,
            mime: self.mime.clone(),
            selected: self.selected,
            eos: self.eos,
            error_count: self.error_count,
            bound: self.queue.is_some(),
        }
    }

    /// 开始新一轮生产: 清除 EOS 与错误计数
    pub fn begin_epoch(&mut self) {
        self.eos = false;
        self.error_count = 0;
        self.error_reported = false;
    }
}

/// 会话元数据与轨道表, 由元数据锁保护
#[derive(Default)]
pub(crate) struct MetaState {
    pub global: Meta,
    pub tracks: Vec<Track>,
    pub video_track: Option<usize>,
    pub audio_track: Option<usize>,
    /// 视频轨道起始时间 (微秒)
    pub video_start_time: i64,
}

impl MetaState {
    pub fn track(&self, track_id: usize) -> LiuResult<&Track> {
        self.tracks
            .get(track_id)
            .ok_or_else(|| invalid_track(track_id, self.tracks.len()))
    }

    pub fn track_mut(&mut self, track_id: usize) -> LiuResult<&mut Track> {
        let count = self.tracks.len();
        self.tracks
            .get_mut(track_id)
            .ok_or_else(|| invalid_track(track_id, count))
    }

    pub fn video_mime(&self) -> Option<&str> {
        self.video_track
            .and_then(|id| self.tracks.get(id))
            .map(|t| t.mime.as_str())
    }

    /// 已绑定输出队列的轨道任务
    pub fn bound_tasks(&self) -> Vec<(usize, Arc<Task>)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.queue.is_some())
            .filter_map(|(id, t)| t.task.as_ref().map(|task| (id, Arc::clone(task))))
            .collect()
    }

    pub fn all_tasks(&self) -> Vec<Arc<Task>> {
        self.tracks.iter().filter_map(|t| t.task.clone()).collect()
    }

    pub fn bound_queues(&self) -> Vec<(usize, Arc<dyn OutputQueueProducer>)> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(id, t)| t.queue.as_ref().map(|q| (id, Arc::clone(q))))
            .collect()
    }

    pub fn begin_epoch(&mut self) {
        self.tracks.iter_mut().for_each(Track::begin_epoch);
    }

    /// 分辨率变化时更新视频轨道宽高
    pub fn update_video_size(&mut self, width: u32, height: u32) {
        if let Some(track) = self.video_track.and_then(|id| self.tracks.get_mut(id)) {
            track.meta.set(tag::VIDEO_WIDTH, width);
            track.meta.set(tag::VIDEO_HEIGHT, height);
        }
    }
}

fn invalid_track(track_id: usize, count: usize) -> LiuError {
    LiuError::InvalidParameter(format!("无效的轨道编号 {} (共 {} 条轨道)", track_id, count))
}
