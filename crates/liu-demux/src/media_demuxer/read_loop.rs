//! 推模式逐轨道生产循环, 以及样本读取途中的 DRM/事件处理.

use std::sync::atomic::Ordering;
use std::sync::Weak;
use std::time::Duration;

use liu_core::{DrmInfo, LiuError, LiuResult, NOPTS_VALUE, Sample, SampleFlags};
use liu_source::{PluginEvent, Seekable, SourceCallback};
use log::{debug, error, info, warn};

use super::Inner;
use crate::event::{DemuxerEvent, ErrorCode};
use crate::queue::{BufferConfig, OutputQueueProducer};
use crate::task::TaskHandle;

/// 推回样本, 队列拒收只记录日志
fn push(queue: &dyn OutputQueueProducer, sample: Sample, available: bool) {
    if let Err(e) = queue.push_buffer(sample, available) {
        warn!("推回样本失败: {}", e);
    }
}

/// 插件以错误码报告流结束时, 补齐 EOS 样本
fn normalize_eos(result: &LiuResult<()>, sample: &mut Sample) {
    if matches!(result, Err(LiuError::EndOfStream)) {
        sample.flags |= SampleFlags::EOS;
    }
    if sample.is_eos() {
        sample.data.clear();
    }
}

impl Inner {
    /// 轨道任务的一轮作业, 返回下一轮之前的等待时长
    pub(super) fn read_loop(&self, track_id: usize, handle: &TaskHandle) -> Duration {
        let ignore_parse = self.stream().is_none_or(|s| s.is_ignore_parse());
        if ignore_parse || self.is_stopped() || self.is_paused() {
            return self.config.pause_spin();
        }

        let result = self.copy_frame_to_user_queue(track_id, handle);
        let unknown = matches!(result, Err(LiuError::Unknown(_)));
        let budget_exhausted = self
            .meta()
            .track(track_id)
            .is_ok_and(|t| t.error_count >= self.config.request_failed_retry_times);
        if (unknown && !self.is_stopped() && !self.is_paused()) || budget_exhausted {
            self.report_fatal(track_id);
        }

        if result.is_ok() && self.do_prepare.load(Ordering::Acquire) {
            let mut produced = self.first_frame.lock().unwrap_or_else(|e| e.into_inner());
            *produced += 1;
            self.first_frame_cond.notify_all();
            debug!("轨道 {} 首帧就绪, 暂停任务", track_id);
            handle.pause_async();
        }

        match result {
            Ok(()) | Err(LiuError::Again) => Duration::ZERO,
            Err(_) => self.config.retry_backoff(),
        }
    }

    /// 每个 start/seek 周期内每条轨道只上报一次
    fn report_fatal(&self, track_id: usize) {
        let first = match self.meta().track_mut(track_id) {
            Ok(track) => !std::mem::replace(&mut track.error_reported, true),
            Err(_) => false,
        };
        if first {
            error!("轨道 {} 数据源失效, 无法获取样本", track_id);
            self.emit(DemuxerEvent::Error(ErrorCode::DataSourceUnknown));
        }
    }

    /// 生产一个样本并推入轨道的输出队列
    fn copy_frame_to_user_queue(&self, track_id: usize, handle: &TaskHandle) -> LiuResult<()> {
        let queue = self
            .meta()
            .track(track_id)?
            .queue
            .clone()
            .ok_or_else(|| LiuError::InvalidParameter(format!("轨道 {} 未绑定输出队列", track_id)))?;

        let size = {
            let mut slot = self.plugin();
            let plugin = slot.plugin_mut()?;
            match plugin.next_sample_size(track_id) {
                Ok(size) => size,
                Err(LiuError::Unknown(msg)) => return Err(LiuError::Unknown(msg)),
                Err(LiuError::Again) => return Err(LiuError::Again),
                Err(e) => {
                    debug!("轨道 {} 无法获取样本大小: {}", track_id, e);
                    0
                }
            }
        };

        let Some(mut sample) = self.request_buffer(track_id, queue.as_ref(), size) else {
            return Err(LiuError::InvalidParameter(format!("轨道 {} 申请缓冲区失败", track_id)));
        };
        let result = self.inner_read_sample(track_id, &mut sample);
        normalize_eos(&result, &mut sample);

        if self.seeked.load(Ordering::Acquire) {
            let (video, audio, mime) = {
                let meta = self.meta();
                (meta.video_track, meta.audio_track, meta.video_mime().unwrap_or_default().to_string())
            };
            if video.is_some() {
                let is_idr = video == Some(track_id)
                    && result.is_ok()
                    && self.idr_detector().contains_idr(&mime, &sample.data);
                if !is_idr {
                    if audio == Some(track_id) && self.first_audio.swap(false, Ordering::AcqRel) {
                        push(queue.as_ref(), sample, true);
                        return Err(LiuError::Again);
                    }
                    let eos = sample.is_eos();
                    push(queue.as_ref(), sample, eos);
                    self.set_track_eos(track_id, eos);
                    debug!("seek 后等待 IDR 帧, 轨道 {} 的样本未投递", track_id);
                    return Err(LiuError::Again);
                }
                info!("seek 后找到 IDR 帧, 轨道 {}", track_id);
                self.seeked.store(false, Ordering::Release);
            }
        }

        match result {
            Ok(()) | Err(LiuError::EndOfStream) => {
                if sample.is_eos() {
                    self.set_track_eos(track_id, true);
                    handle.stop_async();
                    info!("轨道 {} 到达流末尾", track_id);
                    push(queue.as_ref(), sample, true);
                    return Ok(());
                }
                let drop_it = self.is_buffer_droppable(track_id, &sample);
                push(queue.as_ref(), sample, !drop_it);
                Ok(())
            }
            Err(e) => {
                push(queue.as_ref(), sample, false);
                warn!("轨道 {} 读取样本失败: {}", track_id, e);
                Err(e)
            }
        }
    }

    /// 向输出队列申请缓冲区, 失败时累加轨道错误计数
    fn request_buffer(&self, track_id: usize, queue: &dyn OutputQueueProducer, size: usize) -> Option<Sample> {
        let config = BufferConfig {
            track_id,
            capacity: size,
        };
        let result = queue.request_buffer(&config, self.config.request_buffer_timeout());
        let mut meta = self.meta();
        let track = meta.track_mut(track_id).ok()?;
        match result {
            Ok(sample) => {
                track.error_count = 0;
                Some(sample)
            }
            Err(e) => {
                track.error_count += 1;
                if track.error_count >= self.config.request_failed_retry_times {
                    error!("轨道 {} 连续 {} 次申请缓冲区失败", track_id, track.error_count);
                } else {
                    debug!("轨道 {} 申请缓冲区失败: {}", track_id, e);
                }
                None
            }
        }
    }

    fn set_track_eos(&self, track_id: usize, eos: bool) {
        if let Ok(track) = self.meta().track_mut(track_id) {
            track.eos = eos;
        }
    }

    /// 从格式插件读取样本, 顺带处理新的 DRM 信息和视频起始时间
    pub(super) fn inner_read_sample(&self, track_id: usize, sample: &mut Sample) -> LiuResult<()> {
        let (result, drm) = {
            let mut slot = self.plugin();
            let plugin = slot.plugin_mut()?;
            let result = plugin.read_sample(track_id, sample);
            match &result {
                Ok(()) => {}
                Err(LiuError::EndOfStream) => info!("轨道 {} 读到流末尾", track_id),
                Err(e) => debug!("轨道 {} 读取出错: {}", track_id, e),
            }
            (result, plugin.drm_info())
        };
        match drm {
            Ok(infos) if !infos.is_empty() => self.process_drm_infos(&infos),
            Ok(_) => {}
            Err(e) => debug!("获取 DRM 信息失败: {}", e),
        }
        self.process_video_start_time(track_id, sample);
        result
    }

    /// 时间定位源的视频时间戳需要加上起始时间
    fn process_video_start_time(&self, track_id: usize, sample: &mut Sample) {
        let (video, start) = {
            let meta = self.meta();
            (meta.video_track, meta.video_start_time)
        };
        if video != Some(track_id) || sample.pts == NOPTS_VALUE {
            return;
        }
        if self.source.is_seek_to_time_supported() && self.session().seekable == Seekable::Seekable {
            sample.pts += start;
        }
    }

    fn is_buffer_droppable(&self, track_id: usize, sample: &Sample) -> bool {
        if self.meta().video_track != Some(track_id) {
            return false;
        }
        let policy = *self.frame_drop.lock().unwrap_or_else(|e| e.into_inner());
        let drop_it = policy.should_drop(sample.droppable);
        if drop_it {
            debug!(
                "丢弃视频帧: 帧率 {} 速度 {} 解码上限 {} pts {}",
                policy.frame_rate, policy.speed, policy.decode_rate_upper_limit, sample.pts
            );
        }
        drop_it
    }

    /// 去重后上报新的 DRM 信息
    pub(super) fn process_drm_infos(&self, infos: &[DrmInfo]) {
        let added = self.drm_write().merge(infos);
        if added.is_empty() {
            debug!("DRM 信息无更新");
            return;
        }
        info!("发现 {} 条新的 DRM 信息", added.len());
        self.report_drm_infos(&added);
        self.emit(DemuxerEvent::DrmInfoUpdated(added));
    }

    pub(super) fn report_drm_infos(&self, infos: &[DrmInfo]) {
        let observer = self
            .drm_observer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match observer {
            Some(observer) => observer.on_drm_info_changed(infos),
            None => debug!("未注册 DRM 回调, 暂存 DRM 信息"),
        }
    }

    pub(super) fn emit(&self, event: DemuxerEvent) {
        let receiver = self
            .event_receiver
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match receiver {
            Some(receiver) => receiver.on_event(event),
            None => debug!("未注册事件接收方, 丢弃事件: {:?}", event),
        }
    }

    /// 传输层事件
    fn on_source_event(&self, event: PluginEvent) {
        match event {
            PluginEvent::DrmInfoUpdated(infos) => self.process_drm_infos(&infos),
            PluginEvent::ClientError(msg) | PluginEvent::ServerError(msg) => {
                error!("数据源 I/O 错误: {}", msg);
                self.emit(DemuxerEvent::Error(ErrorCode::DataSourceIo));
            }
            PluginEvent::BufferingStart => self.emit(DemuxerEvent::BufferingStart),
            PluginEvent::BufferingEnd => self.emit(DemuxerEvent::BufferingEnd),
            PluginEvent::ResolutionChange { width, height } => {
                debug!("视频分辨率变化: {}x{}", width, height);
                self.meta().update_video_size(width, height);
                self.emit(DemuxerEvent::ResolutionChange { width, height });
            }
        }
    }
}

/// 把传输层事件转给引擎, 不延长引擎生命周期
pub(super) struct EventBridge {
    pub(super) inner: Weak<Inner>,
}

impl SourceCallback for EventBridge {
    fn on_event(&self, event: PluginEvent) {
        match self.inner.upgrade() {
            Some(inner) => inner.on_source_event(event),
            None => debug!("引擎已释放, 丢弃传输事件"),
        }
    }
}

/// 轨道任务作业
pub(super) fn track_job(inner: Weak<Inner>, track_id: usize) -> crate::task::Job {
    Box::new(move |handle: &TaskHandle| match inner.upgrade() {
        Some(inner) => inner.read_loop(track_id, handle),
        None => {
            handle.stop_async();
            Duration::ZERO
        }
    })
}
