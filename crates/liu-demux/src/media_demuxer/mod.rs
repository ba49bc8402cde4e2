//! 媒体解封装引擎.
//!
//! [`MediaDemuxer`] 持有数据源、流解封装器与格式插件, 对外提供两种工作方式:
//! - 拉模式: 调用方选择轨道后反复调用 [`MediaDemuxer::read_sample`]
//! - 推模式: 通过 [`MediaDemuxer::set_output_buffer_queue`] 为轨道绑定输出队列,
//!   `start` 后每条轨道由独立任务持续生产样本
//!
//! 锁顺序: 插件锁 -> 元数据锁 -> DRM 锁. 持有元数据锁时不暂停/停止任务.

mod read_loop;
mod track;

pub use track::TrackStatus;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::BytesMut;
use liu_core::time::{ms_to_us, us_to_ms};
use liu_core::{DrmInfo, LiuError, LiuResult, MediaType, Meta, Sample, SampleFlags, SeekMode, tag};
use liu_source::{MediaSource, Seekable, Source, SourceCallback, SourceRegistry};
use log::{debug, info, warn};

use crate::config::DemuxerConfig;
use crate::drm::DrmInfoSet;
use crate::event::{DemuxerEvent, DrmObserver, EventReceiver};
use crate::format::{DataSource, FormatPlugin, MediaInfo};
use crate::frame_drop::FrameDropPolicy;
use crate::idr::{IdrDetector, NalIdrDetector};
use crate::queue::OutputQueueProducer;
use crate::registry::FormatRegistry;
use crate::state::DemuxerState;
use crate::stream::StreamDemuxer;
use crate::task::Task;

use read_loop::{EventBridge, track_job};
use track::{MetaState, Track};

/// 视频轨道任务名称
pub const VIDEO_TASK_NAME: &str = "DemuxerLoopV";
/// 音频轨道任务名称
pub const AUDIO_TASK_NAME: &str = "DemuxerLoopA";

/// 当前会话的数据源属性
#[derive(Debug, Clone, Copy)]
struct Session {
    seekable: Seekable,
    media_size: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            seekable: Seekable::Invalid,
            media_size: 0,
        }
    }
}

#[derive(Default)]
struct PluginSlot {
    name: String,
    plugin: Option<Box<dyn FormatPlugin>>,
}

impl PluginSlot {
    fn plugin_mut(&mut self) -> LiuResult<&mut (dyn FormatPlugin + 'static)> {
        self.plugin
            .as_deref_mut()
            .ok_or_else(|| LiuError::InvalidOperation("尚未创建格式插件".into()))
    }
}

/// 提供给格式插件的读取接口
struct DataSourceAdapter {
    stream: Arc<StreamDemuxer>,
    session: Session,
}

impl DataSource for DataSourceAdapter {
    fn read_at(&self, offset: i64, buffer: &mut BytesMut, expected_len: usize) -> LiuResult<()> {
        let Session {
            seekable,
            media_size,
        } = self.session;
        let beyond = seekable == Seekable::Seekable && media_size > 0 && offset > media_size as i64;
        if offset < 0 || beyond {
            warn!("读取偏移无效: offset={}, size={}", offset, media_size);
            return Err(LiuError::Unknown(format!("读取偏移无效: {}", offset)));
        }
        self.stream.callback_read_at(offset as u64, buffer, expected_len)
    }

    fn size(&self) -> LiuResult<u64> {
        match self.session.media_size {
            0 => Err(LiuError::WrongState("数据源大小未知".into())),
            size => Ok(size),
        }
    }

    fn seekable(&self) -> Seekable {
        self.session.seekable
    }
}

pub(crate) struct Inner {
    config: DemuxerConfig,
    format_registry: Arc<FormatRegistry>,
    source: Arc<Source>,
    stream: RwLock<Option<Arc<StreamDemuxer>>>,
    session: RwLock<Session>,
    plugin: Mutex<PluginSlot>,
    meta: Mutex<MetaState>,
    drm: RwLock<DrmInfoSet>,
    /// 已产出首帧的任务数
    first_frame: Mutex<usize>,
    first_frame_cond: Condvar,
    frame_drop: Mutex<FrameDropPolicy>,
    event_receiver: RwLock<Option<Arc<dyn EventReceiver>>>,
    drm_observer: RwLock<Option<Arc<dyn DrmObserver>>>,
    idr_detector: RwLock<Arc<dyn IdrDetector>>,
    running: AtomicBool,
    stopped: AtomicBool,
    paused: AtomicBool,
    use_queue: AtomicBool,
    do_prepare: AtomicBool,
    seeked: AtomicBool,
    first_audio: AtomicBool,
}

impl Inner {
    fn meta(&self) -> MutexGuard<'_, MetaState> {
        self.meta.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn plugin(&self) -> MutexGuard<'_, PluginSlot> {
        self.plugin.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drm_read(&self) -> RwLockReadGuard<'_, DrmInfoSet> {
        self.drm.read().unwrap_or_else(|e| e.into_inner())
    }

    fn drm_write(&self) -> RwLockWriteGuard<'_, DrmInfoSet> {
        self.drm.write().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self) -> Session {
        *self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn stream(&self) -> Option<Arc<StreamDemuxer>> {
        self.stream.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn idr_detector(&self) -> Arc<dyn IdrDetector> {
        Arc::clone(&self.idr_detector.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

/// 媒体解封装引擎
pub struct MediaDemuxer {
    inner: Arc<Inner>,
    /// `prepare_frame` 需要等待首帧的任务数
    prepare_target: AtomicUsize,
}

impl MediaDemuxer {
    pub fn new(
        source_registry: Arc<SourceRegistry>,
        format_registry: Arc<FormatRegistry>,
        config: DemuxerConfig,
    ) -> Self {
        let frame_drop = FrameDropPolicy {
            enabled: false,
            frame_rate: 0.0,
            speed: 1.0,
            decode_rate_upper_limit: 0.0,
            threshold: config.decode_rate_threshold,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                format_registry,
                source: Arc::new(Source::new(source_registry)),
                stream: RwLock::new(None),
                session: RwLock::new(Session::default()),
                plugin: Mutex::new(PluginSlot::default()),
                meta: Mutex::new(MetaState::default()),
                drm: RwLock::new(DrmInfoSet::new()),
                first_frame: Mutex::new(0),
                first_frame_cond: Condvar::new(),
                frame_drop: Mutex::new(frame_drop),
                event_receiver: RwLock::new(None),
                drm_observer: RwLock::new(None),
                idr_detector: RwLock::new(Arc::new(NalIdrDetector)),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                use_queue: AtomicBool::new(false),
                do_prepare: AtomicBool::new(false),
                seeked: AtomicBool::new(false),
                first_audio: AtomicBool::new(false),
            }),
            prepare_target: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &DemuxerConfig {
        &self.inner.config
    }

    pub fn set_event_receiver(&self, receiver: Arc<dyn EventReceiver>) {
        *self
            .inner
            .event_receiver
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(receiver);
    }

    /// 注册 DRM 回调, 已知的 DRM 信息会立即上报一次
    pub fn set_drm_callback(&self, observer: Arc<dyn DrmObserver>) {
        *self
            .inner
            .drm_observer
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(observer);
        let known = self.inner.drm_read().snapshot();
        if !known.is_empty() {
            debug!("补报已知的 {} 条 DRM 信息", known.len());
            self.inner.report_drm_infos(&known);
        }
    }

    /// 替换 seek 后使用的 IDR 检测器
    pub fn set_idr_detector(&self, detector: Arc<dyn IdrDetector>) {
        *self
            .inner
            .idr_detector
            .write()
            .unwrap_or_else(|e| e.into_inner()) = detector;
    }

    /// 绑定数据源, 探测格式并解析媒体信息
    ///
    /// 推模式任务运行期间调用返回 [`LiuError::WrongState`].
    pub fn set_data_source(&self, media_source: &MediaSource) -> LiuResult<()> {
        info!("set_data_source: {:?}", media_source);
        if self.inner.running.load(Ordering::Acquire) {
            return Err(LiuError::WrongState("解封装正在运行, 需要先停止".into()));
        }
        let inner = &self.inner;
        let bridge: Arc<dyn SourceCallback> = Arc::new(EventBridge {
            inner: Arc::downgrade(inner),
        });
        inner.source.set_callback(bridge);
        inner.source.set_source(media_source)?;

        let media_size = inner.source.size()?;
        let seekable = inner.source.seekable();
        if seekable == Seekable::Invalid {
            return Err(LiuError::InvalidOperation("无法确定数据源是否可 seek".into()));
        }
        let session = Session {
            seekable,
            media_size,
        };
        *inner.session.write().unwrap_or_else(|e| e.into_inner()) = session;
        info!("数据源大小 {} 字节, 可 seek 状态 {:?}", media_size, seekable);
        if seekable == Seekable::Unseekable {
            info!("上报直播流事件");
            inner.emit(DemuxerEvent::IsLiveStream);
        }

        let stream = if seekable == Seekable::Seekable {
            self.flush()?;
            StreamDemuxer::pull(Arc::clone(&inner.source))
        } else {
            StreamDemuxer::push(Arc::clone(&inner.source), inner.config.clone())
        };
        let stream = Arc::new(stream);
        *inner.stream.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&stream));

        let format = stream.init(
            &inner.source.uri(),
            media_size,
            &inner.format_registry,
            &inner.config,
        )?;

        let media_info = {
            let mut slot = inner.plugin();
            self.init_plugin(&mut slot, &format, &stream, session)?;
            slot.plugin_mut()?.media_info()
        };
        let result = media_info.map(|info| {
            self.init_media_meta(info);
            stream.set_state(DemuxerState::ParseFirstFrame);
        });
        if let Err(e) = &result {
            warn!("解析媒体信息失败: {}", e);
        }

        let drm = inner.plugin().plugin_mut().and_then(|p| p.drm_info());
        if let Ok(infos) = drm {
            if !infos.is_empty() {
                inner.process_drm_infos(&infos);
            }
        }
        result
    }

    /// 复用同名且可软重置的插件, 否则新建; 随后解析头部
    fn init_plugin(
        &self,
        slot: &mut PluginSlot,
        format: &str,
        stream: &Arc<StreamDemuxer>,
        session: Session,
    ) -> LiuResult<()> {
        let reused = slot.name == format
            && slot
                .plugin
                .as_deref_mut()
                .is_some_and(|p| p.reset().is_ok());
        if !reused {
            if let Some(mut old) = slot.plugin.take() {
                if let Err(e) = old.deinit() {
                    warn!("格式插件 {} 释放失败: {}", old.name(), e);
                }
            }
            slot.name.clear();
            let mut plugin = self.inner.format_registry.create(format)?;
            plugin.init()?;
            slot.plugin = Some(plugin);
            slot.name = format.to_string();
        }
        info!("使用格式插件 {}", slot.name);

        stream.set_state(DemuxerState::ParseHeader);
        let adapter = Arc::new(DataSourceAdapter {
            stream: Arc::clone(stream),
            session,
        });
        slot.plugin_mut()?.set_data_source(adapter)
    }

    fn init_media_meta(&self, info: MediaInfo) {
        let inner = &self.inner;
        let mut global = info.general;
        if inner.source.is_seek_to_time_supported() {
            match inner.source.duration() {
                Ok(duration) => {
                    info!("按数据源时长覆盖全局时长: {} us", duration);
                    global.set(tag::MEDIA_DURATION, duration);
                }
                Err(e) => debug!("数据源无法提供时长: {}", e),
            }
        }

        let mut tracks = Vec::with_capacity(info.tracks.len());
        let mut video_track = None;
        let mut audio_track = None;
        let mut video_start_time = 0;
        for (index, meta) in info.tracks.into_iter().enumerate() {
            let kind = meta.media_type();
            let task_name = match kind {
                MediaType::Video => {
                    info!("发现视频轨道 {}: {}", index, meta.mime().unwrap_or("?"));
                    if video_track.is_none() {
                        video_track = Some(index);
                        video_start_time = meta.get_i64(tag::MEDIA_START_TIME).unwrap_or_else(|| {
                            warn!("视频轨道缺少起始时间");
                            0
                        });
                    }
                    Some(VIDEO_TASK_NAME)
                }
                MediaType::Audio => {
                    info!("发现音频轨道 {}: {}", index, meta.mime().unwrap_or("?"));
                    audio_track.get_or_insert(index);
                    Some(AUDIO_TASK_NAME)
                }
                _ => None,
            };
            let task = task_name
                .map(|name| Arc::new(Task::new(name, track_job(Arc::downgrade(inner), index))));
            tracks.push(Track::new(meta, task));
        }

        let old = {
            let mut st = inner.meta();
            let old = std::mem::take(&mut st.tracks);
            st.global = global;
            st.tracks = tracks;
            st.video_track = video_track;
            st.audio_track = audio_track;
            st.video_start_time = video_start_time;
            old
        };
        // 旧任务在锁外回收
        drop(old);
    }

    /// 为轨道绑定输出队列并选中该轨道, 此后引擎工作在推模式
    pub fn set_output_buffer_queue(&self, track_id: usize, producer: Arc<dyn OutputQueueProducer>) -> LiuResult<()> {
        let inner = &self.inner;
        {
            let st = inner.meta();
            st.track(track_id)?;
            inner.use_queue.store(true, Ordering::Release);
            if inner.running.load(Ordering::Acquire) {
                return Err(LiuError::WrongState("解封装正在运行, 需要先停止".into()));
            }
            if st.tracks[track_id].queue.is_some() {
                warn!("轨道 {} 已绑定输出队列, 将被替换", track_id);
            }
        }
        self.inner_select_track(track_id)?;
        inner.meta().track_mut(track_id)?.queue = Some(producer);
        info!("轨道 {} 绑定输出队列", track_id);
        Ok(())
    }

    fn inner_select_track(&self, track_id: usize) -> LiuResult<()> {
        let mut slot = self.inner.plugin();
        slot.plugin_mut()?.select_track(track_id)?;
        let mut st = self.inner.meta();
        let track = st.track_mut(track_id)?;
        track.begin_epoch();
        track.selected = true;
        Ok(())
    }

    /// 选择轨道
    ///
    /// 推模式下只支持切换音频轨道: 旧音频轨道被停止并取消选择, 其输出队列迁移到新轨道.
    pub fn select_track(&self, track_id: usize) -> LiuResult<()> {
        let inner = &self.inner;
        let (kind, current_audio) = {
            let st = inner.meta();
            (st.track(track_id)?.kind, st.audio_track)
        };
        if !inner.use_queue.load(Ordering::Acquire) {
            return self.inner_select_track(track_id);
        }
        if kind != MediaType::Audio {
            return Err(LiuError::WrongState("推模式下只能切换音频轨道".into()));
        }
        if current_audio == Some(track_id) {
            return Ok(());
        }
        info!("切换音频轨道: {:?} -> {}", current_audio, track_id);

        if let Some(old) = current_audio {
            let old_task = inner.meta().track(old)?.task.clone();
            if let Some(task) = old_task {
                task.stop();
            }
            self.unselect_track(old)?;
            let mut st = inner.meta();
            let queue = st.track_mut(old)?.queue.take();
            st.track_mut(track_id)?.queue = queue;
        }
        self.inner_select_track(track_id)?;
        let task = {
            let mut st = inner.meta();
            st.audio_track = Some(track_id);
            st.track(track_id)?.task.clone()
        };
        if inner.running.load(Ordering::Acquire) && !inner.is_paused() {
            if let Some(task) = task {
                task.start()?;
            }
        }
        Ok(())
    }

    /// 取消选择轨道, 推模式下同时停止该轨道的任务
    pub fn unselect_track(&self, track_id: usize) -> LiuResult<()> {
        info!("取消选择轨道 {}", track_id);
        let task = self.inner.meta().track(track_id)?.task.clone();
        if self.inner.use_queue.load(Ordering::Acquire) {
            if let Some(task) = task {
                task.stop();
            }
        }
        self.inner.plugin().plugin_mut()?.unselect_track(track_id)?;
        self.inner.meta().track_mut(track_id)?.selected = false;
        Ok(())
    }

    /// 定位到 `time_ms`, 返回实际到达的时间 (毫秒)
    ///
    /// 无论插件是否成功, 返回前都会清除所有轨道的 EOS 与错误计数.
    pub fn seek_to(&self, time_ms: i64, mode: SeekMode) -> LiuResult<i64> {
        let inner = &self.inner;
        let result = {
            let mut slot = inner.plugin();
            let plugin = slot.plugin_mut()?;
            if inner.source.is_seek_to_time_supported() {
                let source_mode = match mode {
                    SeekMode::ClosestInner => SeekMode::PreviousSync,
                    _ => SeekMode::ClosestSync,
                };
                info!("按时间定位数据源: {} ms, {:?}", time_ms, source_mode);
                inner.source.seek_to_time(time_ms, source_mode).map(|()| time_ms)
            } else {
                let plugin_mode = match mode {
                    SeekMode::ClosestInner => SeekMode::PreviousSync,
                    other => other,
                };
                info!("定位: {} ms, {:?}", time_ms, plugin_mode);
                plugin
                    .seek_to(None, ms_to_us(time_ms), plugin_mode)
                    .map(us_to_ms)
            }
        };
        inner.seeked.store(true, Ordering::Release);
        inner.first_audio.store(true, Ordering::Release);
        inner.meta().begin_epoch();
        info!("定位完成: {:?}", result);
        result
    }

    pub fn global_meta(&self) -> Meta {
        self.inner.meta().global.clone()
    }

    pub fn stream_meta(&self) -> Vec<Meta> {
        self.inner.meta().tracks.iter().map(|t| t.meta.clone()).collect()
    }

    /// 插件提供的用户自定义元数据, 插件报错时返回空表
    pub fn user_meta(&self) -> LiuResult<Meta> {
        let mut slot = self.inner.plugin();
        match slot.plugin_mut()?.user_meta() {
            Ok(meta) => Ok(meta),
            Err(e) => {
                warn!("没有有效的用户元数据: {}", e);
                Ok(Meta::new())
            }
        }
    }

    /// 时长 (毫秒)
    pub fn duration(&self) -> Option<i64> {
        self.inner
            .meta()
            .global
            .get_i64(tag::MEDIA_DURATION)
            .map(us_to_ms)
    }

    pub fn bit_rates(&self) -> LiuResult<Vec<u32>> {
        self.inner.source.bit_rates()
    }

    /// 切换码率, 先重置流解封装器
    pub fn select_bit_rate(&self, bit_rate: u32) -> LiuResult<()> {
        if let Some(stream) = self.inner.stream() {
            stream.reset()?;
        }
        self.inner.source.select_bit_rate(bit_rate)
    }

    /// 已知 DRM 信息快照
    pub fn media_key_system_info(&self) -> Vec<DrmInfo> {
        self.inner.drm_read().snapshot()
    }

    pub fn set_interrupt_state(&self, interrupted: bool) {
        self.inner.source.set_interrupt_state(interrupted);
    }

    fn require_queue_mode(&self, op: &str) -> LiuResult<()> {
        if self.inner.use_queue.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(LiuError::WrongState(format!("未绑定输出队列, 不能调用 {}", op)))
        }
    }

    /// 启动所有已绑定队列的轨道任务
    pub fn start(&self) -> LiuResult<()> {
        self.require_queue_mode("start")?;
        let inner = &self.inner;
        if inner.plugin().plugin.is_none() {
            return Err(LiuError::InvalidParameter("尚未设置数据源".into()));
        }
        if inner.running.load(Ordering::Acquire) {
            debug!("解封装已在运行");
            return Ok(());
        }
        let tasks = {
            let mut st = inner.meta();
            st.begin_epoch();
            st.bound_tasks()
        };
        self.prepare_target.store(tasks.len(), Ordering::Release);
        if tasks.is_empty() {
            debug!("没有可启动的轨道任务");
            return Ok(());
        }
        inner.running.store(true, Ordering::Release);
        inner.stopped.store(false, Ordering::Release);
        inner.paused.store(false, Ordering::Release);
        if let Some(stream) = inner.stream() {
            stream.set_ignore_parse(false);
            stream.start()?;
        }
        for (_, task) in &tasks {
            task.start()?;
        }
        info!("解封装任务已启动, 共 {} 个", tasks.len());
        inner.source.start()?;
        inner.plugin().plugin_mut()?.start()
    }

    fn stop_all_tasks(&self) {
        let inner = &self.inner;
        if let Some(stream) = inner.stream() {
            stream.set_ignore_parse(true);
        }
        if let Err(e) = inner.source.stop() {
            debug!("停止数据源: {}", e);
        }
        let tasks = inner.meta().all_tasks();
        for task in tasks {
            task.stop();
        }
        inner.running.store(false, Ordering::Release);
    }

    pub fn stop(&self) -> LiuResult<()> {
        self.require_queue_mode("stop")?;
        let inner = &self.inner;
        if !inner.running.load(Ordering::Acquire) {
            debug!("解封装已停止");
            return Ok(());
        }
        info!("停止解封装");
        inner.stopped.store(true, Ordering::Release);
        self.stop_all_tasks();
        if let Some(stream) = inner.stream() {
            stream.stop()?;
        }
        inner.plugin().plugin_mut()?.stop()
    }

    /// 暂停所有轨道任务
    ///
    /// 暂停期间临时关闭数据源的阻塞读, 避免任务卡在读取中.
    pub fn pause(&self) -> LiuResult<()> {
        self.require_queue_mode("pause")?;
        let inner = &self.inner;
        info!("暂停解封装");
        inner.paused.store(true, Ordering::Release);
        if let Some(stream) = inner.stream() {
            stream.set_ignore_parse(true);
            stream.pause()?;
        }
        inner.source.set_read_blocking_flag(false);
        if let Err(e) = inner.source.pause() {
            debug!("暂停数据源: {}", e);
        }
        let tasks = inner.meta().all_tasks();
        for task in &tasks {
            task.pause_async();
        }
        for task in &tasks {
            task.pause();
        }
        inner.source.set_read_blocking_flag(true);
        Ok(())
    }

    pub fn resume(&self) -> LiuResult<()> {
        self.require_queue_mode("resume")?;
        let inner = &self.inner;
        info!("恢复解封装");
        if let Some(stream) = inner.stream() {
            stream.resume()?;
            stream.set_ignore_parse(false);
        }
        if let Err(e) = inner.source.resume() {
            debug!("恢复数据源: {}", e);
        }
        if inner.running.load(Ordering::Acquire) {
            let tasks = {
                let st = inner.meta();
                st.bound_tasks()
                    .into_iter()
                    .filter(|(id, _)| !st.tracks[*id].eos)
                    .map(|(_, task)| task)
                    .collect::<Vec<_>>()
            };
            for task in tasks {
                task.start()?;
            }
        }
        inner.paused.store(false, Ordering::Release);
        Ok(())
    }

    /// 清空流缓存与除视频外的输出队列, 并冲刷插件
    pub fn flush(&self) -> LiuResult<()> {
        let inner = &self.inner;
        debug!("flush");
        if let Some(stream) = inner.stream() {
            stream.flush()?;
        }
        let queues = {
            let st = inner.meta();
            let video = st.video_track;
            st.bound_queues()
                .into_iter()
                .filter(|(id, _)| Some(*id) != video)
                .collect::<Vec<_>>()
        };
        for (_, queue) in queues {
            queue.clear();
        }
        let mut slot = inner.plugin();
        match slot.plugin.as_deref_mut() {
            Some(plugin) => plugin.flush(),
            None => Ok(()),
        }
    }

    /// 清空会话: 元数据、输出队列绑定与 DRM 信息
    ///
    /// 从未绑定过输出队列时返回 [`LiuError::WrongState`], 状态保持不变.
    pub fn reset(&self) -> LiuResult<()> {
        self.require_queue_mode("reset")?;
        let inner = &self.inner;
        info!("重置解封装");
        if inner.running.load(Ordering::Acquire) {
            self.stop()?;
        }
        let old = {
            let mut st = inner.meta();
            let old = std::mem::take(&mut *st);
            inner.drm_write().clear();
            old
        };
        drop(old);
        inner.seeked.store(false, Ordering::Release);
        if let Some(stream) = inner.stream() {
            stream.reset()?;
        }
        match inner.plugin().plugin.as_deref_mut() {
            Some(plugin) => plugin.reset(),
            None => Ok(()),
        }
    }

    /// 启动所有任务, 等待每个任务产出首帧 (有上限) 后整体暂停
    pub fn prepare_frame(&self, render_first_frame: bool) -> LiuResult<()> {
        let inner = &self.inner;
        info!("prepare_frame, render_first_frame={}", render_first_frame);
        *inner.first_frame.lock().unwrap_or_else(|e| e.into_inner()) = 0;
        inner.do_prepare.store(true, Ordering::Release);
        let started = self.start();
        if started.is_ok() {
            let target = self.prepare_target.load(Ordering::Acquire);
            let produced = inner.first_frame.lock().unwrap_or_else(|e| e.into_inner());
            let (produced, timeout) = inner
                .first_frame_cond
                .wait_timeout_while(produced, inner.config.first_frame_wait(), |n| *n < target)
                .unwrap_or_else(|e| e.into_inner());
            if timeout.timed_out() {
                warn!("等待首帧超时: {}/{}", *produced, target);
            }
        }
        inner.do_prepare.store(false, Ordering::Release);
        started?;
        self.pause()
    }

    /// 拉模式读取一个样本
    ///
    /// 首次读到流末尾时返回 `Ok` 且样本带 EOS 标志, 此后返回 [`LiuError::EndOfStream`].
    pub fn read_sample(&self, track_id: usize, sample: &mut Sample) -> LiuResult<()> {
        let inner = &self.inner;
        if inner.use_queue.load(Ordering::Acquire) {
            return Err(LiuError::WrongState("推模式下不能调用 read_sample".into()));
        }
        let eos = {
            let st = inner.meta();
            let track = st.track(track_id)?;
            if !track.selected {
                return Err(LiuError::InvalidOperation(format!("轨道 {} 未被选中", track_id)));
            }
            track.eos
        };
        if eos {
            sample.data.clear();
            sample.flags = SampleFlags::EOS;
            return Err(LiuError::EndOfStream);
        }

        let mut result = inner.inner_read_sample(track_id, sample);
        if matches!(result, Err(LiuError::EndOfStream)) {
            sample.flags |= SampleFlags::EOS;
            result = Ok(());
        }
        if result.is_ok() {
            if sample.is_eos() {
                info!("轨道 {} 到达流末尾", track_id);
                sample.data.clear();
                inner.meta().track_mut(track_id)?.eos = true;
            }
            if sample.is_partial() {
                return Err(LiuError::NoMemory(format!(
                    "轨道 {} 的缓冲区容量 {} 不足",
                    track_id,
                    sample.data.capacity()
                )));
            }
        }
        result
    }

    pub fn set_speed(&self, speed: f64) -> LiuResult<()> {
        info!("set_speed: {}", speed);
        if speed <= 0.0 {
            return Err(LiuError::InvalidParameter(format!("播放速度必须为正: {}", speed)));
        }
        self.frame_drop().speed = speed;
        Ok(())
    }

    pub fn optimize_decode_slow(&self, enabled: bool) -> LiuResult<()> {
        info!("optimize_decode_slow: {}", enabled);
        self.frame_drop().enabled = enabled;
        Ok(())
    }

    /// 设置视频解码帧率上限, 非视频轨道忽略
    pub fn set_decode_framerate_upper_limit(&self, limit: u32, track_id: usize) -> LiuResult<()> {
        info!("解码帧率上限 {} (轨道 {})", limit, track_id);
        if self.video_track_id() != Some(track_id) {
            return Ok(());
        }
        if limit == 0 {
            return Err(LiuError::InvalidParameter("解码帧率上限必须为正".into()));
        }
        self.frame_drop().decode_rate_upper_limit = f64::from(limit);
        Ok(())
    }

    /// 设置视频帧率, 非视频轨道忽略
    pub fn set_frame_rate(&self, frame_rate: f64, track_id: usize) -> LiuResult<()> {
        info!("帧率 {} (轨道 {})", frame_rate, track_id);
        if self.video_track_id() != Some(track_id) {
            return Ok(());
        }
        if frame_rate <= 0.0 {
            return Err(LiuError::InvalidParameter(format!("帧率必须为正: {}", frame_rate)));
        }
        self.frame_drop().frame_rate = frame_rate;
        Ok(())
    }

    fn frame_drop(&self) -> MutexGuard<'_, FrameDropPolicy> {
        self.inner.frame_drop.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    /// 数据源不可 seek 时为推流读取
    pub fn is_live(&self) -> bool {
        self.inner.stream().is_some_and(|s| s.is_push())
    }

    pub fn track_count(&self) -> usize {
        self.inner.meta().tracks.len()
    }

    pub fn track_status(&self, track_id: usize) -> Option<TrackStatus> {
        self.inner.meta().tracks.get(track_id).map(|t| t.status())
    }

    pub fn video_track_id(&self) -> Option<usize> {
        self.inner.meta().video_track
    }

    pub fn audio_track_id(&self) -> Option<usize> {
        self.inner.meta().audio_track
    }

    /// 当前格式插件名称
    pub fn format_name(&self) -> Option<String> {
        let slot = self.inner.plugin();
        slot.plugin.as_ref().map(|_| slot.name.clone())
    }
}

impl Drop for MediaDemuxer {
    fn drop(&mut self) {
        debug!("释放解封装引擎");
        let inner = &self.inner;
        {
            let mut st = inner.meta();
            for track in &mut st.tracks {
                track.queue = None;
            }
        }
        if inner.running.load(Ordering::Acquire) {
            inner.stopped.store(true, Ordering::Release);
            self.stop_all_tasks();
        }
        let tasks = inner.meta().all_tasks();
        for task in tasks {
            task.stop();
        }
        let mut slot = inner.plugin();
        if let Some(mut plugin) = slot.plugin.take() {
            if let Err(e) = plugin.deinit() {
                warn!("格式插件 {} 释放失败: {}", plugin.name(), e);
            }
        }
    }
}
