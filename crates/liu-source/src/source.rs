//! 数据源 (Source).
//!
//! 将 [`MediaSource`] 描述符解析为协议, 从注册表中选出传输插件,
//! 并向上层提供统一的字节访问与事件转发.

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use liu_core::{LiuError, LiuResult, SeekMode};
use log::{debug, info, warn};

use crate::media_source::MediaSource;
use crate::plugin::{PluginEvent, Seekable, SourceCallback, TransportPlugin};
use crate::registry::SourceRegistry;

/// 可 seek 状态的最大轮询次数
pub const SEEKABLE_RETRY_TIMES: u32 = 20;

/// 可 seek 状态的轮询间隔
pub const SEEKABLE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// 已绑定的插件及其来源信息
#[derive(Default)]
struct SourceState {
    plugin: Option<Arc<dyn TransportPlugin>>,
    plugin_name: String,
    protocol: String,
    uri: String,
    seekable: Option<Seekable>,
}

/// 将插件事件转发给当前注册的接收方
///
/// 插件持有此中继而非最终接收方, 接收方可在插件生命周期内替换.
#[derive(Default)]
struct CallbackRelay {
    sink: RwLock<Option<Arc<dyn SourceCallback>>>,
}

impl SourceCallback for CallbackRelay {
    fn on_event(&self, event: PluginEvent) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match sink {
            Some(sink) => sink.on_event(event),
            None => debug!("丢弃未注册接收方的传输事件: {:?}", event),
        }
    }
}

/// 数据源
pub struct Source {
    registry: Arc<SourceRegistry>,
    state: RwLock<SourceState>,
    relay: Arc<CallbackRelay>,
}

/// 解析描述符得到的协议与规范化 URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub protocol: String,
    pub uri: String,
}

/// 从描述符推导协议
///
/// - 含 `scheme://` 的 URI 取 scheme (小写)
/// - 其他 URI 视为本地路径, 相对路径解析为绝对路径
/// - 文件描述符为 `fd`, 字节流为 `stream`
pub fn parse_protocol(source: &MediaSource) -> LiuResult<ProtocolInfo> {
    match source {
        MediaSource::Uri(uri) => {
            if uri.is_empty() {
                return Err(LiuError::InvalidParameter("URI 为空".into()));
            }
            if let Some(pos) = uri.find("://") {
                let scheme = &uri[..pos];
                if scheme.is_empty() {
                    return Err(LiuError::InvalidParameter(format!("URI 缺少协议名: {}", uri)));
                }
                return Ok(ProtocolInfo {
                    protocol: scheme.to_ascii_lowercase(),
                    uri: uri.clone(),
                });
            }
            let full = std::path::absolute(Path::new(uri))?;
            Ok(ProtocolInfo {
                protocol: "file".into(),
                uri: full.to_string_lossy().into_owned(),
            })
        }
        MediaSource::Fd { fd, offset, size } => {
            if *fd < 0 {
                return Err(LiuError::InvalidParameter(format!("无效的文件描述符: {}", fd)));
            }
            Ok(ProtocolInfo {
                protocol: "fd".into(),
                uri: format!("fd://{}?offset={}&size={}", fd, offset, size),
            })
        }
        MediaSource::Stream(_) => Ok(ProtocolInfo {
            protocol: "stream".into(),
            uri: String::new(),
        }),
    }
}

impl Source {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(SourceState::default()),
            relay: Arc::new(CallbackRelay::default()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SourceState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SourceState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 取出当前插件, 不在持锁状态下调用插件
    fn plugin(&self) -> LiuResult<Arc<dyn TransportPlugin>> {
        self.read_state()
            .plugin
            .clone()
            .ok_or_else(|| LiuError::InvalidOperation("未绑定传输插件".into()))
    }

    /// 注册传输事件接收方
    pub fn set_callback(&self, callback: Arc<dyn SourceCallback>) {
        *self.relay.sink.write().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// 绑定媒体源
    ///
    /// 解析协议后按注册顺序尝试插件, 使用第一个初始化并接受该源的插件.
    /// 同名的旧插件在软重置成功时被复用, 否则释放.
    pub fn set_source(&self, source: &MediaSource) -> LiuResult<()> {
        let info = parse_protocol(source)?;
        let (old_plugin, old_name) = {
            let mut st = self.write_state();
            st.seekable = None;
            st.protocol.clear();
            st.uri.clear();
            (st.plugin.take(), std::mem::take(&mut st.plugin_name))
        };
        debug!("解析协议: {} -> {}", info.protocol, info.uri);

        let normalized = match source {
            MediaSource::Uri(_) => MediaSource::Uri(info.uri.clone()),
            other => other.clone(),
        };

        let mut old_plugin = old_plugin;
        let mut chosen: Option<(Arc<dyn TransportPlugin>, String)> = None;
        for entry in self.registry.find(&info.protocol) {
            let reused = match old_plugin.take() {
                Some(old) if old_name == entry.name => {
                    if old.reset().is_ok() {
                        Some(old)
                    } else {
                        deinit_plugin(old.as_ref());
                        None
                    }
                }
                other => {
                    old_plugin = other;
                    None
                }
            };
            let plugin = match reused {
                Some(p) => p,
                None => match entry.create().and_then(|p| p.init().map(|_| p)) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("传输插件 {} 初始化失败: {}", entry.name, e);
                        continue;
                    }
                },
            };
            plugin.set_callback(Arc::clone(&self.relay) as Arc<dyn SourceCallback>);
            match plugin.set_source(&normalized) {
                Ok(()) => {
                    chosen = Some((plugin, entry.name.clone()));
                    break;
                }
                Err(e) => {
                    warn!("传输插件 {} 不接受该源: {}", entry.name, e);
                    deinit_plugin(plugin.as_ref());
                }
            }
        }
        if let Some(old) = old_plugin {
            deinit_plugin(old.as_ref());
        }

        let (plugin, name) = chosen.ok_or_else(|| {
            LiuError::UnsupportedFormat(format!("没有支持协议 {} 的传输插件", info.protocol))
        })?;
        info!("选中传输插件: {} ({})", name, info.protocol);

        let seekable = Self::resolve_seekable(plugin.as_ref());
        let mut st = self.write_state();
        st.plugin = Some(plugin);
        st.plugin_name = name;
        st.protocol = info.protocol;
        st.uri = info.uri;
        st.seekable = Some(seekable);
        Ok(())
    }

    /// 轮询插件直到可 seek 状态确定, 最终仍不确定时只记录日志
    fn resolve_seekable(plugin: &dyn TransportPlugin) -> Seekable {
        for attempt in 0..SEEKABLE_RETRY_TIMES {
            let seekable = plugin.seekable();
            if seekable != Seekable::Invalid {
                return seekable;
            }
            if attempt + 1 < SEEKABLE_RETRY_TIMES {
                std::thread::sleep(SEEKABLE_RETRY_INTERVAL);
            }
        }
        warn!("可 seek 状态在 {} 次轮询后仍未确定", SEEKABLE_RETRY_TIMES);
        Seekable::Invalid
    }

    pub fn prepare(&self) -> LiuResult<()> {
        self.plugin()?.prepare()
    }

    pub fn start(&self) -> LiuResult<()> {
        self.plugin()?.start()
    }

    /// 停止插件并清空来源信息
    pub fn stop(&self) -> LiuResult<()> {
        let plugin = self.plugin()?;
        let result = plugin.stop();
        let mut st = self.write_state();
        st.seekable = None;
        st.protocol.clear();
        st.uri.clear();
        result
    }

    pub fn pause(&self) -> LiuResult<()> {
        self.plugin()?.pause()
    }

    pub fn resume(&self) -> LiuResult<()> {
        self.plugin()?.resume()
    }

    /// 读取数据, `offset` 为 `None` 时从插件当前位置继续
    pub fn read_data(&self, offset: Option<u64>, len: usize) -> LiuResult<Bytes> {
        self.plugin()?.read(offset, len)
    }

    pub fn seek_to(&self, offset: u64) -> LiuResult<()> {
        self.plugin()?.seek_to(offset)
    }

    pub fn seek_to_time(&self, time_ms: i64, mode: SeekMode) -> LiuResult<()> {
        self.plugin()?.seek_to_time(time_ms, mode)
    }

    /// 总字节数, 0 表示未知
    pub fn size(&self) -> LiuResult<u64> {
        self.plugin()?.size()
    }

    /// 可 seek 状态 (`set_source` 时确定)
    pub fn seekable(&self) -> Seekable {
        self.read_state().seekable.unwrap_or(Seekable::Invalid)
    }

    /// 时长 (微秒), 仅支持时间定位的源可用
    pub fn duration(&self) -> LiuResult<i64> {
        let plugin = self.plugin()?;
        if !plugin.is_seek_to_time_supported() {
            return Err(LiuError::InvalidOperation("该源不支持按时间获取时长".into()));
        }
        plugin.duration()
    }

    pub fn is_seek_to_time_supported(&self) -> bool {
        self.plugin().is_ok_and(|p| p.is_seek_to_time_supported())
    }

    pub fn is_need_pre_download(&self) -> bool {
        self.plugin().is_ok_and(|p| p.is_need_pre_download())
    }

    pub fn set_read_blocking_flag(&self, blocking: bool) {
        if let Ok(plugin) = self.plugin() {
            plugin.set_read_blocking_flag(blocking);
        }
    }

    /// 通知插件解封装已进入逐帧解析阶段
    pub fn notify_parse_frame(&self) {
        if let Ok(plugin) = self.plugin() {
            plugin.on_parse_frame();
        }
    }

    pub fn set_interrupt_state(&self, interrupted: bool) {
        if let Ok(plugin) = self.plugin() {
            plugin.set_interrupt_state(interrupted);
        }
    }

    pub fn bit_rates(&self) -> LiuResult<Vec<u32>> {
        self.plugin()?.bit_rates()
    }

    pub fn select_bit_rate(&self, bit_rate: u32) -> LiuResult<()> {
        self.plugin()?.select_bit_rate(bit_rate)
    }

    /// 当前协议 (未绑定时为空)
    pub fn protocol(&self) -> String {
        self.read_state().protocol.clone()
    }

    /// 规范化后的 URI
    pub fn uri(&self) -> String {
        self.read_state().uri.clone()
    }

    /// 当前插件名称
    pub fn plugin_name(&self) -> String {
        self.read_state().plugin_name.clone()
    }

    /// 释放插件
    pub fn release(&self) {
        let plugin = self.write_state().plugin.take();
        if let Some(plugin) = plugin {
            deinit_plugin(plugin.as_ref());
        }
        *self.write_state() = SourceState::default();
    }
}

/// 释放传输插件, 失败只记录日志
fn deinit_plugin(plugin: &dyn TransportPlugin) {
    if let Err(e) = plugin.deinit() {
        warn!("传输插件 {} 释放失败: {}", plugin.name(), e);
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.release();
    }
}
