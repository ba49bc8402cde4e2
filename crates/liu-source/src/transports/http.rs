//! HTTP/HTTPS 传输插件.
//!
//! 在后台线程中流式下载响应体到共享缓冲区, 读取方按需取数.
//! 已下载区域支持自由 seek, 前向读取等待数据下载到位.
//! 关闭读阻塞或被中断时, 无数据的读取立即返回空结果.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use liu_core::{LiuError, LiuResult};
use log::{debug, error, info, warn};

use crate::media_source::MediaSource;
use crate::plugin::{PluginEvent, Seekable, SourceCallback, TransportPlugin};

/// 等待数据时的最长单次阻塞, 到期后重新检查阻塞/中断标志
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// 下载块大小
const CHUNK_SIZE: usize = 32 * 1024;

/// HTTP 流式下载共享缓冲区
struct HttpStreamBuffer {
    /// 已下载的数据
    data: Vec<u8>,
    /// 总大小 (来自 Content-Length, None 表示未知)
    total_size: Option<u64>,
    /// 下载是否已结束 (完成或出错)
    finished: bool,
    /// 下载错误信息
    error: Option<String>,
    /// HTTP 状态错误码
    status: Option<u16>,
    /// HTTP 连接是否已建立
    connected: bool,
    /// 是否请求中止下载
    aborted: bool,
}

type Shared = Arc<(Mutex<HttpStreamBuffer>, Condvar)>;

fn lock_buffer(lock: &Mutex<HttpStreamBuffer>) -> MutexGuard<'_, HttpStreamBuffer> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}

/// HTTP 传输插件
pub struct HttpTransport {
    /// 当前下载会话
    shared: Mutex<Option<Shared>>,
    /// 当前读取位置
    position: AtomicU64,
    /// 事件接收方
    callback: Mutex<Option<Arc<dyn SourceCallback>>>,
    /// 无数据时是否阻塞等待
    blocking: AtomicBool,
    /// 是否已被中断
    interrupted: AtomicBool,
    /// 是否处于缓冲中 (用于成对上报缓冲事件)
    buffering: AtomicBool,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            shared: Mutex::new(None),
            position: AtomicU64::new(0),
            callback: Mutex::new(None),
            blocking: AtomicBool::new(true),
            interrupted: AtomicBool::new(false),
            buffering: AtomicBool::new(false),
        }
    }
}

impl HttpTransport {
    /// 创建 HTTP 传输插件实例 (工厂函数)
    pub fn create() -> LiuResult<Arc<dyn TransportPlugin>> {
        Ok(Arc::new(Self::default()))
    }

    fn session(&self) -> LiuResult<Shared> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| LiuError::InvalidOperation("HTTP 会话未建立".into()))
    }

    fn emit(&self, event: PluginEvent) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(cb) = callback {
            cb.on_event(event);
        }
    }

    fn abort_session(&self) {
        let old = self.shared.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(shared) = old {
            let (lock, cvar) = &*shared;
            lock_buffer(lock).aborted = true;
            cvar.notify_all();
        }
        self.position.store(0, Ordering::Release);
    }

    fn set_buffering(&self, buffering: bool) {
        if self.buffering.swap(buffering, Ordering::AcqRel) != buffering {
            self.emit(if buffering {
                PluginEvent::BufferingStart
            } else {
                PluginEvent::BufferingEnd
            });
        }
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.abort_session();
    }
}

impl TransportPlugin for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn deinit(&self) -> LiuResult<()> {
        self.abort_session();
        Ok(())
    }

    fn reset(&self) -> LiuResult<()> {
        self.abort_session();
        self.interrupted.store(false, Ordering::Release);
        self.buffering.store(false, Ordering::Release);
        Ok(())
    }

    fn set_callback(&self, callback: Arc<dyn SourceCallback>) {
        *self.callback.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// 发起请求并等待连接建立或失败
    fn set_source(&self, source: &MediaSource) -> LiuResult<()> {
        let url = match source {
            MediaSource::Uri(uri) => uri.clone(),
            _ => return Err(LiuError::InvalidParameter("HTTP 插件只接受 URI 源".into())),
        };
        self.abort_session();
        info!("正在连接: {}", url);

        let shared: Shared = Arc::new((
            Mutex::new(HttpStreamBuffer {
                data: Vec::new(),
                total_size: None,
                finished: false,
                error: None,
                status: None,
                connected: false,
                aborted: false,
            }),
            Condvar::new(),
        ));
        let worker_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("liu-http".into())
            .spawn(move || http_download_worker(&url, &worker_shared))?;

        let (lock, cvar) = &*shared;
        let mut sb = lock_buffer(lock);
        while !sb.connected && !sb.finished {
            sb = cvar.wait(sb).unwrap_or_else(|e| e.into_inner());
        }
        if let Some(err) = sb.error.clone() {
            let status = sb.status;
            drop(sb);
            match status {
                Some(code) if (400..500).contains(&code) => {
                    self.emit(PluginEvent::ClientError(err.clone()))
                }
                Some(_) => self.emit(PluginEvent::ServerError(err.clone())),
                None => {}
            }
            return Err(LiuError::Io(std::io::Error::other(err)));
        }
        drop(sb);

        *self.shared.lock().unwrap_or_else(|e| e.into_inner()) = Some(shared);
        Ok(())
    }

    fn read(&self, offset: Option<u64>, len: usize) -> LiuResult<Bytes> {
        let shared = self.session()?;
        if let Some(off) = offset {
            self.position.store(off, Ordering::Release);
        }
        if len == 0 {
            return Ok(Bytes::new());
        }
        let pos = self.position.load(Ordering::Acquire) as usize;

        let (lock, cvar) = &*shared;
        let mut sb = lock_buffer(lock);
        loop {
            if pos < sb.data.len() {
                let end = sb.data.len().min(pos + len);
                let out = Bytes::copy_from_slice(&sb.data[pos..end]);
                drop(sb);
                self.position.store(end as u64, Ordering::Release);
                self.set_buffering(false);
                return Ok(out);
            }
            if sb.finished {
                if let Some(ref err) = sb.error {
                    return Err(LiuError::Io(std::io::Error::other(err.clone())));
                }
                return Err(LiuError::EndOfStream);
            }
            if !self.blocking.load(Ordering::Acquire) || self.interrupted.load(Ordering::Acquire) {
                return Ok(Bytes::new());
            }
            drop(sb);
            self.set_buffering(true);
            sb = lock_buffer(lock);
            let (guard, _) = cvar
                .wait_timeout(sb, WAIT_SLICE)
                .unwrap_or_else(|e| e.into_inner());
            sb = guard;
        }
    }

    fn seek_to(&self, offset: u64) -> LiuResult<()> {
        let shared = self.session()?;
        let total = lock_buffer(&shared.0).total_size;
        if let Some(total) = total {
            if offset > total {
                return Err(LiuError::InvalidParameter(format!(
                    "seek 位置 {} 超出大小 {}",
                    offset, total
                )));
            }
        }
        self.position.store(offset, Ordering::Release);
        Ok(())
    }

    fn size(&self) -> LiuResult<u64> {
        let shared = self.session()?;
        let total = lock_buffer(&shared.0).total_size;
        Ok(total.unwrap_or(0))
    }

    /// 有 Content-Length 时可 seek, 否则视为直播流
    fn seekable(&self) -> Seekable {
        match self.session() {
            Ok(shared) => {
                let sb = lock_buffer(&shared.0);
                if !sb.connected {
                    Seekable::Invalid
                } else if sb.total_size.is_some() {
                    Seekable::Seekable
                } else {
                    Seekable::Unseekable
                }
            }
            Err(_) => Seekable::Invalid,
        }
    }

    fn set_read_blocking_flag(&self, blocking: bool) {
        self.blocking.store(blocking, Ordering::Release);
        if let Ok(shared) = self.session() {
            shared.1.notify_all();
        }
    }

    fn set_interrupt_state(&self, interrupted: bool) {
        self.interrupted.store(interrupted, Ordering::Release);
        if let Ok(shared) = self.session() {
            shared.1.notify_all();
        }
    }
}

/// HTTP 后台下载工作线程
///
/// 发起 GET 请求, 流式读取响应体到共享缓冲区, 通过 condvar 通知读取方.
fn http_download_worker(url: &str, shared: &Shared) {
    let (lock, cvar) = &**shared;

    let mut response = match ureq::get(url).call() {
        Ok(resp) => resp,
        Err(e) => {
            let mut sb = lock_buffer(lock);
            if let ureq::Error::StatusCode(code) = &e {
                sb.status = Some(*code);
            }
            sb.error = Some(format!("HTTP 请求失败: {}", e));
            sb.finished = true;
            sb.connected = true;
            cvar.notify_all();
            return;
        }
    };

    let content_length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    {
        let mut sb = lock_buffer(lock);
        sb.total_size = content_length;
        sb.connected = true;
        if let Some(len) = content_length {
            sb.data.reserve((len as usize).min(64 * 1024 * 1024));
        }
        cvar.notify_all();
    }
    info!(
        "HTTP 连接成功{}",
        content_length.map_or(String::new(), |len| format!(", 内容大小: {} 字节", len))
    );

    let mut reader = response.body_mut().as_reader();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if lock_buffer(lock).aborted {
            debug!("HTTP 下载被中止");
            return;
        }
        match std::io::Read::read(&mut reader, &mut buf) {
            Ok(0) => {
                let mut sb = lock_buffer(lock);
                info!("HTTP 下载完成, 共 {} 字节", sb.data.len());
                sb.finished = true;
                cvar.notify_all();
                return;
            }
            Ok(n) => {
                let mut sb = lock_buffer(lock);
                sb.data.extend_from_slice(&buf[..n]);
                cvar.notify_all();
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                warn!("HTTP 读取被打断, 重试");
            }
            Err(e) => {
                let mut sb = lock_buffer(lock);
                error!("HTTP 下载错误: {}", e);
                sb.error = Some(format!("网络读取错误: {}", e));
                sb.finished = true;
                cvar.notify_all();
                return;
            }
        }
    }
}
