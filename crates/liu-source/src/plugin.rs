//! 传输插件 (TransportPlugin) trait 定义.
//!
//! 传输插件负责真正的字节 I/O (文件、网络、外部字节流).
//! 所有方法均以 `&self` 调用, 插件自行管理内部可变状态,
//! 以便控制线程在读线程阻塞于 `read` 时仍可调用 `set_read_blocking_flag` 等方法.

use std::sync::Arc;

use bytes::Bytes;
use liu_core::{DrmInfo, LiuError, LiuResult, SeekMode};

use crate::media_source::MediaSource;

/// 可 seek 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seekable {
    /// 尚未确定 (如网络连接未建立)
    Invalid,
    /// 支持按字节偏移随机访问
    Seekable,
    /// 不支持随机访问, 视为直播流
    Unseekable,
}

/// 传输层事件
#[derive(Debug, Clone, PartialEq)]
pub enum PluginEvent {
    /// 客户端错误 (如 HTTP 4xx)
    ClientError(String),
    /// 服务端错误 (如 HTTP 5xx)
    ServerError(String),
    /// 开始缓冲
    BufferingStart,
    /// 缓冲结束
    BufferingEnd,
    /// 发现新的 DRM 信息
    DrmInfoUpdated(Vec<DrmInfo>),
    /// 视频分辨率变化
    ResolutionChange { width: u32, height: u32 },
}

/// 传输事件接收方
pub trait SourceCallback: Send + Sync {
    fn on_event(&self, event: PluginEvent);
}

/// 传输插件 trait
///
/// 使用流程:
/// 1. `init()` 初始化
/// 2. `set_callback()` / `set_source()` 绑定事件接收方和输入
/// 3. `read()` / `seek_to()` 访问数据
/// 4. `deinit()` 释放
pub trait TransportPlugin: Send + Sync {
    /// 插件名称, 用于复用判断
    fn name(&self) -> &str;

    fn init(&self) -> LiuResult<()> {
        Ok(())
    }

    fn deinit(&self) -> LiuResult<()> {
        Ok(())
    }

    /// 软重置, 成功时插件可被下一次 `set_source` 复用
    fn reset(&self) -> LiuResult<()> {
        Ok(())
    }

    fn set_callback(&self, _callback: Arc<dyn SourceCallback>) {}

    /// 绑定输入
    fn set_source(&self, source: &MediaSource) -> LiuResult<()>;

    fn prepare(&self) -> LiuResult<()> {
        Ok(())
    }

    fn start(&self) -> LiuResult<()> {
        Ok(())
    }

    fn stop(&self) -> LiuResult<()> {
        Ok(())
    }

    fn pause(&self) -> LiuResult<()> {
        Ok(())
    }

    fn resume(&self) -> LiuResult<()> {
        Ok(())
    }

    /// 读取最多 `len` 字节
    ///
    /// # 参数
    /// - `offset`: `Some` 时从该位置读取, `None` 时从当前位置继续 (直播读取)
    ///
    /// # 返回
    /// - `Ok(bytes)`: 读取到的数据, 空表示暂时无数据
    /// - `Err(LiuError::EndOfStream)`: 已无更多数据
    fn read(&self, offset: Option<u64>, len: usize) -> LiuResult<Bytes>;

    /// 定位到字节偏移
    fn seek_to(&self, offset: u64) -> LiuResult<()>;

    /// 按时间定位 (仅支持时间定位的插件, 如 HLS)
    fn seek_to_time(&self, _time_ms: i64, _mode: SeekMode) -> LiuResult<()> {
        Err(LiuError::InvalidOperation(format!(
            "{} 不支持按时间定位",
            self.name()
        )))
    }

    /// 总字节数, 0 表示未知
    fn size(&self) -> LiuResult<u64>;

    fn seekable(&self) -> Seekable;

    /// 时长 (微秒), 仅支持时间定位的插件有意义
    fn duration(&self) -> LiuResult<i64> {
        Err(LiuError::InvalidOperation(format!("{} 无法提供时长", self.name())))
    }

    fn is_seek_to_time_supported(&self) -> bool {
        false
    }

    /// 是否需要预下载 (推模式下探测前需等待数据到位)
    fn is_need_pre_download(&self) -> bool {
        false
    }

    /// 设置读取是否允许阻塞等待数据
    fn set_read_blocking_flag(&self, _blocking: bool) {}

    /// 解封装进入逐帧解析阶段的通知
    fn on_parse_frame(&self) {}

    /// 设置中断状态, 中断时阻塞中的读取应尽快返回
    fn set_interrupt_state(&self, _interrupted: bool) {}

    /// 可选码率列表 (自适应流)
    fn bit_rates(&self) -> LiuResult<Vec<u32>> {
        Ok(Vec::new())
    }

    fn select_bit_rate(&self, _bit_rate: u32) -> LiuResult<()> {
        Err(LiuError::InvalidOperation(format!(
            "{} 不支持码率切换",
            self.name()
        )))
    }
}
