//! 格式插件 (FormatPlugin) 接口定义.
//!
//! 格式插件解析具体容器格式, 通过引擎提供的 [`DataSource`] 按偏移读取字节,
//! 向引擎报告媒体信息并逐轨道产出压缩样本.

use std::sync::Arc;

use bytes::BytesMut;
use liu_core::{DrmInfo, LiuError, LiuResult, Meta, Sample, SeekMode};
use liu_source::Seekable;

/// 引擎提供给格式插件的读取接口
pub trait DataSource: Send + Sync {
    /// 从 `offset` 读取至多 `expected_len` 字节, 追加到 `buffer`
    ///
    /// 返回值沿用引擎状态码: [`LiuError::Again`] 表示暂时无数据,
    /// [`LiuError::EndOfStream`] 表示已读完, [`LiuError::NotEnoughData`] 表示头部数据不足.
    fn read_at(&self, offset: i64, buffer: &mut BytesMut, expected_len: usize) -> LiuResult<()>;

    /// 总字节数
    fn size(&self) -> LiuResult<u64>;

    fn seekable(&self) -> Seekable;
}

/// 格式插件探测出的媒体信息
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    /// 全局元数据
    pub general: Meta,
    /// 逐轨道元数据, 下标即轨道编号
    pub tracks: Vec<Meta>,
}

/// 格式插件 trait
///
/// 使用流程:
/// 1. `init()`
/// 2. `set_data_source()` 解析头部
/// 3. `media_info()` / `select_track()`
/// 4. 循环 `next_sample_size()` + `read_sample()`
/// 5. `deinit()`
pub trait FormatPlugin: Send {
    /// 插件名称, 用于复用判断
    fn name(&self) -> &str;

    fn init(&mut self) -> LiuResult<()> {
        Ok(())
    }

    fn deinit(&mut self) -> LiuResult<()> {
        Ok(())
    }

    /// 软重置, 成功时插件可被下一次 `set_data_source` 复用
    fn reset(&mut self) -> LiuResult<()> {
        Ok(())
    }

    /// 绑定数据源并解析头部
    fn set_data_source(&mut self, source: Arc<dyn DataSource>) -> LiuResult<()>;

    fn media_info(&mut self) -> LiuResult<MediaInfo>;

    fn select_track(&mut self, track_id: usize) -> LiuResult<()>;

    fn unselect_track(&mut self, track_id: usize) -> LiuResult<()>;

    /// 下一个样本的字节数
    ///
    /// 暂时无法确定时返回 [`LiuError::Again`].
    fn next_sample_size(&mut self, track_id: usize) -> LiuResult<usize>;

    /// 读取下一个样本到 `sample`
    ///
    /// 流结束时可以返回 `Ok` 并在样本上设置 EOS 标志, 也可以直接返回
    /// [`LiuError::EndOfStream`].
    fn read_sample(&mut self, track_id: usize, sample: &mut Sample) -> LiuResult<()>;

    /// 定位到 `time_us`, 返回实际到达的时间 (微秒)
    ///
    /// `track_id` 为 `None` 时由插件选择参考轨道.
    fn seek_to(&mut self, track_id: Option<usize>, time_us: i64, mode: SeekMode) -> LiuResult<i64>;

    /// 当前已知的 DRM 信息
    fn drm_info(&mut self) -> LiuResult<Vec<DrmInfo>> {
        Ok(Vec::new())
    }

    /// 用户自定义元数据
    fn user_meta(&mut self) -> LiuResult<Meta> {
        Ok(Meta::new())
    }

    fn bit_rates(&mut self) -> LiuResult<Vec<u32>> {
        Ok(Vec::new())
    }

    fn select_bit_rate(&mut self, _bit_rate: u32) -> LiuResult<()> {
        Err(LiuError::InvalidOperation(format!(
            "{} 不支持码率切换",
            self.name()
        )))
    }

    fn flush(&mut self) -> LiuResult<()> {
        Ok(())
    }

    fn start(&mut self) -> LiuResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> LiuResult<()> {
        Ok(())
    }
}
