//! 压缩样本 (Sample) 定义.
//!
//! 一个样本对应容器中的一个压缩帧, 由格式插件填充, 送入输出队列或交给拉模式调用方.

use bitflags::bitflags;
use bytes::BytesMut;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

bitflags! {
    /// 样本标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SampleFlags: u32 {
        /// 流结束标记样本
        const EOS = 0x0001;
        /// 同步帧 (关键帧)
        const SYNC_FRAME = 0x0002;
        /// 样本数据不完整 (缓冲区容量不足)
        const PARTIAL_FRAME = 0x0004;
        /// 编解码配置数据
        const CODEC_DATA = 0x0008;
    }
}

/// 压缩样本
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// 样本数据, 其容量即为申请时的缓冲区大小
    pub data: BytesMut,
    /// 显示时间戳 (微秒)
    pub pts: i64,
    /// 解码时间戳 (微秒)
    pub dts: i64,
    /// 时长 (微秒)
    pub duration: i64,
    /// 标志位
    pub flags: SampleFlags,
    /// 编码端标记的可丢弃帧 (不被其他帧参考)
    pub droppable: bool,
    /// 所属轨道索引
    pub track_id: usize,
}

impl Sample {
    /// 创建指定容量的空样本
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            ..Default::default()
        }
    }

    /// 从已有数据创建样本
    pub fn from_slice(data: &[u8], pts: i64) -> Self {
        Self {
            data: BytesMut::from(data),
            pts,
            dts: pts,
            ..Default::default()
        }
    }

    /// 创建空的 EOS 样本
    pub fn eos(track_id: usize) -> Self {
        Self {
            flags: SampleFlags::EOS,
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            track_id,
            ..Default::default()
        }
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(SampleFlags::EOS)
    }

    pub fn is_sync(&self) -> bool {
        self.flags.contains(SampleFlags::SYNC_FRAME)
    }

    pub fn is_partial(&self) -> bool {
        self.flags.contains(SampleFlags::PARTIAL_FRAME)
    }

    /// 样本数据长度
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 清空数据与标志, 保留已分配容量
    pub fn clear(&mut self) {
        self.data.clear();
        self.flags = SampleFlags::empty();
        self.pts = NOPTS_VALUE;
        self.dts = NOPTS_VALUE;
        self.duration = 0;
        self.droppable = false;
    }

    /// 将显示/解码时间戳整体平移 `delta_us`
    pub fn shift_timestamps(&mut self, delta_us: i64) {
        if self.pts != NOPTS_VALUE {
            self.pts = self.pts.saturating_add(delta_us);
        }
        if self.dts != NOPTS_VALUE {
            self.dts = self.dts.saturating_add(delta_us);
        }
    }
}
