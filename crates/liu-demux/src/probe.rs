//! 格式探测.
//!
//! 通过分析数据头部和文件扩展名, 自动识别容器格式.

/// 探测置信度
///
/// 数值越高, 表示对格式判断越有信心.
pub type ProbeScore = u32;

/// 最低探测分数 (仅根据扩展名)
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 中等探测分数 (MIME 类型匹配)
pub const SCORE_MIME: ProbeScore = 75;

/// 最高探测分数 (魔数完全匹配)
pub const SCORE_MAX: ProbeScore = 100;

/// 探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// 格式插件名称
    pub format: String,
    pub score: ProbeScore,
}

/// 格式探测器 trait
pub trait FormatProbe: Send + Sync {
    /// 根据头部数据探测格式
    ///
    /// # 参数
    /// - `data`: 数据开头的若干字节, 直播流可能不足探测上限
    /// - `filename`: URI 或文件名 (可选, 用于扩展名匹配)
    ///
    /// # 返回
    /// - `Some(score)`: 探测成功, 返回置信度
    /// - `None`: 不是此格式
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore>;

    /// 对应的格式插件名称
    fn format_name(&self) -> &str;
}
