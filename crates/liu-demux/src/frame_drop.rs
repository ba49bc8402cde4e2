//! 解码能力不足时的丢帧策略.

/// 丢帧判定参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDropPolicy {
    /// 是否启用 (`optimize_decode_slow`)
    pub enabled: bool,
    /// 视频帧率
    pub frame_rate: f64,
    /// 播放速度
    pub speed: f64,
    /// 解码帧率上限
    pub decode_rate_upper_limit: f64,
    /// 解码能力余量
    pub threshold: f64,
}

impl FrameDropPolicy {
    /// 视频轨道的一个可丢弃样本是否应作为非关键帧推送
    ///
    /// `frame_rate * speed > decode_rate_upper_limit * (1 + threshold)` 时才丢弃.
    pub fn should_drop(&self, droppable: bool) -> bool {
        if !self.enabled || !droppable {
            return false;
        }
        let target = self.frame_rate * self.speed;
        let allowed = self.decode_rate_upper_limit * (1.0 + self.threshold);
        target > allowed
    }
}
