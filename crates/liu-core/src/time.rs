//! 时间单位换算.
//!
//! 对外接口以毫秒计时, 插件与样本以微秒计时.

/// 毫秒转微秒 (饱和)
pub const fn ms_to_us(ms: i64) -> i64 {
    ms.saturating_mul(1000)
}

/// 微秒转毫秒 (向零截断)
pub const fn us_to_ms(us: i64) -> i64 {
    us / 1000
}

/// 秒 (浮点) 转微秒
pub fn secs_to_us(secs: f64) -> i64 {
    (secs * 1_000_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_换算() {
        assert_eq!(ms_to_us(1500), 1_500_000);
        assert_eq!(us_to_ms(1_500_999), 1500);
        assert_eq!(ms_to_us(i64::MAX), i64::MAX);
        assert_eq!(secs_to_us(0.5), 500_000);
    }
}
