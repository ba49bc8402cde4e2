//! 格式插件注册表.
//!
//! 按名称管理格式插件工厂, 并持有所有探测器用于自动识别.

use std::collections::BTreeMap;

use liu_core::{LiuError, LiuResult};

use crate::format::FormatPlugin;
use crate::probe::{FormatProbe, ProbeResult};

/// 格式插件工厂函数类型
pub type FormatFactory = Box<dyn Fn() -> LiuResult<Box<dyn FormatPlugin>> + Send + Sync>;

/// 格式插件注册表
#[derive(Default)]
pub struct FormatRegistry {
    factories: BTreeMap<String, FormatFactory>,
    probes: Vec<Box<dyn FormatProbe>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册格式插件工厂, 同名覆盖
    pub fn register(&mut self, name: impl Into<String>, factory: FormatFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe>) {
        self.probes.push(probe);
    }

    /// 创建指定名称的格式插件
    pub fn create(&self, name: &str) -> LiuResult<Box<dyn FormatPlugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LiuError::UnsupportedFormat(format!("未注册的格式插件: {}", name)))?;
        factory()
    }

    /// 遍历所有探测器, 返回置信度最高的结果 (同分时先注册者优先)
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
        let mut best: Option<ProbeResult> = None;
        for probe in &self.probes {
            if let Some(score) = probe.probe(data, filename) {
                if best.as_ref().is_none_or(|b| score > b.score) {
                    best = Some(ProbeResult {
                        format: probe.format_name().to_string(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// 已注册的格式插件名称
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeScore, SCORE_EXTENSION, SCORE_MAX};

    struct MagicProbe(&'static str, &'static [u8]);

    impl FormatProbe for MagicProbe {
        fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
            if data.starts_with(self.1) {
                return Some(SCORE_MAX);
            }
            filename
                .filter(|f| f.ends_with(self.0))
                .map(|_| SCORE_EXTENSION)
        }

        fn format_name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_最高分胜出() {
        let mut reg = FormatRegistry::new();
        reg.register_probe(Box::new(MagicProbe("aaa", b"AAA")));
        reg.register_probe(Box::new(MagicProbe("bbb", b"BBB")));
        let r = reg.probe(b"BBB...", Some("x.aaa")).unwrap();
        assert_eq!(r.format, "bbb");
        assert_eq!(r.score, SCORE_MAX);
        assert!(reg.probe(b"CCC", None).is_none());
    }

    #[test]
    fn test_创建未注册插件() {
        let reg = FormatRegistry::new();
        assert!(matches!(reg.create("none"), Err(LiuError::UnsupportedFormat(_))));
    }
}
