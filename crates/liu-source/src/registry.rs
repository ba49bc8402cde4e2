//! 传输插件注册表.
//!
//! 按注册顺序保存插件工厂及其支持的协议列表, 由调用方显式构造后注入
//! [`Source`](crate::Source).

use std::sync::Arc;

use liu_core::LiuResult;

use crate::plugin::TransportPlugin;

/// 传输插件工厂函数类型
pub type TransportFactory = Box<dyn Fn() -> LiuResult<Arc<dyn TransportPlugin>> + Send + Sync>;

/// 传输插件注册条目
pub struct TransportEntry {
    /// 插件名称
    pub name: String,
    /// 支持的协议 (小写, 如 `file`, `http`)
    pub protocols: Vec<String>,
    /// 工厂函数
    factory: TransportFactory,
}

impl TransportEntry {
    /// 创建插件实例
    pub fn create(&self) -> LiuResult<Arc<dyn TransportPlugin>> {
        (self.factory)()
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|p| p == protocol)
    }
}

/// 传输插件注册表
#[derive(Default)]
pub struct SourceRegistry {
    entries: Vec<TransportEntry>,
}

impl SourceRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个传输插件, 先注册者优先
    pub fn register<F>(&mut self, name: impl Into<String>, protocols: &[&str], factory: F)
    where
        F: Fn() -> LiuResult<Arc<dyn TransportPlugin>> + Send + Sync + 'static,
    {
        self.entries.push(TransportEntry {
            name: name.into(),
            protocols: protocols.iter().map(|p| p.to_ascii_lowercase()).collect(),
            factory: Box::new(factory),
        });
    }

    /// 按注册顺序列出支持指定协议的条目
    pub fn find<'a>(&'a self, protocol: &'a str) -> impl Iterator<Item = &'a TransportEntry> + 'a {
        self.entries.iter().filter(move |e| e.supports(protocol))
    }

    /// 获取所有已注册插件的名称与协议
    pub fn list(&self) -> Vec<(&str, &[String])> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.protocols.as_slice()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::file::FileTransport;

    #[test]
    fn test_按协议查找保持注册顺序() {
        let mut registry = SourceRegistry::new();
        registry.register("a", &["file"], FileTransport::create);
        registry.register("b", &["FILE", "fd"], FileTransport::create);
        registry.register("c", &["http"], FileTransport::create);

        let names: Vec<&str> = registry.find("file").map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.find("fd").count(), 1);
        assert_eq!(registry.find("rtsp").count(), 0);
    }
}
