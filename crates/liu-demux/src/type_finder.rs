//! 容器格式自动识别.
//!
//! 在选定格式插件之前, 通过两个闭包窥视数据头部:
//! - `check_range(offset, size)`: 范围是否已可读 (直播流需等待首批数据)
//! - `peek(offset, size)`: 读取但不消费, 允许返回不足 `size` 的数据

use std::thread;

use bytes::Bytes;
use liu_core::{LiuError, LiuResult};
use log::{debug, warn};

use crate::config::DemuxerConfig;
use crate::registry::FormatRegistry;

/// 探测所需的最少字节数
pub const MIN_PROBE_SIZE: usize = 12;

/// 容器格式探测器
pub struct TypeFinder<'a> {
    registry: &'a FormatRegistry,
    config: &'a DemuxerConfig,
}

impl<'a> TypeFinder<'a> {
    pub fn new(registry: &'a FormatRegistry, config: &'a DemuxerConfig) -> Self {
        Self { registry, config }
    }

    /// 识别容器格式, 返回格式插件名称
    ///
    /// `size` 为 0 表示总大小未知.
    pub fn find_media_type<C, P>(&self, uri: &str, size: u64, check_range: C, peek: P) -> LiuResult<String>
    where
        C: Fn(u64, usize) -> bool,
        P: Fn(u64, usize) -> Option<Bytes>,
    {
        let mut probe_len = self.config.probe_size.max(MIN_PROBE_SIZE);
        if size > 0 {
            probe_len = probe_len.min(size as usize);
        }
        let min_len = probe_len.min(MIN_PROBE_SIZE);

        let mut ready = false;
        for _ in 0..=self.config.probe_wait_retry_times {
            if check_range(0, min_len) {
                ready = true;
                break;
            }
            thread::sleep(self.config.probe_wait_interval());
        }
        if !ready {
            warn!("等待探测数据超时, 使用已有数据探测");
        }

        let data = peek(0, probe_len).unwrap_or_default();
        if data.is_empty() {
            return Err(LiuError::UnsupportedFormat("没有可用于探测的数据".into()));
        }
        let filename = file_name(uri);
        debug!("探测数据 {} 字节, 文件名: {:?}", data.len(), filename);

        self.registry
            .probe(&data, filename)
            .map(|r| r.format)
            .ok_or_else(|| LiuError::UnsupportedFormat(format!("无法识别容器格式: {}", uri)))
    }
}

/// 从 URI 中取出用于扩展名匹配的部分 (去掉查询串与片段)
fn file_name(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let name = path.rsplit('/').next().unwrap_or(path);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};
    use std::cell::Cell;

    struct RiffProbe;

    impl FormatProbe for RiffProbe {
        fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
            if data.len() >= 12 && &data[0..4] == b"RIFF" {
                return Some(SCORE_MAX);
            }
            filename.filter(|f| f.ends_with(".riff")).map(|_| SCORE_EXTENSION)
        }

        fn format_name(&self) -> &str {
            "riff"
        }
    }

    fn registry() -> FormatRegistry {
        let mut reg = FormatRegistry::new();
        reg.register_probe(Box::new(RiffProbe));
        reg
    }

    fn fast_config() -> DemuxerConfig {
        DemuxerConfig {
            probe_wait_retry_times: 3,
            probe_wait_interval_ms: 1,
            ..DemuxerConfig::default()
        }
    }

    #[test]
    fn test_魔数识别() {
        let reg = registry();
        let cfg = fast_config();
        let data = Bytes::from_static(b"RIFF\0\0\0\0WAVEfmt ");
        let found = TypeFinder::new(&reg, &cfg)
            .find_media_type("a.bin", data.len() as u64, |_, _| true, |_, n| Some(data.slice(..n.min(data.len()))))
            .unwrap();
        assert_eq!(found, "riff");
    }

    #[test]
    fn test_扩展名与查询串() {
        assert_eq!(file_name("http://h/x/song.riff?t=1"), Some("song.riff"));
        assert_eq!(file_name("http://h/"), None);
        let reg = registry();
        let cfg = fast_config();
        let found = TypeFinder::new(&reg, &cfg)
            .find_media_type("http://h/song.riff?t=1", 0, |_, _| true, |_, _| Some(Bytes::from_static(b"xx")))
            .unwrap();
        assert_eq!(found, "riff");
    }

    #[test]
    fn test_等待首批数据() {
        let reg = registry();
        let cfg = fast_config();
        let polls = Cell::new(0);
        let data = Bytes::from_static(b"RIFF0000WAVE");
        let found = TypeFinder::new(&reg, &cfg).find_media_type(
            "live",
            0,
            |_, _| {
                polls.set(polls.get() + 1);
                polls.get() > 2
            },
            |_, _| Some(data.clone()),
        );
        assert_eq!(found.unwrap(), "riff");
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_无法识别() {
        let reg = registry();
        let cfg = fast_config();
        let err = TypeFinder::new(&reg, &cfg)
            .find_media_type("x", 0, |_, _| true, |_, _| Some(Bytes::from_static(b"garbage-data")))
            .unwrap_err();
        assert!(matches!(err, LiuError::UnsupportedFormat(_)));
    }
}
