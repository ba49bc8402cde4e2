//! 元数据 (Meta) 容器.
//!
//! 以字符串标签为键的有序键值表, 用于全局信息、轨道信息与用户自定义信息.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::media_type::MediaType;

/// 常用元数据标签
pub mod tag {
    /// MIME 类型, 如 `video/avc`
    pub const MIME_TYPE: &str = "mime";
    /// 媒体类型, 取值见 [`MediaType::as_str`](crate::MediaType::as_str)
    pub const MEDIA_TYPE: &str = "media_type";
    /// 时长 (微秒)
    pub const MEDIA_DURATION: &str = "duration_us";
    /// 起始时间 (微秒)
    pub const MEDIA_START_TIME: &str = "start_time_us";
    /// 码率 (bit/s)
    pub const MEDIA_BITRATE: &str = "bitrate";
    /// 标题
    pub const MEDIA_TITLE: &str = "title";
    /// 容器格式名称
    pub const MEDIA_FORMAT: &str = "format";
    /// 视频宽度
    pub const VIDEO_WIDTH: &str = "width";
    /// 视频高度
    pub const VIDEO_HEIGHT: &str = "height";
    /// 视频帧率
    pub const VIDEO_FRAME_RATE: &str = "frame_rate";
    /// 音频采样率
    pub const AUDIO_SAMPLE_RATE: &str = "sample_rate";
    /// 音频声道数
    pub const AUDIO_CHANNEL_COUNT: &str = "channel_count";
    /// 音频位深
    pub const AUDIO_BITS_PER_SAMPLE: &str = "bits_per_sample";
}

/// 元数据值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for MetaValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for MetaValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// 元数据表
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Meta {
    entries: BTreeMap<String, MetaValue>,
}

impl Meta {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个键值, 覆盖同名旧值
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// 链式写入
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    /// 读取整数值, 浮点值会被截断
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            MetaValue::Int(v) => Some(*v),
            MetaValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// 读取浮点值, 整数值会被提升
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.entries.get(key)? {
            MetaValue::Float(v) => Some(*v),
            MetaValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            MetaValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key)? {
            MetaValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 按键名顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 合并另一张表, 同名键以 `other` 为准
    pub fn merge(&mut self, other: &Meta) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    /// 轨道 MIME 类型
    pub fn mime(&self) -> Option<&str> {
        self.get_str(tag::MIME_TYPE)
    }

    /// 轨道媒体类型
    ///
    /// 优先读取 `media_type` 标签, 缺失时根据 MIME 前缀推断.
    pub fn media_type(&self) -> MediaType {
        if let Some(kind) = self.get_str(tag::MEDIA_TYPE) {
            return MediaType::parse(kind);
        }
        self.mime().map_or(MediaType::Other, MediaType::from_mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_读写与类型转换() {
        let mut meta = Meta::new();
        meta.set(tag::VIDEO_WIDTH, 1920);
        meta.set(tag::VIDEO_FRAME_RATE, 29.97);
        meta.set(tag::MIME_TYPE, "video/avc");

        assert_eq!(meta.get_i64(tag::VIDEO_WIDTH), Some(1920));
        assert_eq!(meta.get_f64(tag::VIDEO_WIDTH), Some(1920.0));
        assert_eq!(meta.get_i64(tag::VIDEO_FRAME_RATE), Some(29));
        assert_eq!(meta.mime(), Some("video/avc"));
        assert_eq!(meta.get_str(tag::VIDEO_WIDTH), None);
        assert_eq!(meta.media_type(), MediaType::Video);
    }

    #[test]
    fn test_显式媒体类型优先() {
        let meta = Meta::new()
            .with(tag::MIME_TYPE, "application/octet-stream")
            .with(tag::MEDIA_TYPE, "audio");
        assert_eq!(meta.media_type(), MediaType::Audio);
    }

    #[test]
    fn test_合并覆盖同名键() {
        let mut a = Meta::new().with("k", 1).with("x", "a");
        let b = Meta::new().with("k", 2);
        a.merge(&b);
        assert_eq!(a.get_i64("k"), Some(2));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_序列化为扁平对象() {
        let meta = Meta::new().with(tag::VIDEO_WIDTH, 640).with(tag::MIME_TYPE, "video/avc");
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"mime":"video/avc","width":640}"#);
    }
}
