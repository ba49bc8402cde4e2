//! 媒体类型定义.

use std::fmt;

use serde::Serialize;

/// 轨道媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// 视频轨道
    Video,
    /// 音频轨道
    Audio,
    /// 字幕轨道
    Subtitle,
    /// 其他 (数据、时间码等)
    Other,
}

impl MediaType {
    /// 元数据中使用的字符串形式
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Other => "other",
        }
    }

    /// 从字符串形式解析, 未知值归为 `Other`
    pub fn parse(value: &str) -> Self {
        match value {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "subtitle" => Self::Subtitle,
            _ => Self::Other,
        }
    }

    /// 根据 MIME 前缀推断 (如 `video/avc` -> Video)
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next() {
            Some("video") => Self::Video,
            Some("audio") => Self::Audio,
            Some("text") => Self::Subtitle,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "视频",
            Self::Audio => "音频",
            Self::Subtitle => "字幕",
            Self::Other => "其他",
        };
        write!(f, "{name}")
    }
}
