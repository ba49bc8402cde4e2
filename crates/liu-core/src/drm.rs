//! DRM 信息.

use serde::Serialize;

/// 一条 DRM 保护系统信息: 密钥系统 UUID 与其 pssh 数据
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DrmInfo {
    /// 密钥系统 UUID (十六进制字符串)
    pub uuid: String,
    /// pssh 数据
    pub pssh: Vec<u8>,
}

impl DrmInfo {
    pub fn new(uuid: impl Into<String>, pssh: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid: uuid.into(),
            pssh: pssh.into(),
        }
    }
}
