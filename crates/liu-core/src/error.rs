//! 统一错误类型定义.
//!
//! 所有 Liu crate 共用的错误类型, 传输插件与格式插件也返回同一套状态.

use thiserror::Error;

/// Liu 引擎统一错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidParameter(String),

    /// 当前没有可执行该操作的对象 (如未绑定插件)
    #[error("无效操作: {0}")]
    InvalidOperation(String),

    /// 当前状态不允许该操作
    #[error("状态错误: {0}")]
    WrongState(String),

    /// 未找到匹配的协议或容器格式
    #[error("不支持的格式: {0}")]
    UnsupportedFormat(String),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    EndOfStream,

    /// 暂时无数据, 调用方应稍后重试
    #[error("暂时无数据, 请重试")]
    Again,

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NotEnoughData,

    /// 缓冲区容量不足
    #[error("内存不足: {0}")]
    NoMemory(String),

    /// 输出队列暂时无可用缓冲区
    #[error("输出队列无可用缓冲区")]
    NoBuffer,

    /// 插件内部未知错误
    #[error("未知错误: {0}")]
    Unknown(String),

    /// DRM 相关错误
    #[error("DRM 错误: {0}")]
    Drm(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl LiuError {
    /// 是否为可通过重试恢复的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Again | Self::NotEnoughData | Self::NoBuffer | Self::WrongState(_)
        )
    }

    /// 是否为流末尾
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// Liu 引擎统一 Result 类型
pub type LiuResult<T> = Result<T, LiuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_瞬时错误分类() {
        assert!(LiuError::Again.is_transient());
        assert!(LiuError::NotEnoughData.is_transient());
        assert!(!LiuError::EndOfStream.is_transient());
        assert!(!LiuError::Unknown("x".into()).is_transient());
        assert!(LiuError::EndOfStream.is_eos());
    }

    #[test]
    fn test_io_错误转换() {
        let err: LiuError = std::io::Error::other("断开").into();
        assert!(matches!(err, LiuError::Io(_)));
    }
}
