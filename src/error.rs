use thiserror::Error;

/// 库内统一使用的 Result 类型
pub type Result<T> = std::result::Result<T, KdbxError>;

/// KDBX 读写过程中的全部错误。
///
/// 所有错误对当前操作都是致命的，不做自动重试；
/// 是否重新询问口令由调用方决定。
#[derive(Debug, Error)]
pub enum KdbxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 签名 / 版本不符，或 Header 记录被截断、长度非法
    #[error("invalid KDBX format: {0}")]
    Format(String),

    /// 口令错误或密文损坏（stream_start_bytes 校验失败）
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// 块哈希校验失败
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// 缺少必需的字段、ID 或文档节点
    #[error("not found: {0}")]
    NotFound(String),
}

impl KdbxError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
