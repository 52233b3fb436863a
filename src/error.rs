//! 错误类型定义
//!
//! 命令级错误（解析失败、无匹配文件、未知压缩格式）在任何传输开始前返回；
//! 文件级错误被隔离为该文件的 ERROR 结果行，不会中断其他文件的传输。

use thiserror::Error;

/// 存储错误类别 - 决定是否重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// 暂时性错误（限流、连接重置等），可指数退避后重试
    Transient,
    /// 永久性错误（认证失败、权限不足、对象不存在等），不重试
    Permanent,
}

/// 存储后端错误
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StorageErrorKind::Transient
    }
}

impl From<opendal::Error> for StorageError {
    fn from(e: opendal::Error) -> Self {
        let kind = if e.is_temporary() {
            StorageErrorKind::Transient
        } else {
            StorageErrorKind::Permanent
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        // 本地盘 IO 失败重试没有意义
        Self::permanent(e.to_string())
    }
}

/// 传输错误
#[derive(Debug, Error)]
pub enum TransferError {
    /// PUT/GET 语法无法解析，整条命令终止
    #[error("命令语法错误: {0}")]
    MalformedCommand(String),

    /// PUT 模式没有匹配到任何文件，不发起任何传输
    #[error("没有匹配的文件: {0}")]
    NoMatchingFiles(String),

    /// 压缩格式不在固定目录中
    #[error("未知的压缩格式: {0}")]
    UnknownCodec(String),

    /// 本地文件读写失败（文件级）
    #[error("本地 IO 错误: {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 存储后端错误（文件级；暂时性错误重试耗尽后落到这里）
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 内容摘要校验失败（文件级）
    #[error("摘要不匹配: {path} (期望 {expected}, 实际 {actual})")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// 压缩/解压失败（文件级）
    #[error("压缩编码错误: {path}: {source}")]
    Codec {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("操作已取消")]
    Cancelled,
}

impl TransferError {
    /// 是否是命令级（致命）错误；其余错误隔离到单个文件
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::MalformedCommand(_)
                | TransferError::NoMatchingFiles(_)
                | TransferError::UnknownCodec(_)
        )
    }

    pub fn local_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TransferError::MalformedCommand("x".into()).is_fatal());
        assert!(TransferError::NoMatchingFiles("x".into()).is_fatal());
        assert!(TransferError::UnknownCodec("x".into()).is_fatal());
        assert!(!TransferError::Cancelled.is_fatal());
        assert!(!TransferError::Storage(StorageError::transient("throttled")).is_fatal());
    }

    #[test]
    fn test_storage_error_kind() {
        assert!(StorageError::transient("429").is_transient());
        assert!(!StorageError::permanent("403").is_transient());
    }
}
