//! 结果行 - 对接驱动的流式结果接口
//!
//! 每个匹配文件恰好产生一行，按完成顺序（而非枚举顺序）推送；
//! 发送端全部释放即为流结束。

#![allow(non_snake_case)]

use serde::Serialize;
use tokio::sync::mpsc;

/// 单文件传输状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Uploaded,
    Downloaded,
    Skipped,
    Error,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Uploaded => write!(f, "UPLOADED"),
            TransferStatus::Downloaded => write!(f, "DOWNLOADED"),
            TransferStatus::Skipped => write!(f, "SKIPPED"),
            TransferStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// 单文件传输结果，由执行器恰好产生一次，之后不再修改
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// 源文件名（PUT 为本地逻辑名，GET 为下载到本地的文件名）
    pub file_name: String,
    /// 目标对象名（PUT 上传到 stage 的对象名）
    pub target_name: String,
    pub status: TransferStatus,
    pub source_size: u64,
    pub target_size: u64,
    pub source_compression: &'static str,
    pub target_compression: &'static str,
    pub message: Option<String>,
}

impl TransferResult {
    /// 构造 ERROR 结果，保证失败文件也恰好产生一行
    pub fn error(file_name: String, target_name: String, message: String) -> Self {
        Self {
            file_name,
            target_name,
            status: TransferStatus::Error,
            source_size: 0,
            target_size: 0,
            source_compression: "NONE",
            target_compression: "NONE",
            message: Some(message),
        }
    }
}

/// PUT 结果行
#[derive(Debug, Clone, Serialize)]
pub struct PutRow {
    pub source: String,
    pub target: String,
    pub sourceSize: u64,
    pub targetSize: u64,
    pub sourceCompression: String,
    pub targetCompression: String,
    pub status: String,
    pub message: Option<String>,
}

/// GET 结果行
#[derive(Debug, Clone, Serialize)]
pub struct GetRow {
    pub file: String,
    pub size: u64,
    pub status: String,
    pub message: Option<String>,
}

/// 推送给调用方的结果行
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResultRow {
    Put(PutRow),
    Get(GetRow),
}

impl ResultRow {
    pub fn status(&self) -> &str {
        match self {
            ResultRow::Put(row) => &row.status,
            ResultRow::Get(row) => &row.status,
        }
    }
}

/// 行发射器
#[derive(Clone)]
pub struct RowEmitter {
    sink: mpsc::Sender<ResultRow>,
}

impl RowEmitter {
    pub fn new(sink: mpsc::Sender<ResultRow>) -> Self {
        Self { sink }
    }

    /// 把一个传输结果转为 PUT 行并推送
    pub async fn emit_put(&self, result: &TransferResult) {
        let row = ResultRow::Put(PutRow {
            source: result.file_name.clone(),
            target: result.target_name.clone(),
            sourceSize: result.source_size,
            targetSize: result.target_size,
            sourceCompression: result.source_compression.to_string(),
            targetCompression: result.target_compression.to_string(),
            status: result.status.to_string(),
            message: result.message.clone(),
        });
        // 调用方提前关闭接收端时丢弃剩余行
        let _ = self.sink.send(row).await;
    }

    /// 把一个传输结果转为 GET 行并推送
    pub async fn emit_get(&self, result: &TransferResult) {
        let row = ResultRow::Get(GetRow {
            file: result.file_name.clone(),
            size: result.target_size,
            status: result.status.to_string(),
            message: result.message.clone(),
        });
        let _ = self.sink.send(row).await;
    }
}
