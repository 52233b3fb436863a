//! filestage - 数据库客户端内嵌的批量文件暂存引擎
//!
//! 解释 PUT/GET 指令，在本地文件系统与 stage 对象存储之间搬运文件：
//! 通配符展开、按内容摘要跳过重复上传、六种压缩编码协商、有界并行
//! worker、单文件失败隔离，每个文件恰好产生一条结果行，经由与普通
//! 查询相同的流式结果接口返回。
//!
//! SQL 执行器、连接认证与云厂商 SDK 都是外部协作方；本层只依赖
//! [`storage::StageBackend`] 抽象。

pub mod command;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use command::{OptionSet, TransferCommand, TransferDirection};
pub use config::AgentConfig;
pub use core::{
    DigestAlgorithm, FileTransferAgent, GetRow, PutRow, ResultRow, TransferReport, TransferResult,
    TransferStatus,
};
pub use error::{StorageError, StorageErrorKind, TransferError};
pub use logging::{init_logging, LogConfig};
pub use storage::{
    create_backend, LocalStage, ObjectMeta, PutOutcome, StageBackend, StageConfig, StageKind,
};
