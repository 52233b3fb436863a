#![allow(non_snake_case)]

//! 传输执行器 - PUT/GET 的有界并行执行
//!
//! 每个文件由一个 worker 任务处理（PENDING -> IN_PROGRESS -> COMPLETED/FAILED），
//! 信号量限制并发数。worker 之间唯一共享的可变状态是结果通道和原子计数器。

use crate::command::{self, OptionSet, TransferCommand, TransferDirection};
use crate::config::AgentConfig;
use crate::core::codec;
use crate::core::digest::{self, DigestAlgorithm};
use crate::core::path::{self, LocalFile};
use crate::core::row::{ResultRow, RowEmitter, TransferResult, TransferStatus};
use crate::error::{StorageError, TransferError};
use crate::storage::{ObjectMeta, StageBackend};
use bytes::Bytes;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// 传输统计
#[derive(Debug, Default)]
struct TransferStats {
    files_completed: AtomicU64,
    files_skipped: AtomicU64,
    files_failed: AtomicU64,
    bytes_transferred: AtomicU64,
}

/// 传输汇总报告
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub command: String,
    pub stage: String,
    pub startTime: i64,
    pub endTime: i64,
    pub duration: u64,
    pub filesMatched: u32,
    pub filesCompleted: u32,
    pub filesSkipped: u32,
    pub filesFailed: u32,
    pub bytesTransferred: u64,
    pub errors: Vec<String>,
}

/// 单条命令执行期间 worker 共享的上下文
struct JobContext {
    backend: Arc<dyn StageBackend>,
    options: OptionSet,
    config: AgentConfig,
    cancelled: Arc<AtomicBool>,
}

/// 文件传输代理
///
/// 解析 PUT/GET 命令并驱动传输；SQL 层提供原始命令文本、已解析好
/// 凭证的存储后端和结果行接收端。
#[derive(Clone)]
pub struct FileTransferAgent {
    config: AgentConfig,
    cancelled: Arc<AtomicBool>,
}

impl Default for FileTransferAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTransferAgent {
    pub fn new() -> Self {
        Self::with_config(AgentConfig::default())
    }

    pub fn with_config(config: AgentConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 取消传输：不再发起新的存储调用，未完成的下载临时文件会被清理
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 执行一条 PUT/GET 命令
    ///
    /// 命令级错误（语法、零匹配、未知编码）在任何 worker 启动前返回 Err；
    /// 之后每个匹配文件恰好产生一行，行按完成顺序推送，文件级失败以
    /// ERROR 行的形式出现，不会中断整条命令。
    ///
    /// 结果行在传输过程中持续推送，调用方需要并发消费 `rows` 的接收端，
    /// 或保证通道容量足够容纳全部行。
    pub async fn execute(
        &self,
        command_text: &str,
        backend: Arc<dyn StageBackend>,
        rows: mpsc::Sender<ResultRow>,
    ) -> Result<TransferReport, TransferError> {
        let start_time = chrono::Utc::now().timestamp();
        self.cancelled.store(false, Ordering::SeqCst);

        let command = command::parse(command_text)?;
        info!(
            "开始执行 {} 命令: {} <-> {} (并行数 {})",
            command.direction, command.local_path, command.stage_path, command.options.parallelism
        );

        match command.direction {
            TransferDirection::Put => self.execute_put(command, backend, rows, start_time).await,
            TransferDirection::Get => self.execute_get(command, backend, rows, start_time).await,
        }
    }

    /// 流式接口：返回结果行流和汇总句柄
    pub fn execute_streaming(
        &self,
        command_text: impl Into<String>,
        backend: Arc<dyn StageBackend>,
    ) -> (
        ReceiverStream<ResultRow>,
        JoinHandle<Result<TransferReport, TransferError>>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let agent = self.clone();
        let text = command_text.into();
        let handle = tokio::spawn(async move { agent.execute(&text, backend, tx).await });
        (ReceiverStream::new(rx), handle)
    }

    /// 并行执行 PUT
    async fn execute_put(
        &self,
        command: TransferCommand,
        backend: Arc<dyn StageBackend>,
        rows: mpsc::Sender<ResultRow>,
        start_time: i64,
    ) -> Result<TransferReport, TransferError> {
        let files =
            path::resolve_put_pattern(&command.local_path, self.config.allow_missing_literal)
                .await?;
        info!("匹配到 {} 个本地文件", files.len());

        let files_matched = files.len() as u32;
        let context = Arc::new(JobContext {
            backend,
            options: command.options.clone(),
            config: self.config.clone(),
            cancelled: self.cancelled.clone(),
        });
        let emitter = RowEmitter::new(rows);
        let semaphore = Arc::new(Semaphore::new(context.options.parallelism));
        let stats = Arc::new(TransferStats::default());
        let errors = Arc::new(RwLock::new(Vec::<String>::new()));

        let mut handles = Vec::new();
        for file in files {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let context = context.clone();
            let stats = stats.clone();
            let errors = errors.clone();
            let emitter = emitter.clone();

            let handle = tokio::spawn(async move {
                let result = match put_one(&file, &context).await {
                    Ok(result) => result,
                    // 单个文件的失败被隔离为该文件的 ERROR 行
                    Err(e) => TransferResult::error(
                        file.logical_name.clone(),
                        file.logical_name.clone(),
                        e.to_string(),
                    ),
                };

                record(&stats, &errors, &result).await;
                emitter.emit_put(&result).await;
                drop(permit);
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        let report = build_report(&command, start_time, files_matched, &stats, &errors).await;
        info!(
            "PUT 完成: 上传 {}, 跳过 {}, 失败 {}",
            report.filesCompleted, report.filesSkipped, report.filesFailed
        );
        Ok(report)
    }

    /// 并行执行 GET
    async fn execute_get(
        &self,
        command: TransferCommand,
        backend: Arc<dyn StageBackend>,
        rows: mpsc::Sender<ResultRow>,
        start_time: i64,
    ) -> Result<TransferReport, TransferError> {
        let dest_dir = PathBuf::from(&command.local_path);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| TransferError::local_io(command.local_path.as_str(), e))?;

        let context = Arc::new(JobContext {
            backend,
            options: command.options.clone(),
            config: self.config.clone(),
            cancelled: self.cancelled.clone(),
        });

        // 列表失败是命令级错误，在任何 worker 启动前返回
        let objects = with_retry(&context, || {
            let backend = context.backend.clone();
            async move { backend.list_objects("").await }
        })
        .await?;
        info!("stage 匹配到 {} 个对象", objects.len());

        let files_matched = objects.len() as u32;
        let emitter = RowEmitter::new(rows);
        let semaphore = Arc::new(Semaphore::new(context.options.parallelism));
        let stats = Arc::new(TransferStats::default());
        let errors = Arc::new(RwLock::new(Vec::<String>::new()));

        let mut handles = Vec::new();
        for object in objects {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let context = context.clone();
            let stats = stats.clone();
            let errors = errors.clone();
            let emitter = emitter.clone();
            let dest_dir = dest_dir.clone();

            let handle = tokio::spawn(async move {
                let result = match get_one(&object, &dest_dir, &context).await {
                    Ok(result) => result,
                    Err(e) => TransferResult::error(
                        path::base_name(&object.path).to_string(),
                        object.path.clone(),
                        e.to_string(),
                    ),
                };

                record(&stats, &errors, &result).await;
                emitter.emit_get(&result).await;
                drop(permit);
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        let report = build_report(&command, start_time, files_matched, &stats, &errors).await;
        info!(
            "GET 完成: 下载 {}, 失败 {}",
            report.filesCompleted, report.filesFailed
        );
        Ok(report)
    }
}

/// 更新统计与错误列表
async fn record(stats: &TransferStats, errors: &RwLock<Vec<String>>, result: &TransferResult) {
    match result.status {
        TransferStatus::Error => {
            stats.files_failed.fetch_add(1, Ordering::Relaxed);
            if let Some(message) = &result.message {
                errors
                    .write()
                    .await
                    .push(format!("{}: {}", result.file_name, message));
            }
        }
        TransferStatus::Skipped => {
            stats.files_skipped.fetch_add(1, Ordering::Relaxed);
        }
        _ => {
            stats.files_completed.fetch_add(1, Ordering::Relaxed);
            stats
                .bytes_transferred
                .fetch_add(result.target_size, Ordering::Relaxed);
        }
    }
}

async fn build_report(
    command: &TransferCommand,
    start_time: i64,
    files_matched: u32,
    stats: &TransferStats,
    errors: &RwLock<Vec<String>>,
) -> TransferReport {
    let end_time = chrono::Utc::now().timestamp();
    TransferReport {
        command: command.direction.to_string(),
        stage: command.stage_path.clone(),
        startTime: start_time,
        endTime: end_time,
        duration: (end_time - start_time) as u64,
        filesMatched: files_matched,
        filesCompleted: stats.files_completed.load(Ordering::Relaxed) as u32,
        filesSkipped: stats.files_skipped.load(Ordering::Relaxed) as u32,
        filesFailed: stats.files_failed.load(Ordering::Relaxed) as u32,
        bytesTransferred: stats.bytes_transferred.load(Ordering::Relaxed),
        errors: errors.read().await.clone(),
    }
}

/// 带指数退避的重试，只重试暂时性存储错误
async fn with_retry<T, F, Fut>(context: &JobContext, mut operation: F) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if context.cancelled.load(Ordering::SeqCst) {
            return Err(TransferError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < context.config.max_retries => {
                let delay = context.config.retry_base_delay_ms * 2_u64.pow(attempt);
                warn!(
                    "存储操作失败，{}ms 后重试 ({}/{}): {}",
                    delay,
                    attempt + 1,
                    context.config.max_retries,
                    e
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// PUT 单文件流水线：读取 -> 压缩 -> 摘要 -> 跳过检测 -> 上传
async fn put_one(file: &LocalFile, context: &JobContext) -> Result<TransferResult, TransferError> {
    if context.cancelled.load(Ordering::SeqCst) {
        return Err(TransferError::Cancelled);
    }

    let data = tokio::fs::read(&file.absolute_path)
        .await
        .map_err(|e| TransferError::local_io(file.absolute_path.display().to_string(), e))?;

    let detected = codec::detect(&file.logical_name, &data[..data.len().min(8)]);
    let (source, target) = codec::negotiate_put(
        context.options.auto_compress,
        context.options.source_compression,
        detected,
    );

    // 只有未压缩文件规范化为 gzip 时才需要变换
    let (canonical, target_name) = if source.name != target.name {
        let compressed = codec::compress(target, &data).map_err(|e| TransferError::Codec {
            path: file.logical_name.clone(),
            source: e,
        })?;
        (
            compressed,
            format!("{}{}", file.logical_name, target.file_extension),
        )
    } else {
        (data, file.logical_name.clone())
    };

    let source_size = file.size_bytes;
    let local_digest = digest::content_digest(context.config.digest, &canonical);

    // 跳过检测：目标对象已存在且摘要一致时不产生任何数据传输
    if !context.options.overwrite {
        let existing = with_retry(context, || {
            let backend = context.backend.clone();
            let target_name = target_name.clone();
            async move { backend.stat_object(&target_name).await }
        })
        .await?;

        if let Some(meta) = existing {
            if digest::matches_remote(&local_digest, meta.content_digest.as_deref()) {
                debug!("对象内容未变化，跳过上传: {}", target_name);
                return Ok(TransferResult {
                    file_name: file.logical_name.clone(),
                    target_name,
                    status: TransferStatus::Skipped,
                    source_size,
                    target_size: meta.size,
                    source_compression: source.name,
                    target_compression: target.name,
                    message: None,
                });
            }
        }
    }

    let target_size = canonical.len() as u64;
    let payload = Bytes::from(canonical);
    let outcome = with_retry(context, || {
        let backend = context.backend.clone();
        let target_name = target_name.clone();
        let payload = payload.clone();
        let local_digest = local_digest.clone();
        async move { backend.put_object(&target_name, payload, &local_digest).await }
    })
    .await?;

    // 上传完整性校验；后端按 MD5 约定回显摘要，其他算法无法比对
    if context.config.digest == DigestAlgorithm::Md5 {
        if let Some(remote_digest) = &outcome.digest {
            if !remote_digest.eq_ignore_ascii_case(&local_digest) {
                return Err(TransferError::DigestMismatch {
                    path: target_name,
                    expected: local_digest,
                    actual: remote_digest.clone(),
                });
            }
        }
    }

    debug!(
        "上传完成: {} -> {} ({} 字节)",
        file.logical_name, target_name, outcome.size
    );

    Ok(TransferResult {
        file_name: file.logical_name.clone(),
        target_name,
        status: TransferStatus::Uploaded,
        source_size,
        target_size: outcome.size.max(target_size),
        source_compression: source.name,
        target_compression: target.name,
        message: None,
    })
}

/// GET 单文件流水线：下载 -> 临时文件 -> 校验 -> 原子重命名
async fn get_one(
    object: &ObjectMeta,
    dest_dir: &Path,
    context: &JobContext,
) -> Result<TransferResult, TransferError> {
    if context.cancelled.load(Ordering::SeqCst) {
        return Err(TransferError::Cancelled);
    }

    let file_name = path::base_name(&object.path).to_string();

    let data = with_retry(context, || {
        let backend = context.backend.clone();
        let object_path = object.path.clone();
        async move { backend.get_object(&object_path).await }
    })
    .await?;

    // 下载完整性校验；后端摘要为 MD5 约定
    if context.config.digest == DigestAlgorithm::Md5 {
        if let Some(expected) = &object.content_digest {
            let actual = digest::content_digest(DigestAlgorithm::Md5, &data);
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(TransferError::DigestMismatch {
                    path: object.path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
    }

    let final_path = dest_dir.join(&file_name);
    let temp_path = dest_dir.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));

    // 任何失败或取消都清理临时文件，最终名下绝不出现半截文件
    let cleanup = scopeguard::guard(temp_path.clone(), |p| {
        let _ = std::fs::remove_file(&p);
    });

    tokio::fs::write(&temp_path, &data)
        .await
        .map_err(|e| TransferError::local_io(temp_path.display().to_string(), e))?;

    if context.cancelled.load(Ordering::SeqCst) {
        return Err(TransferError::Cancelled);
    }

    tokio::fs::rename(&temp_path, &final_path)
        .await
        .map_err(|e| TransferError::local_io(final_path.display().to_string(), e))?;
    let _ = scopeguard::ScopeGuard::into_inner(cleanup);

    debug!(
        "下载完成: {} -> {} ({} 字节)",
        object.path,
        final_path.display(),
        data.len()
    );

    Ok(TransferResult {
        file_name,
        target_name: object.path.clone(),
        status: TransferStatus::Downloaded,
        source_size: object.size,
        target_size: data.len() as u64,
        source_compression: "NONE",
        target_compression: "NONE",
        message: None,
    })
}
