#![allow(non_snake_case)]

pub mod azblob;
pub mod gcs;
pub mod local;
pub mod s3;

use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use azblob::AzblobStage;
pub use gcs::GcsStage;
pub use local::LocalStage;
pub use s3::S3Stage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 对象读写
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 远端对象元数据
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// stage 内相对路径
    pub path: String,
    pub size: u64,
    /// 内容摘要（十六进制）；后端无法提供时为 None，跳过检测自动失效
    pub content_digest: Option<String>,
}

/// 上传回执
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub size: u64,
    /// 后端记录的内容摘要，用于上传完整性校验
    pub digest: Option<String>,
}

/// stage 存储后端抽象接口
///
/// 每个方法对应一次独立的存储调用，超时在后端内部按调用施加，
/// 错误区分暂时性与永久性，由执行器决定是否重试。
#[async_trait]
pub trait StageBackend: Send + Sync {
    /// 列出指定前缀下的所有对象（不含目录占位）
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError>;

    /// 获取单个对象元数据；对象不存在返回 None
    async fn stat_object(&self, path: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// 读取整个对象
    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError>;

    /// 写入整个对象；digest 为调用方预先计算的内容摘要
    async fn put_object(
        &self,
        path: &str,
        data: Bytes,
        digest: &str,
    ) -> Result<PutOutcome, StorageError>;

    /// 后端名称（用于日志）
    fn name(&self) -> &str;
}

/// stage 存储类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    S3,
    Gcs,
    Azblob,
    Local,
}

/// stage 存储配置
///
/// SQL 层解析 `@db.schema.stage` 引用并签发凭证后下发；本层不关心
/// stage 名称如何映射到存储位置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(rename = "type")]
    pub typ: StageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessKey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secretKey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accountKey: Option<String>,
}

fn require<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, StorageError> {
    value
        .as_deref()
        .ok_or_else(|| StorageError::permanent(format!("stage 配置缺少 {}", what)))
}

/// 根据配置创建存储后端实例
pub async fn create_backend(config: &StageConfig) -> Result<Arc<dyn StageBackend>, StorageError> {
    match config.typ {
        StageKind::Local => {
            let path = require(&config.path, "path")?;
            tracing::info!("初始化本地 stage: {}", path);
            Ok(Arc::new(LocalStage::new(path)?) as Arc<dyn StageBackend>)
        }
        StageKind::S3 => {
            let bucket = require(&config.bucket, "bucket")?;
            let region = require(&config.region, "region")?;
            let access_key = require(&config.accessKey, "accessKey")?;
            let secret_key = require(&config.secretKey, "secretKey")?;
            tracing::info!("初始化 S3 stage: bucket={}, region={}", bucket, region);
            Ok(Arc::new(S3Stage::new(
                bucket,
                region,
                access_key,
                secret_key,
                config.endpoint.clone(),
                config.prefix.clone(),
            )?) as Arc<dyn StageBackend>)
        }
        StageKind::Gcs => {
            let bucket = require(&config.bucket, "bucket")?;
            let credential = require(&config.credential, "credential")?;
            tracing::info!("初始化 GCS stage: bucket={}", bucket);
            Ok(
                Arc::new(GcsStage::new(bucket, credential, config.prefix.clone())?)
                    as Arc<dyn StageBackend>,
            )
        }
        StageKind::Azblob => {
            let container = require(&config.container, "container")?;
            let account = require(&config.account, "account")?;
            let account_key = require(&config.accountKey, "accountKey")?;
            tracing::info!("初始化 Azure Blob stage: container={}", container);
            Ok(Arc::new(AzblobStage::new(
                container,
                account,
                account_key,
                config.endpoint.clone(),
                config.prefix.clone(),
            )?) as Arc<dyn StageBackend>)
        }
    }
}
