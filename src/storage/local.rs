use super::{ObjectMeta, PutOutcome, StageBackend};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use walkdir::WalkDir;

/// 目录型 stage - 开发与测试用后端
///
/// 像 S3 一样按内容 MD5 报告对象摘要，stat 时读文件现算；
/// 数据量以测试夹具为准，不做增量哈希。
pub struct LocalStage {
    base_path: PathBuf,
    name: String,
    writes: AtomicU64,
}

impl LocalStage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let base_path = PathBuf::from(path);
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", path);
        Ok(Self {
            base_path,
            name,
            writes: AtomicU64::new(0),
        })
    }

    /// 累计写入次数，测试用来断言跳过的上传没有发生网络写
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    fn content_md5(data: &[u8]) -> String {
        format!("{:x}", Md5::digest(data))
    }
}

#[async_trait]
impl StageBackend for LocalStage {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let base = self.resolve_path(prefix);
        if !base.exists() {
            return Ok(Vec::new());
        }

        let base_path = self.base_path.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let entries: Vec<(String, PathBuf, u64)> = tokio::task::spawn_blocking(move || {
            WalkDir::new(&base)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter_map(|entry| {
                    let metadata = entry.metadata().ok()?;
                    if metadata.is_dir() {
                        return None;
                    }
                    let relative = entry
                        .path()
                        .strip_prefix(&base_path)
                        .ok()?
                        .to_str()?
                        .replace('\\', "/");
                    Some((relative, entry.path().to_path_buf(), metadata.len()))
                })
                .collect()
        })
        .await
        .map_err(|e| StorageError::permanent(e.to_string()))?;

        let mut objects = Vec::new();
        for (relative, full_path, size) in entries {
            let data = fs::read(&full_path).await?;
            objects.push(ObjectMeta {
                path: relative,
                size,
                content_digest: Some(Self::content_md5(&data)),
            });
        }

        Ok(objects)
    }

    async fn stat_object(&self, path: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let full_path = self.resolve_path(path);

        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(ObjectMeta {
                path: path.to_string(),
                size: data.len() as u64,
                content_digest: Some(Self::content_md5(&data)),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError> {
        let data = fs::read(self.resolve_path(path)).await?;
        Ok(Bytes::from(data))
    }

    async fn put_object(
        &self,
        path: &str,
        data: Bytes,
        digest: &str,
    ) -> Result<PutOutcome, StorageError> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 临时文件写入后原子重命名
        let temp_path = full_path.with_extension("tmp");
        let size = data.len() as u64;
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &full_path).await?;

        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(PutOutcome {
            size,
            digest: Some(digest.to_string()),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
