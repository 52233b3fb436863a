use super::{ObjectMeta, PutOutcome, StageBackend, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::time::Duration;

/// GCS stage
///
/// GCS 的 etag 不是内容 MD5，这里不提供内容摘要，重复上传不会被跳过。
pub struct GcsStage {
    operator: Operator,
    name: String,
}

impl GcsStage {
    pub fn new(
        bucket: &str,
        credential: &str,
        prefix: Option<String>,
    ) -> Result<Self, StorageError> {
        use opendal::services::Gcs;

        let mut builder = Gcs::default().bucket(bucket).credential(credential);

        if let Some(ref p) = prefix {
            builder = builder.root(p);
        }

        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!(
            "gcs://{}{}",
            bucket,
            prefix
                .as_deref()
                .map(|p| format!("/{}", p))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }
}

#[async_trait]
impl StageBackend for GcsStage {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let mut objects = Vec::new();

        let mut lister = self
            .operator
            .lister_with(prefix)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::Mode)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            let path = entry.path().to_string();
            if path.is_empty() || path == "/" {
                continue;
            }

            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }

            objects.push(ObjectMeta {
                path: path.trim_start_matches('/').to_string(),
                size: meta.content_length(),
                content_digest: None,
            });
        }

        Ok(objects)
    }

    async fn stat_object(&self, path: &str) -> Result<Option<ObjectMeta>, StorageError> {
        match self.operator.stat(path).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                path: path.to_string(),
                size: meta.content_length(),
                content_digest: None,
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError> {
        let data = self.operator.read(path).await?;
        Ok(data.to_bytes())
    }

    async fn put_object(
        &self,
        path: &str,
        data: Bytes,
        _digest: &str,
    ) -> Result<PutOutcome, StorageError> {
        let size = data.len() as u64;
        self.operator.write(path, data).await?;
        Ok(PutOutcome { size, digest: None })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
