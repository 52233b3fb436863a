use super::{ObjectMeta, PutOutcome, StageBackend, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::time::Duration;

pub struct S3Stage {
    operator: Operator,
    name: String,
}

impl S3Stage {
    pub fn new(
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: Option<String>,
        prefix: Option<String>,
    ) -> Result<Self, StorageError> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(region)
            .access_key_id(access_key)
            .secret_access_key(secret_key);

        if let Some(ref ep) = endpoint {
            builder = builder.endpoint(ep);
        }

        if let Some(ref p) = prefix {
            builder = builder.root(p);
        }

        // 超时按单次存储调用施加，整批传输没有总超时
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!(
            "s3://{}{}",
            bucket,
            prefix
                .as_deref()
                .map(|p| format!("/{}", p))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }

    /// 从对象元数据提取内容摘要
    ///
    /// 单段上传的 etag 就是内容的 MD5；分段上传的复合 etag（带 `-`）
    /// 不可比对，此时返回 None，跳过检测失效。
    fn digest_from_meta(meta: &opendal::Metadata) -> Option<String> {
        let etag = meta.etag()?.trim_matches('"');
        if etag.len() == 32 && etag.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(etag.to_ascii_lowercase())
        } else {
            None
        }
    }
}

#[async_trait]
impl StageBackend for S3Stage {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let mut objects = Vec::new();

        let mut lister = self
            .operator
            .lister_with(prefix)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::Etag | Metakey::Mode)
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
                content_digest: Self::digest_from_meta(meta),
            });
        }

        Ok(objects)
    }

    async fn stat_object(&self, path: &str) -> Result<Option<ObjectMeta>, StorageError> {
        match self.operator.stat(path).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                path: path.to_string(),
                size: meta.content_length(),
                content_digest: Self::digest_from_meta(&meta),
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
        digest: &str,
    ) -> Result<PutOutcome, StorageError> {
        let size = data.len() as u64;
        self.operator.write(path, data).await?;

        // 回读元数据作为上传回执
        match self.stat_object(path).await? {
            Some(meta) => Ok(PutOutcome {
                size: meta.size,
                digest: meta.content_digest,
            }),
            None => Ok(PutOutcome {
                size,
                digest: Some(digest.to_string()),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
