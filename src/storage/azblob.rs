use super::{ObjectMeta, PutOutcome, StageBackend, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::time::Duration;

pub struct AzblobStage {
    operator: Operator,
    name: String,
}

impl AzblobStage {
    pub fn new(
        container: &str,
        account: &str,
        account_key: &str,
        endpoint: Option<String>,
        prefix: Option<String>,
    ) -> Result<Self, StorageError> {
        use opendal::services::Azblob;

        let mut builder = Azblob::default()
            .container(container)
            .account_name(account)
            .account_key(account_key);

        if let Some(ref ep) = endpoint {
            builder = builder.endpoint(ep);
        }

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
            "azblob://{}{}",
            container,
            prefix
                .as_deref()
                .map(|p| format!("/{}", p))
                .unwrap_or_default()
        );

        Ok(Self { operator, name })
    }

    /// Content-MD5 是 base64 编码，无法直接与十六进制摘要比对，
    /// 这里只透传单段上传的十六进制 etag（与 S3 同样的约定）。
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
impl StageBackend for AzblobStage {
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
