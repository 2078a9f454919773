//! Report PDFs in S3 (or an S3-compatible store).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::debug;
use uuid::Uuid;

pub const REPORT_PREFIX: &str = "comparativas";

/// A fresh storage key for one of `user_id`'s reports.
pub fn report_path(user_id: &str) -> String {
    format!("{}/{}/{}.pdf", REPORT_PREFIX, user_id, Uuid::new_v4())
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` at `path`. Fails if something is already there.
    async fn upload(&self, bucket: &str, path: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    async fn delete(&self, bucket: &str, paths: &[String]) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        S3ObjectStore { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, bucket: &str, path: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        debug!("uploading {} bytes to s3://{}/{}", data.len(), bucket, path);

        // `If-None-Match: *` makes S3 refuse to replace an existing object.
        self.client
            .put_object()
            .bucket(bucket)
            .key(path)
            .content_type(content_type)
            .if_none_match("*")
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{bucket}/{path}"))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut objects = Vec::with_capacity(paths.len());

        for p in paths {
            objects.push(ObjectIdentifier::builder().key(p).build()?);
        }

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()?;

        let result = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .with_context(|| format!("failed to delete {} object(s) from {bucket}", paths.len()))?;

        if let Some(e) = result.errors().first() {
            bail!(
                "failed to delete s3://{}/{}: {}",
                bucket,
                e.key().unwrap_or("?"),
                e.message().unwrap_or("unknown error")
            );
        }

        Ok(())
    }
}
