use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use tracing::{debug, warn};
use url::Url;

use crate::job::storage::object::{self, ProgressSink};

/// Smallest part S3-compatible stores accept for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

pub struct Client {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_url: Url,
    part_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to put object: {0}")]
    Put(String),
    #[error("Failed multipart upload: {0}")]
    Multipart(String),
    #[error("Multipart upload id missing for {0}")]
    MissingUploadId(String),
    #[error("Invalid public URL for {path}: {error}")]
    PublicUrl {
        path: String,
        error: url::ParseError,
    },
}

impl Client {
    pub async fn new(
        account_id: &str,
        access_key_id: &str,
        secret_access_key: &str,
        bucket: impl Into<String>,
        public_url: Url,
        part_size: usize,
    ) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(format!("https://{account_id}.r2.cloudflarestorage.com"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None, // session token is not used with R2
                None,
                "R2",
            ))
            .region("auto")
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.into(),
            public_url,
            part_size: part_size.max(MIN_PART_SIZE),
        }
    }

    async fn put_multipart(
        &self,
        path: &str,
        upload_id: &str,
        body: bytes::Bytes,
        progress: &ProgressSink,
    ) -> Result<(), Error> {
        let mut parts = Vec::new();
        let mut sent = 0;
        for (index, start) in (0..body.len()).step_by(self.part_size).enumerate() {
            let chunk = body.slice(start..(start + self.part_size).min(body.len()));
            let len = chunk.len();
            let part_number = index as i32 + 1;
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(path)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|error| Error::Multipart(error.to_string()))?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(ToOwned::to_owned))
                    .part_number(part_number)
                    .build(),
            );
            sent += len as u64;
            progress.report(sent);
        }
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|error| Error::Multipart(error.to_string()))?;
        Ok(())
    }
}

impl object::Client for Client {
    type Error = Error;

    async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: bytes::Bytes,
        progress: &ProgressSink,
    ) -> Result<(), Self::Error> {
        let size = body.len();
        if size <= self.part_size {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(path)
                .content_type(content_type)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|error| Error::Put(error.to_string()))?;
            progress.report(size as u64);
            return Ok(());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .send()
            .await
            .map_err(|error| Error::Multipart(error.to_string()))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::MissingUploadId(path.to_owned()))?
            .to_owned();
        debug!(path, size, part_size = self.part_size, "multipart upload started");
        let result = self.put_multipart(path, &upload_id, body, progress).await;
        if result.is_err()
            && let Err(error) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(path)
                .upload_id(&upload_id)
                .send()
                .await
        {
            warn!(%error, path, "failed to abort multipart upload");
        }
        result
    }

    async fn download_url(&self, path: &str) -> Result<String, Self::Error> {
        public_url(&self.public_url, path)
    }
}

fn public_url(base: &Url, path: &str) -> Result<String, Error> {
    let encoded = path
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    let base = if base.path().ends_with('/') {
        base.clone()
    } else {
        let mut base = base.clone();
        base.set_path(&format!("{}/", base.path()));
        base
    };
    base.join(&encoded)
        .map(String::from)
        .map_err(|error| Error::PublicUrl {
            path: path.to_owned(),
            error,
        })
}
