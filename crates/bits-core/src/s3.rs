//! S3 remote store adapter
//!
//! Object-store remote keyed by chunk address. Credentials come from the
//! standard AWS configuration chain (environment, shared credentials file,
//! shared config file, instance roles) unless explicit keys were installed;
//! `AWS_ENDPOINT_URL` is honored so local emulators work. Path-style
//! addressing keeps bucket names out of DNS.

use crate::config::Conf;
use crate::key::{Key, KEY_HEX_LEN};
use crate::remote::Remote;
use crate::{BitsError, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Page size for bucket listings
const LIST_PAGE_SIZE: i32 = 500;

/// Chunk remote backed by an S3 bucket
pub struct S3Remote {
    git_remote: String,
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3Remote {
    /// Connect using `conf` and bind to the given git remote name
    pub async fn connect(conf: &Conf, git_remote: impl Into<String>) -> Result<Self> {
        if conf.bucket.is_empty() {
            return Err(BitsError::Config(
                "no bucket configured; run `git-bits install`".to_string(),
            ));
        }
        let loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        let loader = if conf.access_key_id.is_empty() {
            loader
        } else {
            loader.credentials_provider(aws_credential_types::Credentials::from_keys(
                conf.access_key_id.clone(),
                conf.secret_access_key.reveal().to_owned(),
                None,
            ))
        };
        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        Ok(Self {
            git_remote: git_remote.into(),
            bucket: conf.bucket.clone(),
            client: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }
}

#[async_trait]
impl Remote for S3Remote {
    fn name(&self) -> &str {
        &self.git_remote
    }

    async fn list(&self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(LIST_PAGE_SIZE)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| BitsError::Remote(e.to_string()))?;
            for object in page.contents() {
                // non-chunk objects sharing the bucket are ignored
                let name = match object.key() {
                    Some(name) if name.len() == KEY_HEX_LEN => name,
                    _ => continue,
                };
                out.write_all(name.as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
        }
        out.flush().await?;
        Ok(())
    }

    async fn chunk(&self, key: &Key) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.to_hex())
            .send()
            .await;
        match resp {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| BitsError::Remote(e.to_string()))?;
                Ok(data.into_bytes())
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    Err(BitsError::NotFound(*key))
                } else {
                    Err(BitsError::Remote(service.to_string()))
                }
            }
        }
    }

    async fn put_chunk(&self, key: &Key, data: Bytes) -> Result<()> {
        // one buffered upload per chunk; sizes are bounded by the chunker max
        let len = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.to_hex())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| BitsError::Remote(e.to_string()))?;
        debug!(key = %key, bytes = len, bucket = %self.bucket, "uploaded chunk");
        Ok(())
    }
}
