//! Production object store over the AWS SDK.

use super::{
    ByteRange, CompletedPart, CopySource, HeadObject, ListPage, ObjectStore, ObjectSummary,
    StoreError, StoreErrorKind, StoreResult,
};
use crate::config::Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_smithy_http_client::proxy::ProxyConfig;
use aws_smithy_http_client::{tls, Builder as HttpClientBuilder, Connector};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// S3 client wrapper configured from the driver [`Config`].
pub struct AwsStore {
    client: Client,
}

impl AwsStore {
    /// Build a client from the configuration bag.
    ///
    /// Static credentials are used when provided, the ambient AWS credential
    /// chain otherwise. An endpoint override switches to path-style
    /// addressing, which MinIO and most S3-compatible stores expect. System
    /// proxy variables reach the HTTP connector only when
    /// `allow_system_proxy` is set.
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let region = aws_config::Region::new(config.region.clone());

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "driver-config",
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(StoreError::new(
                    StoreErrorKind::MissingParameter,
                    "access key and secret key must be provided together",
                ))
            }
        };

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        // `http(s)_proxy` variables are only honored when asked for
        let proxy = if config.allow_system_proxy {
            ProxyConfig::from_env()
        } else {
            ProxyConfig::disabled()
        };
        let http_client = HttpClientBuilder::new().build_with_connector_fn(move |settings, _runtime_components| {
            let mut connector_builder = Connector::builder();
            if let Some(settings) = settings {
                connector_builder = connector_builder.connector_settings(settings.clone());
            }
            connector_builder
                .tls_provider(tls::Provider::Rustls(tls::rustls_provider::CryptoMode::AwsLc))
                .proxy_config(proxy.clone())
                .build()
        });
        builder = builder.http_client(http_client);

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// The `x-amz-copy-source` value for a source object.
    ///
    /// The key portion is percent-encoded; the bucket and the separating
    /// slash are not.
    fn copy_source_header(source: &CopySource) -> String {
        let encoded_key = utf8_percent_encode(&source.key, NON_ALPHANUMERIC).to_string();
        match &source.version_id {
            Some(version) => format!("{}/{}?versionId={}", source.bucket, encoded_key, version),
            None => format!("{}/{}", source.bucket, encoded_key),
        }
    }
}

/// Classify an SDK failure into a [`StoreError`].
fn map_sdk_error<E>(operation: &str, err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::ServiceError(service_err) => match service_err.raw().status().as_u16() {
            404 => StoreErrorKind::NotFound,
            403 => StoreErrorKind::AccessDenied,
            400 => StoreErrorKind::InvalidParameter,
            _ => StoreErrorKind::Internal,
        },
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            StoreErrorKind::Network
        }
        _ => StoreErrorKind::Internal,
    };
    StoreError::new(
        kind,
        format!("{operation}: {}", DisplayErrorContext(&err)),
    )
}

#[async_trait]
impl ObjectStore for AwsStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<HeadObject> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("HeadObject", e))?;

        Ok(HeadObject {
            content_length: output.content_length().unwrap_or(0) as u64,
            version_id: output.version_id().map(|v| v.to_string()),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StoreResult<Bytes> {
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(range) = range {
            request = request.range(range.header());
        }
        let output = request
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObject", e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::new(StoreErrorKind::Network, format!("GetObject body: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StoreResult<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }
        let output = request
            .send()
            .await
            .map_err(|e| map_sdk_error("ListObjectsV2", e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                })
            })
            .collect();

        let next_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(|t| t.to_string())
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutObject", e))?;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateMultipartUpload", e))?;

        output
            .upload_id()
            .map(|id| id.to_string())
            .ok_or_else(|| StoreError::internal("CreateMultipartUpload returned no upload id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> StoreResult<String> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error("UploadPart", e))?;

        output
            .e_tag()
            .map(|etag| etag.to_string())
            .ok_or_else(|| StoreError::internal("UploadPart returned no etag"))
    }

    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        source: &CopySource,
        range: ByteRange,
    ) -> StoreResult<String> {
        let output = self
            .client
            .upload_part_copy()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .copy_source(Self::copy_source_header(source))
            .copy_source_range(range.header())
            .send()
            .await
            .map_err(|e| map_sdk_error("UploadPartCopy", e))?;

        output
            .copy_part_result()
            .and_then(|result| result.e_tag())
            .map(|etag| etag.to_string())
            .ok_or_else(|| StoreError::internal("UploadPartCopy returned no etag"))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let completed_parts: Vec<_> = parts
            .iter()
            .map(|part| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part.part_number as i32)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();

        let upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_error("CompleteMultipartUpload", e))?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteObject", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_header_encoding() {
        let source = CopySource {
            bucket: "data".into(),
            key: "dir/file name.csv".into(),
            version_id: None,
        };
        assert_eq!(
            AwsStore::copy_source_header(&source),
            "data/dir%2Ffile%20name%2Ecsv"
        );
    }

    #[test]
    fn test_copy_source_header_with_version() {
        let source = CopySource {
            bucket: "data".into(),
            key: "file".into(),
            version_id: Some("v123".into()),
        };
        assert_eq!(
            AwsStore::copy_source_header(&source),
            "data/file?versionId=v123"
        );
    }
}
