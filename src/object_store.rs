//! S3-compatible object store client.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication.
//! Works against AWS S3 (virtual-hosted addressing) and S3-compatible
//! services such as MinIO or LocalStack when `endpoint_url` is set
//! (path-style addressing).
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing.
//!
//! # Credentials
//!
//! Read from `[object_store] access_key / secret_key` (which the
//! `MINIO_ACCESS_KEY` / `MINIO_SECRET_KEY` environment overrides populate),
//! falling back to `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the
//! optional `AWS_SESSION_TOKEN`.
//!
//! # Operations
//!
//! | Trait method | S3 call |
//! |--------------|---------|
//! | `put_object` | `PUT /{bucket}/{key}` |
//! | `get_object` | `GET /{bucket}/{key}` |
//! | `delete_object` | `DELETE /{bucket}/{key}` |
//! | `bucket_exists` | `HEAD /{bucket}` |
//! | `create_bucket` | `PUT /{bucket}` |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::ObjectStoreConfig;
use crate::traits::ObjectStore;

type HmacSha256 = Hmac<Sha256>;

/// Credentials used to sign requests.
#[derive(Clone)]
struct S3Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl S3Credentials {
    fn resolve(config: &ObjectStoreConfig) -> Result<Self> {
        let access_key_id = match &config.access_key {
            Some(k) => k.clone(),
            None => std::env::var("AWS_ACCESS_KEY_ID").context(
                "object store access key not set (object_store.access_key, MINIO_ACCESS_KEY or AWS_ACCESS_KEY_ID)",
            )?,
        };
        let secret_access_key = match &config.secret_key {
            Some(k) => k.clone(),
            None => std::env::var("AWS_SECRET_ACCESS_KEY").context(
                "object store secret key not set (object_store.secret_key, MINIO_SECRET_KEY or AWS_SECRET_ACCESS_KEY)",
            )?,
        };
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Where a request goes and what gets signed.
#[derive(Debug, PartialEq, Eq)]
struct RequestTarget {
    url: String,
    host: String,
    canonical_uri: String,
}

/// [`ObjectStore`] backed by the S3 REST API.
pub struct S3ObjectStore {
    client: reqwest::Client,
    endpoint_url: Option<String>,
    region: String,
    creds: S3Credentials,
}

impl S3ObjectStore {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint_url: config
                .endpoint_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            region: config.region.clone(),
            creds: S3Credentials::resolve(config)?,
        })
    }

    fn target(&self, bucket: &str, key: Option<&str>) -> RequestTarget {
        resolve_target(self.endpoint_url.as_deref(), &self.region, bucket, key)
    }

    /// Build a SigV4-signed request. The payload hash covers `body`.
    fn signed_request(
        &self,
        method: Method,
        target: &RequestTarget,
        body: Vec<u8>,
    ) -> reqwest::RequestBuilder {
        let payload_hash = hex_sha256(&body);
        let signed = sign_request(
            &self.creds,
            &self.region,
            method.as_str(),
            target,
            &payload_hash,
            Utc::now(),
        );

        let mut req = self
            .client
            .request(method, &target.url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &signed.amz_date);

        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if !body.is_empty() {
            req = req.body(body);
        }
        req
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let target = self.target(bucket, Some(key));
        let resp = self
            .signed_request(Method::PUT, &target, data.to_vec())
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", bucket, key))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for s3://{}/{}: {}",
                status,
                bucket,
                key,
                describe_s3_error(&body)
            );
        }

        tracing::debug!(bucket, key, bytes = data.len(), "stored object");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let target = self.target(bucket, Some(key));
        let resp = self
            .signed_request(Method::GET, &target, Vec::new())
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", bucket, key))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 GetObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                describe_s3_error(&body)
            );
        }

        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let target = self.target(bucket, Some(key));
        let resp = self
            .signed_request(Method::DELETE, &target, Vec::new())
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", bucket, key))?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 DeleteObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                describe_s3_error(&body)
            );
        }
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let target = self.target(bucket, None);
        let resp = self
            .signed_request(Method::HEAD, &target, Vec::new())
            .send()
            .await
            .with_context(|| format!("Failed to check bucket '{}'", bucket))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => bail!("S3 HeadBucket failed (HTTP {}) for bucket '{}'", s, bucket),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let target = self.target(bucket, None);
        let body = if self.region == "us-east-1" {
            Vec::new()
        } else {
            format!(
                "<CreateBucketConfiguration><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.region
            )
            .into_bytes()
        };

        let resp = self
            .signed_request(Method::PUT, &target, body)
            .send()
            .await
            .with_context(|| format!("Failed to create bucket '{}'", bucket))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 CreateBucket failed (HTTP {}) for bucket '{}': {}",
                status,
                bucket,
                describe_s3_error(&body)
            );
        }

        tracing::info!(bucket, "created bucket");
        Ok(())
    }
}

// ============ Addressing ============

/// Resolve URL, `Host` header and canonical URI for a bucket (and key).
///
/// Custom endpoints use path-style addressing (`http://host/bucket/key`),
/// AWS uses virtual-hosted addressing (`https://bucket.s3.region.amazonaws.com/key`).
fn resolve_target(
    endpoint_url: Option<&str>,
    region: &str,
    bucket: &str,
    key: Option<&str>,
) -> RequestTarget {
    let encoded_key = key.map(|k| k.split('/').map(uri_encode).collect::<Vec<_>>().join("/"));

    match endpoint_url {
        Some(endpoint) => {
            let (scheme, host) = match endpoint.split_once("://") {
                Some((scheme, host)) => (scheme, host.trim_end_matches('/')),
                None => ("http", endpoint.trim_end_matches('/')),
            };
            let canonical_uri = match encoded_key {
                Some(k) => format!("/{}/{}", uri_encode(bucket), k),
                None => format!("/{}", uri_encode(bucket)),
            };
            RequestTarget {
                url: format!("{}://{}{}", scheme, host, canonical_uri),
                host: host.to_string(),
                canonical_uri,
            }
        }
        None => {
            let host = format!("{}.s3.{}.amazonaws.com", bucket, region);
            let canonical_uri = match encoded_key {
                Some(k) => format!("/{}", k),
                None => "/".to_string(),
            };
            RequestTarget {
                url: format!("https://{}{}", host, canonical_uri),
                host,
                canonical_uri,
            }
        }
    }
}

// ============ AWS SigV4 ============

struct SignedHeaders {
    authorization: String,
    amz_date: String,
}

fn sign_request(
    creds: &S3Credentials,
    region: &str,
    method: &str,
    target: &RequestTarget,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> SignedHeaders {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), target.host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    // No query string on any request this client makes.
    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, target.canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; leaves `A-Z a-z 0-9 - _ . ~` untouched.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ Error bodies ============

/// Render an S3 XML error body as `Code: Message`, or a truncated raw body.
fn describe_s3_error(body: &str) -> String {
    match (
        extract_xml_value(body, "Code"),
        extract_xml_value(body, "Message"),
    ) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code,
        _ => body.chars().take(500).collect(),
    }
}

/// Text content of the first `<tag>` (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}
