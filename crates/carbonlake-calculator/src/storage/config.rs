use serde::{Deserialize, Serialize};
use std::env;

/// Connection settings for one S3-compatible bucket
///
/// When `access_key`/`secret_key` are absent the default AWS credential
/// chain is used.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl StorageConfig {
    /// Read shared `S3_*` settings and the bucket name from `bucket_var`
    pub fn from_env(bucket_var: &str, default_bucket: &str) -> Self {
        Self::from_lookup(|key| env::var(key).ok(), bucket_var, default_bucket)
    }

    /// Same as [`StorageConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(var: F, bucket_var: &str, default_bucket: &str) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION")
                .or_else(|| var("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),
            bucket: var(bucket_var).unwrap_or_else(|| default_bucket.to_string()),
            access_key: var("S3_ACCESS_KEY"),
            secret_key: var("S3_SECRET_KEY"),
            path_style: var("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }
}
