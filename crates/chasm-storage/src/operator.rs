//! OpenDAL Operator factory for remote stores

use anyhow::{Context, Result};
use chasm_core::config::StorageConfig;
use chasm_core::types::{RemoteService, RemoteStoreConfig};
use opendal::Operator;

/// Access keys for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Credentials {
    /// Read AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY (standard S3 env vars),
    /// falling back to the CHASM_-prefixed names.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("CHASM_ACCESS_KEY_ID"))
            .context(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
            )?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("CHASM_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which is what MinIO
/// and SeaweedFS expect.
pub fn build_s3_operator(cfg: &RemoteStoreConfig, creds: &S3Credentials) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL S3 operator for store {}", cfg.name))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build a process-local in-memory operator. Contents vanish with the process.
pub fn build_memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish())
}

/// Build the operator for a registered remote store.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints.
/// `creds` is only consulted for S3; pass `None` to read them from the
/// environment.
pub fn build_remote_operator(
    cfg: &RemoteStoreConfig,
    storage: &StorageConfig,
    creds: Option<&S3Credentials>,
) -> Result<Operator> {
    match cfg.service {
        RemoteService::Memory => build_memory_operator(),
        RemoteService::S3 => {
            if cfg.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "store {} uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false.",
                        cfg.name,
                        cfg.endpoint
                    );
                }
                tracing::warn!(
                    store = %cfg.name,
                    endpoint = %cfg.endpoint,
                    "remote store uses plaintext HTTP, credentials are transmitted unencrypted"
                );
            }
            let creds = match creds {
                Some(c) => c.clone(),
                None => S3Credentials::from_env()?,
            };
            build_s3_operator(cfg, &creds)
        }
    }
}
