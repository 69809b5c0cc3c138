pub mod settings;

pub use settings::Settings;

use crate::error::ValidationError;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Live settings, replaced wholesale when an admin patch validates.
pub type SharedSettings = Arc<RwLock<Settings>>;

pub fn shared_settings(settings: Settings) -> SharedSettings {
  Arc::new(RwLock::new(settings))
}

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone)]
pub struct Config {
  pub redis_url: String,
  pub rpc_url: String,
  pub token_address: String,
  pub pool_address: String,
  pub api_port: u16,
  pub local_store_path: PathBuf,
  pub local_store_quota_bytes: usize,
  pub points_api_url: Option<String>,
  pub auto_start_detection: bool,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    dotenv::dotenv().ok();
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Builds the config from any key lookup. `from_env` is this over the
  /// process environment.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let token_address = lookup("TOKEN_ADDRESS")
      .context("TOKEN_ADDRESS must be set in .env")?;
    validate_address("TOKEN_ADDRESS", &token_address)?;

    let pool_address = lookup("POOL_ADDRESS")
      .context("POOL_ADDRESS must be set in .env")?;
    validate_address("POOL_ADDRESS", &pool_address)?;

    let rpc_url = lookup("RPC_URL")
      .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
    validate_rpc_url("RPC_URL", &rpc_url)?;

    Ok(Self {
      redis_url: lookup("REDIS_URL")
        .unwrap_or_else(|| "redis://localhost:6379".to_string()),

      rpc_url,
      token_address,
      pool_address,

      api_port: lookup("API_PORT")
        .unwrap_or_else(|| "8080".to_string())
        .parse()
        .context("API_PORT must be a valid number")?,

      local_store_path: lookup("LOCAL_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/local_store.json")),

      local_store_quota_bytes: lookup("LOCAL_STORE_QUOTA_BYTES")
        .map(|v| v.parse())
        .transpose()
        .context("LOCAL_STORE_QUOTA_BYTES must be a valid number")?
        .unwrap_or(5 * 1024 * 1024),

      points_api_url: lookup("POINTS_API_URL").filter(|v| !v.is_empty()),

      auto_start_detection: lookup("AUTO_START_DETECTION")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false),
    })
  }
}

/// A Solana address is base58 that decodes to exactly 32 bytes.
pub fn validate_address(field: &'static str, value: &str) -> Result<(), ValidationError> {
  match bs58::decode(value).into_vec() {
    Ok(bytes) if bytes.len() == 32 => Ok(()),
    _ => Err(ValidationError::Address {
      field,
      value: value.to_string(),
    }),
  }
}

pub fn validate_rpc_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
  let invalid = || ValidationError::Url {
    field,
    value: value.to_string(),
  };
  let url = reqwest::Url::parse(value).map_err(|_| invalid())?;
  if !matches!(url.scheme(), "http" | "https") {
    return Err(invalid());
  }
  match url.host_str() {
    Some(host) if !host.is_empty() => Ok(()),
    _ => Err(invalid()),
  }
}
