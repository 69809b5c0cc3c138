pub mod extractor;
pub mod poller;

pub use poller::SignaturePoller;

use crate::config::validate_rpc_url;
use crate::error::{ConnectError, FetchError};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use solana_account_decoder::UiAccountEncoding;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTransactionConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use solana_transaction_status::UiTransactionEncoding;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGCPFhP3c7J4JjtKbt1T7rHr7eR";

/// One entry of a signatures-for-address listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub pubkey: String,
    pub signer: bool,
    pub writable: bool,
}

/// A token balance entry with the exact decimal amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    pub amount: BigDecimal,
}

/// What the rest of the crate needs from a fetched transaction, independent
/// of the RPC's encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub success: bool,
    pub account_keys: Vec<AccountKey>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Clone)]
pub struct ProgramAccount {
    pub pubkey: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    DataSize(u64),
    Memcmp { offset: usize, bytes: Vec<u8> },
}

/// The blockchain calls the subsystem depends on.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn version(&self) -> Result<String, FetchError>;

    async fn slot(&self) -> Result<u64, FetchError>;

    /// Newest first. Starts below `before` and stops ahead of `until` when
    /// either is given.
    async fn signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, FetchError>;

    async fn transaction(&self, signature: &str) -> Result<FetchedTransaction, FetchError>;

    async fn program_accounts(
        &self,
        program: &str,
        filters: &[AccountFilter],
    ) -> Result<Vec<ProgramAccount>, FetchError>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ChainSource>, ConnectError>;
}

pub struct SolanaRpc {
    client: RpcClient,
    url: String,
    timeout: Duration,
}

impl SolanaRpc {
    /// Opens a client and proves liveness with a version call before
    /// reporting success.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        validate_rpc_url("rpcUrl", url).map_err(|_| ConnectError::InvalidUrl(url.to_string()))?;

        let client = RpcClient::new_with_timeout_and_commitment(
            url.to_string(),
            timeout,
            CommitmentConfig::confirmed(),
        );

        let version = match tokio::time::timeout(timeout, client.get_version()).await {
            Ok(Ok(version)) => version,
            Ok(Err(e)) => {
                return Err(ConnectError::Handshake {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => return Err(ConnectError::Timeout(url.to_string())),
        };

        info!("🔗 RPC connected: {} (solana-core {})", url, version.solana_core);

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn timed<T, F>(&self, method: &'static str, call: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FetchError::Rpc {
                method,
                reason: e.to_string(),
            }),
            Err(_) => Err(FetchError::Timeout {
                method,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

fn parse_pubkey(address: &str) -> Result<Pubkey, FetchError> {
    Pubkey::from_str(address).map_err(|_| FetchError::InvalidAddress(address.to_string()))
}

fn parse_signature(signature: &str) -> Result<Signature, FetchError> {
    Signature::from_str(signature).map_err(|_| FetchError::InvalidSignature(signature.to_string()))
}

#[async_trait]
impl ChainSource for SolanaRpc {
    async fn version(&self) -> Result<String, FetchError> {
        let version = self.timed("getVersion", self.client.get_version()).await?;
        Ok(version.solana_core)
    }

    async fn slot(&self) -> Result<u64, FetchError> {
        self.timed("getSlot", self.client.get_slot()).await
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, FetchError> {
        let pubkey = parse_pubkey(address)?;
        let before = before.map(parse_signature).transpose()?;
        let until = until.map(parse_signature).transpose()?;

        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let statuses = self
            .timed(
                "getSignaturesForAddress",
                self.client.get_signatures_for_address_with_config(&pubkey, config),
            )
            .await?;

        Ok(statuses
            .into_iter()
            .map(|s| SignatureInfo {
                failed: s.err.is_some(),
                signature: s.signature,
                slot: s.slot,
                block_time: s.block_time,
            })
            .collect())
    }

    async fn transaction(&self, signature: &str) -> Result<FetchedTransaction, FetchError> {
        let sig = parse_signature(signature)?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let response = self
            .timed(
                "getTransaction",
                self.client.get_transaction_with_config(&sig, config),
            )
            .await?;

        Ok(extractor::extract_transaction(
            signature,
            response.slot,
            response.block_time,
            &response.transaction,
        )?)
    }

    async fn program_accounts(
        &self,
        program: &str,
        filters: &[AccountFilter],
    ) -> Result<Vec<ProgramAccount>, FetchError> {
        let program_id = parse_pubkey(program)?;
        let rpc_filters = filters
            .iter()
            .map(|f| match f {
                AccountFilter::DataSize(size) => RpcFilterType::DataSize(*size),
                AccountFilter::Memcmp { offset, bytes } => {
                    RpcFilterType::Memcmp(Memcmp::new_raw_bytes(*offset, bytes.clone()))
                }
            })
            .collect();

        let config = RpcProgramAccountsConfig {
            filters: Some(rpc_filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            ..Default::default()
        };

        let accounts = self
            .timed(
                "getProgramAccounts",
                self.client.get_program_accounts_with_config(&program_id, config),
            )
            .await?;

        Ok(accounts
            .into_iter()
            .map(|(pubkey, account)| ProgramAccount {
                pubkey: pubkey.to_string(),
                data: account.data,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolanaConnector {
    pub timeout: Duration,
}

#[async_trait]
impl Connector for SolanaConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ChainSource>, ConnectError> {
        let rpc = SolanaRpc::connect(url, self.timeout).await?;
        Ok(Arc::new(rpc))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected { url: String },
    Reconnecting { url: String, failures: u32 },
}

/// Connectivity indicator. Failures only ever change this flag; they never
/// stop a polling loop.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    status: Arc<RwLock<ConnectionStatus>>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self {
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
        }
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionStatus {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, status: ConnectionStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn mark_connected(&self, url: &str) {
        self.set(ConnectionStatus::Connected {
            url: url.to_string(),
        });
    }

    pub fn mark_failure(&self, url: &str) {
        let failures = match self.get() {
            ConnectionStatus::Reconnecting { failures, .. } => failures + 1,
            _ => 1,
        };
        if failures == 1 || failures % 10 == 0 {
            warn!("⚠️ RPC {} unreachable ({} consecutive failures)", url, failures);
        }
        self.set(ConnectionStatus::Reconnecting {
            url: url.to_string(),
            failures,
        });
    }

    pub fn mark_disconnected(&self) {
        self.set(ConnectionStatus::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.get(), ConnectionStatus::Connected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_counts_consecutive_failures() {
        let monitor = ConnectionMonitor::new();
        monitor.mark_failure("https://rpc.example");
        monitor.mark_failure("https://rpc.example");
        assert_eq!(
            monitor.get(),
            ConnectionStatus::Reconnecting {
                url: "https://rpc.example".into(),
                failures: 2
            }
        );

        monitor.mark_connected("https://rpc.example");
        assert!(monitor.is_connected());
        monitor.mark_failure("https://rpc.example");
        assert!(matches!(monitor.get(), ConnectionStatus::Reconnecting { failures: 1, .. }));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url_without_network() {
        let result = SolanaRpc::connect("not a url", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ConnectError::InvalidUrl(_))));
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_pubkey(TOKEN_PROGRAM_ID).is_ok());
        assert!(matches!(parse_pubkey("xyz"), Err(FetchError::InvalidAddress(_))));
        assert!(matches!(parse_signature("xyz"), Err(FetchError::InvalidSignature(_))));
    }
}
