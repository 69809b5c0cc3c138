//! Client side of the external points/token ledger. Atomicity of credits and
//! exchanges belongs to the service; this side only validates requests
//! before sending them.

use crate::config::validate_address;
use crate::error::{PointsError, ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POINTS_PER_TOKEN: u64 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBalance {
    pub points: u64,
    pub tokens: u64,
}

#[async_trait]
pub trait PointsLedger: Send + Sync {
    async fn balance(&self, wallet: &str) -> Result<PointsBalance, PointsError>;

    async fn credit_points(&self, wallet: &str, amount: u64, reason: &str) -> Result<PointsBalance, PointsError>;

    async fn exchange_points_for_tokens(
        &self,
        wallet: &str,
        points: u64,
        tokens: u64,
    ) -> Result<PointsBalance, PointsError>;
}

pub fn validate_credit(wallet: &str, amount: u64) -> Result<(), ValidationError> {
    validate_address("walletAddress", wallet)?;
    if amount == 0 {
        return Err(ValidationError::Range {
            field: "amount",
            value: 0,
            min: 1,
            max: u64::MAX,
        });
    }
    Ok(())
}

/// Both sides positive and `points == tokens * points_per_token`.
pub fn validate_exchange(wallet: &str, points: u64, tokens: u64, points_per_token: u64) -> Result<(), ValidationError> {
    validate_address("walletAddress", wallet)?;
    if points == 0 || tokens == 0 {
        return Err(ValidationError::Inconsistent(
            "exchange needs a positive number of points and tokens".to_string(),
        ));
    }
    if tokens.checked_mul(points_per_token) != Some(points) {
        return Err(ValidationError::Inconsistent(format!(
            "{} points do not buy {} tokens at {} points per token",
            points, tokens, points_per_token
        )));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRequest<'a> {
    wallet_address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreditRequest<'a> {
    wallet_address: &'a str,
    amount: u64,
    reason: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    wallet_address: &'a str,
    points: u64,
    tokens: u64,
}

pub struct HttpPointsLedger {
    client: reqwest::Client,
    base_url: String,
    points_per_token: u64,
}

impl HttpPointsLedger {
    pub fn new(base_url: &str, points_per_token: u64) -> Result<Self, PointsError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            points_per_token,
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    async fn post<B: Serialize + Sync>(&self, name: &'static str, body: &B) -> Result<PointsBalance, PointsError> {
        let url = self.endpoint(name);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PointsError::Rejected {
                endpoint: name,
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PointsLedger for HttpPointsLedger {
    async fn balance(&self, wallet: &str) -> Result<PointsBalance, PointsError> {
        validate_address("walletAddress", wallet)?;
        self.post("getBalance", &BalanceRequest { wallet_address: wallet }).await
    }

    async fn credit_points(&self, wallet: &str, amount: u64, reason: &str) -> Result<PointsBalance, PointsError> {
        validate_credit(wallet, amount)?;
        let balance = self
            .post(
                "creditPoints",
                &CreditRequest {
                    wallet_address: wallet,
                    amount,
                    reason,
                },
            )
            .await?;
        info!("➕ Credited {} points to {} ({})", amount, wallet, reason);
        Ok(balance)
    }

    async fn exchange_points_for_tokens(
        &self,
        wallet: &str,
        points: u64,
        tokens: u64,
    ) -> Result<PointsBalance, PointsError> {
        validate_exchange(wallet, points, tokens, self.points_per_token)?;
        let balance = self
            .post(
                "exchangePoints",
                &ExchangeRequest {
                    wallet_address: wallet,
                    points,
                    tokens,
                },
            )
            .await?;
        info!("🔁 {} exchanged {} points for {} tokens", wallet, points, tokens);
        Ok(balance)
    }
}

/// Mutex-guarded stand-in with the same contract as the service.
pub struct InMemoryPointsLedger {
    balances: Mutex<HashMap<String, PointsBalance>>,
    points_per_token: u64,
}

impl InMemoryPointsLedger {
    pub fn new(points_per_token: u64) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            points_per_token,
        }
    }
}

#[async_trait]
impl PointsLedger for InMemoryPointsLedger {
    async fn balance(&self, wallet: &str) -> Result<PointsBalance, PointsError> {
        validate_address("walletAddress", wallet)?;
        let balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        Ok(balances.get(wallet).copied().unwrap_or_default())
    }

    async fn credit_points(&self, wallet: &str, amount: u64, _reason: &str) -> Result<PointsBalance, PointsError> {
        validate_credit(wallet, amount)?;
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        let entry = balances.entry(wallet.to_string()).or_default();
        entry.points = entry.points.saturating_add(amount);
        Ok(*entry)
    }

    async fn exchange_points_for_tokens(
        &self,
        wallet: &str,
        points: u64,
        tokens: u64,
    ) -> Result<PointsBalance, PointsError> {
        validate_exchange(wallet, points, tokens, self.points_per_token)?;
        let mut balances = self.balances.lock().unwrap_or_else(|e| e.into_inner());
        let entry = balances.entry(wallet.to_string()).or_default();
        if entry.points < points {
            return Err(PointsError::InsufficientBalance {
                needed: points,
                available: entry.points,
            });
        }
        entry.points -= points;
        entry.tokens = entry.tokens.saturating_add(tokens);
        Ok(*entry)
    }
}
