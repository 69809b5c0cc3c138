//! Direction, amount and counterparty inference from token balance deltas.
//!
//! Classification runs an ordered chain of strategies and takes the first
//! verdict. Only the pool-delta strategy is authoritative; anything decided
//! further down the chain is marked [`Confidence::Heuristic`].

pub mod counterparty;
pub mod strategies;

use crate::rpc::FetchedTransaction;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use counterparty::CounterpartyResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strategies::ClassificationStrategy;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationContext {
  pub pool_address: String,
  pub token_mint: String,
}

impl ClassificationContext {
  pub fn new(pool_address: impl Into<String>, token_mint: impl Into<String>) -> Self {
    Self {
      pool_address: pool_address.into(),
      token_mint: token_mint.into(),
    }
  }

  pub fn is_pool(&self, delta: &AccountDelta) -> bool {
    delta.token_account == self.pool_address
      || delta.owner.as_deref() == Some(self.pool_address.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
  Buy,
  Sell,
  Transfer,
  Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
  Primary,
  Heuristic,
}

/// What a single strategy decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
  pub direction: Direction,
  pub amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
  pub direction: Direction,
  /// Absolute amount moved; `None` when no delta could be resolved.
  pub amount: Option<BigDecimal>,
  pub counterparty: Option<String>,
  pub classified_by: &'static str,
  pub confidence: Confidence,
}

/// Net change of the watched mint on one token account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDelta {
  pub account_index: usize,
  pub token_account: String,
  pub owner: Option<String>,
  pub delta: BigDecimal,
}

impl AccountDelta {
  /// Owner wallet when the RPC reported one, else the token account itself.
  pub fn address(&self) -> &str {
    self.owner.as_deref().unwrap_or(&self.token_account)
  }
}

/// Per-account deltas for `mint`, in account-index order. An account present
/// on only one side counts as zero on the other.
pub fn mint_deltas(tx: &FetchedTransaction, mint: &str) -> Vec<AccountDelta> {
  let mut by_index: BTreeMap<usize, (Option<String>, BigDecimal, BigDecimal)> = BTreeMap::new();

  for balance in tx.pre_token_balances.iter().filter(|b| b.mint == mint) {
    let entry = by_index
      .entry(balance.account_index)
      .or_insert_with(|| (None, BigDecimal::zero(), BigDecimal::zero()));
    entry.0 = entry.0.take().or_else(|| balance.owner.clone());
    entry.1 += &balance.amount;
  }
  for balance in tx.post_token_balances.iter().filter(|b| b.mint == mint) {
    let entry = by_index
      .entry(balance.account_index)
      .or_insert_with(|| (None, BigDecimal::zero(), BigDecimal::zero()));
    entry.0 = entry.0.take().or_else(|| balance.owner.clone());
    entry.2 += &balance.amount;
  }

  by_index
    .into_iter()
    .map(|(account_index, (owner, pre, post))| AccountDelta {
      account_index,
      token_account: tx
        .account_keys
        .get(account_index)
        .map(|k| k.pubkey.clone())
        .unwrap_or_default(),
      owner,
      delta: post - pre,
    })
    .collect()
}

/// Absolute value rounded half-up to two places, e.g. `2000.00`.
pub fn format_amount(amount: &BigDecimal) -> String {
  amount.abs().with_scale_round(2, RoundingMode::HalfUp).to_string()
}

/// `first4...last4`, or the address unchanged when it is too short to elide.
pub fn display_address(address: &str) -> String {
  let chars: Vec<char> = address.chars().collect();
  if chars.len() <= 11 {
    return address.to_string();
  }
  let head: String = chars[..4].iter().collect();
  let tail: String = chars[chars.len() - 4..].iter().collect();
  format!("{}...{}", head, tail)
}

pub struct Classifier {
  context: ClassificationContext,
  strategies: Vec<Box<dyn ClassificationStrategy>>,
  resolvers: Vec<Box<dyn CounterpartyResolver>>,
}

impl Classifier {
  /// Pool delta, then mint delta, then account count, then the default.
  pub fn new(context: ClassificationContext) -> Self {
    Self::with_chains(context, strategies::default_chain(), counterparty::default_chain())
  }

  pub fn with_chains(
    context: ClassificationContext,
    strategies: Vec<Box<dyn ClassificationStrategy>>,
    resolvers: Vec<Box<dyn CounterpartyResolver>>,
  ) -> Self {
    Self {
      context,
      strategies,
      resolvers,
    }
  }

  pub fn context(&self) -> &ClassificationContext {
    &self.context
  }

  pub fn classify(&self, tx: &FetchedTransaction) -> Classification {
    let deltas = mint_deltas(tx, &self.context.token_mint);

    let counterparty = self.resolvers.iter().find_map(|resolver| {
      let found = resolver.resolve(tx, &self.context, &deltas)?;
      debug!("👤 {} counterparty {} via {}", tx.signature, found, resolver.name());
      Some(found)
    });

    for strategy in &self.strategies {
      if let Some(verdict) = strategy.classify(tx, &self.context, &deltas) {
        debug!(
          "🔎 {} classified by {}: {:?} {:?}",
          tx.signature,
          strategy.name(),
          verdict.direction,
          verdict.amount
        );
        return Classification {
          direction: verdict.direction,
          amount: verdict.amount.map(|a| a.abs()),
          counterparty,
          classified_by: strategy.name(),
          confidence: strategy.confidence(),
        };
      }
    }

    let direction = if deltas.is_empty() {
      Direction::Unknown
    } else {
      Direction::Transfer
    };
    debug!("🔎 {} fell through every strategy: {:?}", tx.signature, direction);

    Classification {
      direction,
      amount: None,
      counterparty,
      classified_by: "default",
      confidence: Confidence::Heuristic,
    }
  }
}

#[cfg(test)]
pub(crate) mod fixtures {
  use crate::rpc::{AccountKey, FetchedTransaction, TokenBalance};
  use bigdecimal::BigDecimal;
  use std::str::FromStr;

  pub const MINT: &str = "Mint1111111111111111111111111111111111111111";
  pub const POOL: &str = "Pool1111111111111111111111111111111111111111";

  pub fn key(pubkey: &str, signer: bool, writable: bool) -> AccountKey {
    AccountKey {
      pubkey: pubkey.to_string(),
      signer,
      writable,
    }
  }

  pub fn balance(index: usize, owner: &str, amount: &str) -> TokenBalance {
    TokenBalance {
      account_index: index,
      mint: MINT.to_string(),
      owner: Some(owner.to_string()),
      amount: BigDecimal::from_str(amount).unwrap(),
    }
  }

  /// Buyer wallet signs; the pool vault and the buyer's token account move.
  pub fn swap(signature: &str, pool_pre: &str, pool_post: &str, wallet_pre: &str, wallet_post: &str) -> FetchedTransaction {
    FetchedTransaction {
      signature: signature.to_string(),
      slot: 1,
      block_time: Some(1_700_000_000),
      success: true,
      account_keys: vec![
        key("Wallet11111111111111111111111111111111111111", true, true),
        key("PoolVault111111111111111111111111111111111111", false, true),
        key("WalletAta11111111111111111111111111111111111", false, true),
        key(MINT, false, false),
      ],
      pre_token_balances: vec![
        balance(1, POOL, pool_pre),
        balance(2, "Wallet11111111111111111111111111111111111111", wallet_pre),
      ],
      post_token_balances: vec![
        balance(1, POOL, pool_post),
        balance(2, "Wallet11111111111111111111111111111111111111", wallet_post),
      ],
    }
  }
}
