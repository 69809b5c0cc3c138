use super::{AccountDelta, ClassificationContext};
use crate::rpc::{FetchedTransaction, TOKEN_PROGRAM_ID};
use bigdecimal::Zero;

const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// One step of the counterparty chain; the first `Some` wins.
pub trait CounterpartyResolver: Send + Sync {
  fn name(&self) -> &'static str;

  fn resolve(
    &self,
    tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    deltas: &[AccountDelta],
  ) -> Option<String>;
}

pub fn default_chain() -> Vec<Box<dyn CounterpartyResolver>> {
  vec![
    Box::new(LargestDelta),
    Box::new(FirstNonPoolKey),
    Box::new(FirstWritableNonPool),
    Box::new(FeePayer),
    Box::new(AnyNonPool),
  ]
}

/// Keys that can never be a trading party.
fn is_infrastructure(key: &str, ctx: &ClassificationContext) -> bool {
  key == ctx.pool_address || key == ctx.token_mint || key == TOKEN_PROGRAM_ID || key == SYSTEM_PROGRAM_ID
}

/// Owner of the non-pool account whose balance moved the most.
pub struct LargestDelta;

impl CounterpartyResolver for LargestDelta {
  fn name(&self) -> &'static str {
    "largest-delta"
  }

  fn resolve(
    &self,
    _tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    deltas: &[AccountDelta],
  ) -> Option<String> {
    deltas
      .iter()
      .filter(|d| !ctx.is_pool(d) && !d.delta.is_zero())
      .fold(None, |best: Option<&AccountDelta>, d| match best {
        Some(b) if b.delta.abs() >= d.delta.abs() => Some(b),
        _ => Some(d),
      })
      .map(|d| d.address().to_string())
  }
}

/// First non-pool owner listed in the balances, moved or not.
pub struct FirstNonPoolKey;

impl CounterpartyResolver for FirstNonPoolKey {
  fn name(&self) -> &'static str {
    "first-non-pool-key"
  }

  fn resolve(
    &self,
    _tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    deltas: &[AccountDelta],
  ) -> Option<String> {
    deltas
      .iter()
      .filter(|d| !ctx.is_pool(d))
      .map(|d| d.address())
      .find(|a| !a.is_empty() && !is_infrastructure(a, ctx))
      .map(str::to_string)
  }
}

pub struct FirstWritableNonPool;

impl CounterpartyResolver for FirstWritableNonPool {
  fn name(&self) -> &'static str {
    "first-writable-non-pool"
  }

  fn resolve(
    &self,
    tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    _deltas: &[AccountDelta],
  ) -> Option<String> {
    tx.account_keys
      .iter()
      .find(|k| k.writable && !is_infrastructure(&k.pubkey, ctx))
      .map(|k| k.pubkey.clone())
  }
}

/// The first account key pays the fee and signs.
pub struct FeePayer;

impl CounterpartyResolver for FeePayer {
  fn name(&self) -> &'static str {
    "fee-payer"
  }

  fn resolve(
    &self,
    tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    _deltas: &[AccountDelta],
  ) -> Option<String> {
    tx.account_keys
      .first()
      .filter(|k| k.pubkey != ctx.pool_address)
      .map(|k| k.pubkey.clone())
  }
}

pub struct AnyNonPool;

impl CounterpartyResolver for AnyNonPool {
  fn name(&self) -> &'static str {
    "any-non-pool"
  }

  fn resolve(
    &self,
    tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    _deltas: &[AccountDelta],
  ) -> Option<String> {
    tx.account_keys
      .iter()
      .find(|k| k.pubkey != ctx.pool_address)
      .map(|k| k.pubkey.clone())
  }
}
