use super::{AccountDelta, ClassificationContext, Confidence, Direction, Verdict};
use crate::rpc::FetchedTransaction;
use bigdecimal::{BigDecimal, Signed, Zero};

/// One step of the classification chain. `None` hands over to the next.
pub trait ClassificationStrategy: Send + Sync {
  fn name(&self) -> &'static str;

  fn confidence(&self) -> Confidence {
    Confidence::Heuristic
  }

  fn classify(
    &self,
    tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    deltas: &[AccountDelta],
  ) -> Option<Verdict>;
}

pub fn default_chain() -> Vec<Box<dyn ClassificationStrategy>> {
  vec![Box::new(PoolDelta), Box::new(MintDelta), Box::new(AccountCount)]
}

fn largest_non_pool<'a>(ctx: &ClassificationContext, deltas: &'a [AccountDelta]) -> Option<&'a AccountDelta> {
  deltas
    .iter()
    .filter(|d| !ctx.is_pool(d) && !d.delta.is_zero())
    .fold(None, |best: Option<&AccountDelta>, d| match best {
      Some(b) if b.delta.abs() >= d.delta.abs() => Some(b),
      _ => Some(d),
    })
}

/// Pool lost tokens: someone bought. Pool gained tokens: someone sold.
pub struct PoolDelta;

impl ClassificationStrategy for PoolDelta {
  fn name(&self) -> &'static str {
    "pool-delta"
  }

  fn confidence(&self) -> Confidence {
    Confidence::Primary
  }

  fn classify(
    &self,
    _tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    deltas: &[AccountDelta],
  ) -> Option<Verdict> {
    let pool: Vec<&AccountDelta> = deltas.iter().filter(|d| ctx.is_pool(d)).collect();
    if pool.is_empty() {
      return None;
    }

    let pool_delta: BigDecimal = pool.iter().map(|d| d.delta.clone()).sum();
    if pool_delta.is_zero() {
      return None;
    }

    let direction = if pool_delta.is_negative() {
      Direction::Buy
    } else {
      Direction::Sell
    };

    let amount = match largest_non_pool(ctx, deltas) {
      Some(counterparty) if counterparty.delta.abs() > pool_delta.abs() => counterparty.delta.abs(),
      _ => pool_delta.abs(),
    };

    Some(Verdict {
      direction,
      amount: Some(amount),
    })
  }
}

/// No usable pool movement: read the direction off the non-pool account
/// with the largest change. A net-zero shuffle between holders is left to
/// later steps.
pub struct MintDelta;

impl ClassificationStrategy for MintDelta {
  fn name(&self) -> &'static str {
    "mint-delta"
  }

  fn classify(
    &self,
    _tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    deltas: &[AccountDelta],
  ) -> Option<Verdict> {
    let net: BigDecimal = deltas
      .iter()
      .filter(|d| !ctx.is_pool(d))
      .map(|d| d.delta.clone())
      .sum();
    if net.is_zero() {
      return None;
    }

    let largest = largest_non_pool(ctx, deltas)?;
    let direction = if largest.delta.is_positive() {
      Direction::Buy
    } else {
      Direction::Sell
    };

    Some(Verdict {
      direction,
      amount: Some(largest.delta.abs()),
    })
  }
}

/// Last resort: a token account appearing for the mint reads as a buy, one
/// disappearing as a sell. No amount is claimed.
pub struct AccountCount;

impl ClassificationStrategy for AccountCount {
  fn name(&self) -> &'static str {
    "account-count"
  }

  fn classify(
    &self,
    tx: &FetchedTransaction,
    ctx: &ClassificationContext,
    _deltas: &[AccountDelta],
  ) -> Option<Verdict> {
    let count = |balances: &[crate::rpc::TokenBalance]| {
      balances.iter().filter(|b| b.mint == ctx.token_mint).count()
    };
    let before = count(&tx.pre_token_balances);
    let after = count(&tx.post_token_balances);

    let direction = match after.cmp(&before) {
      std::cmp::Ordering::Greater => Direction::Buy,
      std::cmp::Ordering::Less => Direction::Sell,
      std::cmp::Ordering::Equal => return None,
    };

    Some(Verdict {
      direction,
      amount: None,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::classifier::fixtures::*;
  use crate::classifier::{Classifier, mint_deltas};

  fn ctx() -> ClassificationContext {
    ClassificationContext::new(POOL, MINT)
  }

  #[test]
  fn test_pool_delta_ignores_flat_pool() {
    let tx = swap("sig", "500", "500", "0", "20");
    let deltas = mint_deltas(&tx, MINT);
    assert_eq!(PoolDelta.classify(&tx, &ctx(), &deltas), None);
  }

  #[test]
  fn test_pool_matched_by_token_account_key() {
    let mut tx = swap("sig", "100", "60", "0", "40");
    for b in tx.pre_token_balances.iter_mut().chain(tx.post_token_balances.iter_mut()) {
      b.owner = None;
    }
    let ctx = ClassificationContext::new("PoolVault111111111111111111111111111111111111", MINT);
    let deltas = mint_deltas(&tx, MINT);
    let verdict = PoolDelta.classify(&tx, &ctx, &deltas).unwrap();
    assert_eq!(verdict.direction, Direction::Buy);
    assert_eq!(verdict.amount, Some(BigDecimal::from(40)));
  }

  #[test]
  fn test_mint_delta_fallback_when_pool_absent() {
    let mut tx = swap("sig", "0", "0", "10", "260");
    tx.pre_token_balances.remove(0);
    tx.post_token_balances.remove(0);

    let c = Classifier::new(ctx()).classify(&tx);
    assert_eq!(c.direction, Direction::Buy);
    assert_eq!(c.amount, Some(BigDecimal::from(250)));
    assert_eq!(c.classified_by, "mint-delta");
    assert_eq!(c.confidence, Confidence::Heuristic);
  }

  #[test]
  fn test_balanced_transfer_falls_to_default() {
    let tx = FetchedTransaction {
      pre_token_balances: vec![balance(0, "Alice111111111111111111111111111111111111111", "100"), balance(1, "Bob11111111111111111111111111111111111111111", "0")],
      post_token_balances: vec![balance(0, "Alice111111111111111111111111111111111111111", "70"), balance(1, "Bob11111111111111111111111111111111111111111", "30")],
      ..swap("sig", "0", "0", "0", "0")
    };

    let c = Classifier::new(ctx()).classify(&tx);
    assert_eq!(c.direction, Direction::Transfer);
    assert_eq!(c.amount, None);
    assert_eq!(c.classified_by, "default");
  }

  #[test]
  fn test_account_count_heuristic() {
    let mut tx = swap("sig", "0", "0", "0", "0");
    tx.pre_token_balances.clear();
    tx.post_token_balances.truncate(1);
    tx.post_token_balances[0].owner = Some("Someone1111111111111111111111111111111111111".into());
    tx.post_token_balances[0].amount = BigDecimal::from(0);

    let verdict = AccountCount.classify(&tx, &ctx(), &[]).unwrap();
    assert_eq!(verdict.direction, Direction::Buy);
    assert_eq!(verdict.amount, None);
  }
}
