use crate::error::ParseError;
use solana_sdk::pubkey::Pubkey;

/// Size of an SPL token account; also the program-scan size filter.
pub const TOKEN_ACCOUNT_LEN: u64 = 165;

const MINT_RANGE: std::ops::Range<usize> = 0..32;
const OWNER_RANGE: std::ops::Range<usize> = 32..64;
const AMOUNT_RANGE: std::ops::Range<usize> = 64..72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHolding {
  pub mint: String,
  pub owner: String,
  pub amount: u64,
}

/// Reads mint, owner and the little-endian amount at their fixed offsets.
/// Anything past byte 72 is ignored.
pub fn parse_token_account(data: &[u8]) -> Result<RawHolding, ParseError> {
  if data.len() < AMOUNT_RANGE.end {
    return Err(ParseError::AccountTooShort(data.len()));
  }

  let key_at = |range: std::ops::Range<usize>| {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data[range]);
    Pubkey::new_from_array(bytes).to_string()
  };

  let mut amount = [0u8; 8];
  amount.copy_from_slice(&data[AMOUNT_RANGE]);

  Ok(RawHolding {
    mint: key_at(MINT_RANGE),
    owner: key_at(OWNER_RANGE),
    amount: u64::from_le_bytes(amount),
  })
}

/// Test and tooling helper: lays out a minimal token account.
pub fn encode_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
  let mut data = vec![0u8; TOKEN_ACCOUNT_LEN as usize];
  data[MINT_RANGE].copy_from_slice(mint.as_ref());
  data[OWNER_RANGE].copy_from_slice(owner.as_ref());
  data[AMOUNT_RANGE].copy_from_slice(&amount.to_le_bytes());
  data
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reads_fixed_offsets() {
    let mint = Pubkey::new_unique();
    let owner = Pubkey::new_unique();
    let data = encode_token_account(&mint, &owner, 1_234_567_890_123);

    let holding = parse_token_account(&data).unwrap();
    assert_eq!(holding.mint, mint.to_string());
    assert_eq!(holding.owner, owner.to_string());
    assert_eq!(holding.amount, 1_234_567_890_123);
  }

  #[test]
  fn test_amount_is_little_endian() {
    let mut data = vec![0u8; 72];
    data[64] = 0x01;
    data[65] = 0x02;
    assert_eq!(parse_token_account(&data).unwrap().amount, 0x0201);
  }

  #[test]
  fn test_short_account_is_rejected() {
    assert_eq!(parse_token_account(&[0u8; 71]), Err(ParseError::AccountTooShort(71)));
  }
}
