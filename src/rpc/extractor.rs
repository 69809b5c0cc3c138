use super::{AccountKey, FetchedTransaction, TokenBalance};
use crate::error::ParseError;
use bigdecimal::BigDecimal;
use solana_sdk::message::MessageHeader;
use solana_transaction_status::{
    EncodedTransaction, EncodedTransactionWithStatusMeta, UiMessage, UiTransactionStatusMeta,
    UiTransactionTokenBalance, option_serializer::OptionSerializer,
};
use std::str::FromStr;
use tracing::debug;

pub fn extract_transaction(
    signature: &str,
    slot: u64,
    block_time: Option<i64>,
    transaction: &EncodedTransactionWithStatusMeta,
) -> Result<FetchedTransaction, ParseError> {
    let meta = transaction
        .meta
        .as_ref()
        .ok_or_else(|| ParseError::MissingMeta(signature.to_string()))?;

    let account_keys = extract_account_keys(signature, &transaction.transaction, meta)?;

    let pre_token_balances = token_balances(&meta.pre_token_balances)?;
    let post_token_balances = token_balances(&meta.post_token_balances)?;

    debug!(
        "Extracted {}: {} keys, {} pre / {} post token balances",
        signature,
        account_keys.len(),
        pre_token_balances.len(),
        post_token_balances.len()
    );

    Ok(FetchedTransaction {
        signature: signature.to_string(),
        slot,
        block_time,
        success: meta.err.is_none(),
        account_keys,
        pre_token_balances,
        post_token_balances,
    })
}

fn extract_account_keys(
    signature: &str,
    transaction: &EncodedTransaction,
    meta: &UiTransactionStatusMeta,
) -> Result<Vec<AccountKey>, ParseError> {
    match transaction {
        EncodedTransaction::Json(ui_tx) => match &ui_tx.message {
            // Parsed messages already include lookup-table keys.
            UiMessage::Parsed(parsed_msg) => Ok(parsed_msg
                .account_keys
                .iter()
                .map(|key| AccountKey {
                    pubkey: key.pubkey.clone(),
                    signer: key.signer,
                    writable: key.writable,
                })
                .collect()),
            UiMessage::Raw(raw_msg) => {
                let mut keys = keys_from_header(&raw_msg.account_keys, &raw_msg.header);
                append_loaded_addresses(&mut keys, meta);
                Ok(keys)
            }
        },
        EncodedTransaction::LegacyBinary(_) | EncodedTransaction::Binary(_, _) => {
            let decoded = transaction
                .decode()
                .ok_or_else(|| ParseError::MissingAccountKeys(signature.to_string()))?;
            let static_keys: Vec<String> = decoded
                .message
                .static_account_keys()
                .iter()
                .map(|key| key.to_string())
                .collect();
            let mut keys = keys_from_header(&static_keys, decoded.message.header());
            append_loaded_addresses(&mut keys, meta);
            Ok(keys)
        }
        EncodedTransaction::Accounts(_) => Err(ParseError::MissingAccountKeys(signature.to_string())),
    }
}

fn keys_from_header(keys: &[String], header: &MessageHeader) -> Vec<AccountKey> {
    keys.iter()
        .enumerate()
        .map(|(index, pubkey)| AccountKey {
            pubkey: pubkey.clone(),
            signer: index < header.num_required_signatures as usize,
            writable: is_writable(index, keys.len(), header),
        })
        .collect()
}

/// Static-key writability from the message header: writable signers come
/// first, then readonly signers, then writable and readonly non-signers.
fn is_writable(index: usize, total: usize, header: &MessageHeader) -> bool {
    let signers = header.num_required_signatures as usize;
    if index < signers {
        index < signers.saturating_sub(header.num_readonly_signed_accounts as usize)
    } else {
        index < total.saturating_sub(header.num_readonly_unsigned_accounts as usize)
    }
}

fn append_loaded_addresses(keys: &mut Vec<AccountKey>, meta: &UiTransactionStatusMeta) {
    if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
        keys.extend(loaded.writable.iter().map(|pubkey| AccountKey {
            pubkey: pubkey.clone(),
            signer: false,
            writable: true,
        }));
        keys.extend(loaded.readonly.iter().map(|pubkey| AccountKey {
            pubkey: pubkey.clone(),
            signer: false,
            writable: false,
        }));
    }
}

fn token_balances(
    balances: &OptionSerializer<Vec<UiTransactionTokenBalance>>,
) -> Result<Vec<TokenBalance>, ParseError> {
    let OptionSerializer::Some(balances) = balances else {
        return Ok(Vec::new());
    };

    balances
        .iter()
        .map(|balance| {
            Ok(TokenBalance {
                account_index: balance.account_index as usize,
                mint: balance.mint.clone(),
                owner: match &balance.owner {
                    OptionSerializer::Some(owner) => Some(owner.clone()),
                    _ => None,
                },
                amount: parse_token_amount(
                    &balance.ui_token_amount.ui_amount_string,
                    &balance.ui_token_amount.amount,
                    balance.ui_token_amount.decimals,
                )?,
            })
        })
        .collect()
}

/// Prefers the RPC's decimal string; falls back to scaling the raw integer
/// amount by the mint's decimals.
pub fn parse_token_amount(ui_amount: &str, raw_amount: &str, decimals: u8) -> Result<BigDecimal, ParseError> {
    if let Ok(value) = BigDecimal::from_str(ui_amount) {
        return Ok(value);
    }
    if raw_amount.is_empty() || !raw_amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidAmount(raw_amount.to_string()));
    }
    BigDecimal::from_str(&format!("{}e-{}", raw_amount, decimals))
        .map_err(|_| ParseError::InvalidAmount(raw_amount.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(signers: u8, ro_signed: u8, ro_unsigned: u8) -> MessageHeader {
        MessageHeader {
            num_required_signatures: signers,
            num_readonly_signed_accounts: ro_signed,
            num_readonly_unsigned_accounts: ro_unsigned,
        }
    }

    #[test]
    fn test_writability_from_header() {
        // [payer(w,s), cosigner(r,s), pool(w), program(r)]
        let h = header(2, 1, 1);
        assert!(is_writable(0, 4, &h));
        assert!(!is_writable(1, 4, &h));
        assert!(is_writable(2, 4, &h));
        assert!(!is_writable(3, 4, &h));
    }

    #[test]
    fn test_parse_token_amount_prefers_ui_string() {
        assert_eq!(
            parse_token_amount("1500.25", "1500250000", 6).unwrap(),
            BigDecimal::from_str("1500.25").unwrap()
        );
        assert_eq!(
            parse_token_amount("", "1500250000", 6).unwrap(),
            BigDecimal::from_str("1500.25").unwrap()
        );
        assert!(parse_token_amount("", "12a", 6).is_err());
    }

    #[test]
    fn test_extract_json_parsed_transaction() {
        let encoded: EncodedTransactionWithStatusMeta = serde_json::from_value(json!({
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        { "pubkey": "Buyer", "writable": true, "signer": true, "source": "transaction" },
                        { "pubkey": "PoolVault", "writable": true, "signer": false, "source": "transaction" }
                    ],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": {
                "err": null,
                "status": { "Ok": null },
                "fee": 5000,
                "preBalances": [10, 0],
                "postBalances": [5, 0],
                "preTokenBalances": [{
                    "accountIndex": 1,
                    "mint": "Mint",
                    "owner": "Pool",
                    "uiTokenAmount": { "uiAmount": 1000000.0, "decimals": 6, "amount": "1000000000000", "uiAmountString": "1000000" }
                }],
                "postTokenBalances": [{
                    "accountIndex": 1,
                    "mint": "Mint",
                    "owner": "Pool",
                    "uiTokenAmount": { "uiAmount": 998000.0, "decimals": 6, "amount": "998000000000", "uiAmountString": "998000" }
                }]
            }
        }))
        .unwrap();

        let tx = extract_transaction("sig1", 42, Some(1_700_000_000), &encoded).unwrap();
        assert!(tx.success);
        assert_eq!(tx.slot, 42);
        assert_eq!(tx.account_keys.len(), 2);
        assert!(tx.account_keys[0].signer);
        assert_eq!(tx.pre_token_balances[0].owner.as_deref(), Some("Pool"));
        assert_eq!(tx.post_token_balances[0].amount, BigDecimal::from(998_000));
    }

    #[test]
    fn test_missing_meta_is_parse_error() {
        let encoded: EncodedTransactionWithStatusMeta = serde_json::from_value(json!({
            "transaction": {
                "signatures": ["sig2"],
                "message": {
                    "accountKeys": [],
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": null
        }))
        .unwrap();

        assert_eq!(
            extract_transaction("sig2", 1, None, &encoded),
            Err(ParseError::MissingMeta("sig2".into()))
        );
    }
}
