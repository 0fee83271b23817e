//! Transaction enrichment.
//!
//! The log subscription only delivers a signature plus raw log lines; the
//! rest of the transaction (account keys, instructions, execution status)
//! has to be fetched separately. Both legacy and versioned transactions
//! normalise into one `EnrichedTransaction` so every downstream component
//! sees a single representation regardless of ingress path.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::RpcError;
use crate::http::SolanaRpcClient;

/// One instruction, flattened: the program it targets, the indices of its
/// accounts in the flat key list, and its base58 data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: String,
    pub account_indices: Vec<u8>,
    pub data: String,
}

/// A transaction normalised out of either encoding.
#[derive(Debug, Clone)]
pub struct EnrichedTransaction {
    pub signature: String,
    pub slot: u64,
    /// Static keys followed by any address-table-loaded keys
    /// (writable, then readonly), matching on-chain index order.
    pub account_keys: Vec<String>,
    pub instructions: Vec<Instruction>,
    pub log_messages: Vec<String>,
    /// `meta.err` was non-null; no events from this transaction are
    /// trustworthy.
    pub failed: bool,
}

/// Fetches and normalises transactions by signature.
pub struct TransactionEnricher {
    rpc: SolanaRpcClient,
}

impl TransactionEnricher {
    pub fn new(rpc: SolanaRpcClient) -> Self {
        Self { rpc }
    }

    /// Fetch the confirmed transaction for `signature`.
    ///
    /// "Not found" is terminal for this signature: logged, `None`, never
    /// retried here. A transaction whose execution failed is still
    /// returned (with `failed` set) so the dispatcher can reject it in one
    /// place.
    pub async fn enrich(&self, signature: &str) -> Result<Option<EnrichedTransaction>, RpcError> {
        let Some(value) = self.rpc.get_transaction(signature).await? else {
            info!(signature, "transaction not found at confirmed commitment");
            return Ok(None);
        };
        let tx = normalize_transaction(signature, &value)?;
        if tx.failed {
            warn!(signature, "transaction failed on-chain");
        }
        Ok(Some(tx))
    }
}

/// Normalise a `getTransaction` response value.
pub fn normalize_transaction(
    signature: &str,
    value: &Value,
) -> Result<EnrichedTransaction, RpcError> {
    let slot = value["slot"].as_u64().unwrap_or(0);
    let meta = &value["meta"];
    let message = &value["transaction"]["message"];

    let mut account_keys = parse_account_keys(&message["accountKeys"])?;

    // Versioned transactions resolve extra keys through address lookup
    // tables; they index after the static keys, writable first.
    for group in ["writable", "readonly"] {
        if let Some(loaded) = meta["loadedAddresses"][group].as_array() {
            account_keys.extend(loaded.iter().filter_map(|k| k.as_str().map(String::from)));
        }
    }

    let instructions = message["instructions"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|ix| parse_instruction(ix, &account_keys))
                .collect()
        })
        .unwrap_or_default();

    let log_messages = meta["logMessages"]
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Ok(EnrichedTransaction {
        signature: signature.to_string(),
        slot,
        account_keys,
        instructions,
        log_messages,
        failed: !meta["err"].is_null(),
    })
}

/// Account keys arrive as plain strings (`"json"` encoding) or as
/// `{pubkey, ...}` objects (`"jsonParsed"`); accept both.
fn parse_account_keys(value: &Value) -> Result<Vec<String>, RpcError> {
    let list = value
        .as_array()
        .ok_or_else(|| RpcError::MalformedResponse("message.accountKeys missing".into()))?;
    Ok(list
        .iter()
        .filter_map(|entry| {
            entry
                .as_str()
                .or_else(|| entry["pubkey"].as_str())
                .map(String::from)
        })
        .collect())
}

fn parse_instruction(ix: &Value, account_keys: &[String]) -> Option<Instruction> {
    let program_index = ix["programIdIndex"].as_u64()? as usize;
    let program_id = account_keys.get(program_index)?.clone();
    let account_indices = ix["accounts"]
        .as_array()?
        .iter()
        .filter_map(|a| a.as_u64().map(|v| v as u8))
        .collect();
    Some(Instruction {
        program_id,
        account_indices,
        data: ix["data"].as_str().unwrap_or_default().to_string(),
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_fixture(err: Value) -> Value {
        json!({
            "slot": 5555,
            "transaction": {
                "message": {
                    "accountKeys": ["Key1", "Key2", "Prog1"],
                    "instructions": [
                        { "programIdIndex": 2, "accounts": [0, 1], "data": "3Bxs4h" }
                    ]
                }
            },
            "meta": {
                "err": err,
                "logMessages": ["Program Prog1 invoke [1]", "Program Prog1 success"]
            }
        })
    }

    #[test]
    fn normalizes_legacy_transaction() {
        let tx = normalize_transaction("sigL", &legacy_fixture(Value::Null)).unwrap();
        assert_eq!(tx.slot, 5555);
        assert_eq!(tx.account_keys, vec!["Key1", "Key2", "Prog1"]);
        assert_eq!(tx.instructions.len(), 1);
        assert_eq!(tx.instructions[0].program_id, "Prog1");
        assert_eq!(tx.instructions[0].account_indices, vec![0, 1]);
        assert_eq!(tx.log_messages.len(), 2);
        assert!(!tx.failed);
    }

    #[test]
    fn failed_transaction_flagged() {
        let tx = normalize_transaction(
            "sigF",
            &legacy_fixture(json!({"InstructionError": [0, "Custom"]})),
        )
        .unwrap();
        assert!(tx.failed);
    }

    #[test]
    fn versioned_transaction_appends_loaded_addresses() {
        let value = json!({
            "slot": 6000,
            "version": 0,
            "transaction": {
                "message": {
                    "accountKeys": ["Static1", "Prog1"],
                    "instructions": [
                        { "programIdIndex": 1, "accounts": [0, 2, 3], "data": "" }
                    ]
                }
            },
            "meta": {
                "err": null,
                "logMessages": [],
                "loadedAddresses": {
                    "writable": ["LoadedW"],
                    "readonly": ["LoadedR"]
                }
            }
        });
        let tx = normalize_transaction("sigV", &value).unwrap();
        assert_eq!(tx.account_keys, vec!["Static1", "Prog1", "LoadedW", "LoadedR"]);
        assert_eq!(tx.instructions[0].account_indices, vec![0, 2, 3]);
    }

    #[test]
    fn json_parsed_account_keys_accepted() {
        let value = json!({
            "slot": 1,
            "transaction": {
                "message": {
                    "accountKeys": [
                        { "pubkey": "ObjKey1", "signer": true },
                        { "pubkey": "ObjKey2", "signer": false }
                    ],
                    "instructions": []
                }
            },
            "meta": { "err": null, "logMessages": [] }
        });
        let tx = normalize_transaction("sigP", &value).unwrap();
        assert_eq!(tx.account_keys, vec!["ObjKey1", "ObjKey2"]);
    }

    #[test]
    fn missing_log_messages_tolerated() {
        let value = json!({
            "slot": 1,
            "transaction": { "message": { "accountKeys": ["A"], "instructions": [] } },
            "meta": { "err": null }
        });
        let tx = normalize_transaction("sigM", &value).unwrap();
        assert!(tx.log_messages.is_empty());
    }
}
