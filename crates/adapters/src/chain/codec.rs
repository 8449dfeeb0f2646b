// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decoding Ethereum JSON-RPC payloads

use super::{ChainError, Log, Receipt};
use orc_core::{BlockHash, Head, TxHash};
use serde_json::Value;

pub(crate) fn parse_quantity(v: &Value) -> Result<u64, ChainError> {
    let s = v.as_str().ok_or_else(|| ChainError::Decode(format!("expected hex quantity, got {v}")))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("bad quantity {s}: {e}")))
}

fn field<'a>(obj: &'a Value, name: &str) -> Result<&'a Value, ChainError> {
    obj.get(name).ok_or_else(|| ChainError::Decode(format!("missing field {name}")))
}

fn string_field(obj: &Value, name: &str) -> Result<String, ChainError> {
    field(obj, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ChainError::Decode(format!("field {name} is not a string")))
}

/// A block header object (`newHeads` notification or `eth_getBlockBy*`)
pub(crate) fn parse_head(v: &Value) -> Result<Head, ChainError> {
    Ok(Head {
        hash: BlockHash::new(string_field(v, "hash")?),
        parent_hash: BlockHash::new(string_field(v, "parentHash")?),
        number: parse_quantity(field(v, "number")?)?,
        timestamp: v.get("timestamp").map(parse_quantity).transpose()?.unwrap_or(0),
    })
}

pub(crate) fn parse_receipt(v: &Value) -> Result<Receipt, ChainError> {
    Ok(Receipt {
        tx_hash: TxHash::new(string_field(v, "transactionHash")?),
        block_hash: BlockHash::new(string_field(v, "blockHash")?),
        block_number: parse_quantity(field(v, "blockNumber")?)?,
        success: v.get("status").map(parse_quantity).transpose()?.map(|s| s == 1).unwrap_or(true),
    })
}

/// One entry of an `eth_getLogs` result
pub(crate) fn parse_log(v: &Value) -> Result<Log, ChainError> {
    let topics = field(v, "topics")?
        .as_array()
        .ok_or_else(|| ChainError::Decode("field topics is not an array".into()))?
        .iter()
        .map(|t| t.as_str().map(str::to_ascii_lowercase).ok_or_else(|| ChainError::Decode(format!("bad topic {t}"))))
        .collect::<Result<Vec<_>, _>>()?;
    let data = string_field(v, "data")?;
    let data = hex::decode(data.strip_prefix("0x").unwrap_or(&data))
        .map_err(|e| ChainError::Decode(format!("bad log data: {e}")))?;
    Ok(Log {
        address: string_field(v, "address")?.to_ascii_lowercase(),
        topics,
        data,
        block_hash: BlockHash::new(string_field(v, "blockHash")?),
        block_number: parse_quantity(field(v, "blockNumber")?)?,
        tx_hash: TxHash::new(string_field(v, "transactionHash")?),
        log_index: parse_quantity(field(v, "logIndex")?)?,
    })
}

/// Map a JSON-RPC error object onto [`ChainError`]
pub(crate) fn rpc_error(err: &Value) -> ChainError {
    let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = err.get("message").and_then(Value::as_str).unwrap_or("").to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("nonce too low") {
        ChainError::NonceTooLow
    } else if lower.contains("already known") {
        ChainError::AlreadyKnown
    } else {
        ChainError::Rpc { code, message }
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
