// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build a contract call carrying the pipeline's result

use super::{Task, TaskContext, TaskError, TaskOutput, TxRequest};
use async_trait::async_trait;

/// Encode the numeric input as a single `uint256` argument.
///
/// Params: `to` (contract address), `selector` (4-byte hex function
/// selector), optional `scale` applied before encoding. Any fraction left
/// after scaling is truncated toward zero.
pub struct SubmitTx;

#[async_trait]
impl Task for SubmitTx {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let to = ctx.str_param("to")?.to_ascii_lowercase();
        let selector = parse_selector(ctx.str_param("selector")?)?;
        let scale = ctx.number_param("scale")?.unwrap_or(1.0);
        let n = ctx
            .input
            .to_number()
            .ok_or_else(|| TaskError::validation(format!("cannot submit {} input", ctx.input.kind())))?;

        let mut data = selector.to_vec();
        data.extend_from_slice(&encode_uint256(n * scale)?);
        Ok(TaskOutput::Transaction(TxRequest { to, data }))
    }
}

fn parse_selector(raw: &str) -> Result<[u8; 4], TaskError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(digits).map_err(|e| TaskError::validation(format!("selector {raw}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| TaskError::validation(format!("selector {raw} must be 4 bytes")))
}

/// Relative distance from an integer still treated as that integer, so
/// `19.99 * 100` encodes as 1999 rather than 1998
const INTEGER_TOLERANCE: f64 = 1e-9;

/// Big-endian 32-byte word of `value` with its fraction truncated
pub(crate) fn encode_uint256(value: f64) -> Result<[u8; 32], TaskError> {
    if !value.is_finite() || value < 0.0 {
        return Err(TaskError::validation(format!("{value} is not a non-negative number")));
    }
    let nearest = value.round();
    let integer = if (value - nearest).abs() <= INTEGER_TOLERANCE * nearest.max(1.0) {
        nearest
    } else {
        value.trunc()
    };
    if integer >= u128::MAX as f64 {
        return Err(TaskError::validation(format!("{value} does not fit in 128 bits")));
    }
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&(integer as u128).to_be_bytes());
    Ok(word)
}
