// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure value transforms

use super::{Task, TaskContext, TaskError, TaskOutput};
use async_trait::async_trait;
use orc_core::Value;

/// Extract a value by dot path (`path = "data.prices.0"`).
///
/// Text input is parsed as JSON first, so the raw body of an HTTP response
/// can be fed straight in. With `lax = true` a missing path yields null.
pub struct JsonParse;

#[async_trait]
impl Task for JsonParse {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let path = ctx.str_param("path")?;
        let input = match &ctx.input {
            Value::Text(text) => serde_json::from_str::<serde_json::Value>(text)
                .map(Value::from)
                .map_err(|e| TaskError::validation(format!("input is not JSON: {e}")))?,
            other => other.clone(),
        };
        match input.path(path) {
            Some(found) => Ok(TaskOutput::Value(found.clone())),
            None if ctx.bool_param("lax") => Ok(TaskOutput::Value(Value::Null)),
            None => Err(TaskError::validation(format!("path {path:?} not found in {} input", input.kind()))),
        }
    }
}

/// Multiply a numeric input by `times`
pub struct Multiply;

#[async_trait]
impl Task for Multiply {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let times = ctx.number_param("times")?.ok_or_else(|| TaskError::validation("missing param times"))?;
        let n = ctx
            .input
            .to_number()
            .ok_or_else(|| TaskError::validation(format!("cannot multiply {} input", ctx.input.kind())))?;
        let product = n * times;
        if !product.is_finite() {
            return Err(TaskError::validation(format!("{n} * {times} overflows")));
        }
        Ok(TaskOutput::Value(Value::Number(product)))
    }
}

/// Pass the input through unchanged
pub struct Noop;

#[async_trait]
impl Task for Noop {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        Ok(TaskOutput::Value(ctx.input))
    }
}
