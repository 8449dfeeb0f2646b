// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fetch a value over HTTP

use super::{Task, TaskContext, TaskError, TaskOutput};
use async_trait::async_trait;
use orc_core::Value;
use reqwest::Method;

/// `http_fetch` task.
///
/// Params: `url`, optional `method` (`GET` or `POST`), optional `body` (POST
/// payload; defaults to the task input) and `headers` (string map). JSON
/// responses are decoded into a [`Value`]; anything else is returned as text.
///
/// Connection failures, 429 and 5xx responses are transient. Bad params and 4xx
/// responses are not retried.
#[derive(Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task for HttpFetch {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutput, TaskError> {
        let url = ctx.str_param("url")?;
        let method = match ctx.param("method").and_then(serde_json::Value::as_str) {
            None => Method::GET,
            Some(m) if m.eq_ignore_ascii_case("get") => Method::GET,
            Some(m) if m.eq_ignore_ascii_case("post") => Method::POST,
            Some(other) => return Err(TaskError::validation(format!("unsupported method {other}"))),
        };

        let mut request = self.client.request(method.clone(), url);
        if let Some(headers) = ctx.param("headers") {
            let headers = headers
                .as_object()
                .ok_or_else(|| TaskError::validation("param headers must be a map"))?;
            for (name, value) in headers {
                let value = value
                    .as_str()
                    .ok_or_else(|| TaskError::validation(format!("header {name} must be a string")))?;
                request = request.header(name.as_str(), value);
            }
        }
        if method == Method::POST {
            let body = ctx.param("body").cloned().unwrap_or_else(|| ctx.input.to_json());
            request = request.json(&body);
        }

        tracing::debug!(run_id = %ctx.run_id, task = %ctx.task_id, %url, %method, "http fetch");
        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                TaskError::validation(format!("bad request to {url}: {e}"))
            } else {
                TaskError::transient(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let text = response.text().await.map_err(|e| TaskError::transient(format!("{url}: {e}")))?;

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TaskError::transient(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(TaskError::validation(format!("{url} returned {status}")));
        }

        let value = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Value::from(json),
            Err(e) if is_json => {
                return Err(TaskError::validation(format!("{url} sent malformed JSON: {e}")));
            }
            Err(_) => Value::Text(text),
        };
        Ok(TaskOutput::Value(value))
    }
}
