use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use surge_instruments::{report_operation, Checks, OperationRecord, Reporter};
use url::Url;

use crate::api::{
    CategoryValidationRequest, CategoryValidationResponse, ExpressionEvaluationRequest,
    ExpressionEvaluationResponse, RuleValidationRequest, RuleValidationResponse,
};
use crate::error::{RequestError, RequestResult};

pub const EVALUATE_EXPRESSION: &str = "evaluate_expression";
pub const VALIDATE_RULE: &str = "validate_rule";
pub const VALIDATE_BY_CATEGORY: &str = "validate_by_category";

/// Longest response body kept in a [RequestError::Status].
const MAX_ERROR_BODY: usize = 256;

/// What checks get to look at once a response has been read.
#[derive(Debug, Clone)]
pub struct ResponseView {
    status: u16,
    elapsed: Duration,
    body: Option<Value>,
}

impl ResponseView {
    pub fn new(status: u16, elapsed: Duration, body: Option<Value>) -> Self {
        Self {
            status,
            elapsed,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The body, if it was valid JSON.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// True if the body is a JSON object with the given key, even when its value is `null`.
    pub fn has_field(&self, name: &str) -> bool {
        self.body
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|object| object.contains_key(name))
    }
}

/// A client for the rule engine REST API that reports every request it makes.
///
/// Cloning is cheap and clones share one connection pool.
#[derive(Clone)]
pub struct RuleEngineClientInstrumented {
    inner: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    reporter: Arc<Reporter>,
}

impl RuleEngineClientInstrumented {
    pub fn connect(base_url: &str, timeout: Duration, reporter: Arc<Reporter>) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Base URL cannot have paths joined to it: {base_url}");
        }
        // Endpoints are joined as relative paths so that any path prefix on the base is kept.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            base_url,
            timeout,
            reporter,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn evaluate_expression(
        &self,
        request: &ExpressionEvaluationRequest,
        checks: &Checks<ResponseView>,
    ) -> RequestResult<ExpressionEvaluationResponse> {
        self.post(EVALUATE_EXPRESSION, "api/expressions/evaluate", request, checks)
            .await
    }

    pub async fn validate_rule(
        &self,
        request: &RuleValidationRequest,
        checks: &Checks<ResponseView>,
    ) -> RequestResult<RuleValidationResponse> {
        self.post(VALIDATE_RULE, "api/rules/validate", request, checks)
            .await
    }

    pub async fn validate_by_category(
        &self,
        request: &CategoryValidationRequest,
        checks: &Checks<ResponseView>,
    ) -> RequestResult<CategoryValidationResponse> {
        self.post(
            VALIDATE_BY_CATEGORY,
            "api/rule-sets/validate-by-category",
            request,
            checks,
        )
        .await
    }

    async fn post<Req, Resp>(
        &self,
        operation_id: &str,
        path: &str,
        request: &Req,
        checks: &Checks<ResponseView>,
    ) -> RequestResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RequestError::Decode {
                url: self.base_url.to_string(),
                reason: format!("Cannot build endpoint URL for {path}: {e}"),
            })?;

        let mut record = OperationRecord::new(operation_id);
        let sent = self.send(&url, request).await;
        // The timer covers reading the body, not just the headers.
        let elapsed = record.stop();

        let result = match sent {
            Ok((status, body)) => {
                record.set_status(status);
                let json = serde_json::from_slice::<Value>(&body).ok();
                let view = ResponseView::new(status, elapsed, json);
                record = record.with_checks(checks.evaluate(&view));
                decode(&url, status, &body)
            }
            Err(e) => {
                record = record.with_checks(checks.fail_all());
                Err(e)
            }
        };

        report_operation(&self.reporter, record, &result);

        result
    }

    async fn send<Req: Serialize>(&self, url: &Url, request: &Req) -> RequestResult<(u16, Vec<u8>)> {
        let response = self
            .inner
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_err(url, e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_err(url, e))?;

        Ok((status, body.to_vec()))
    }

    fn transport_err(&self, url: &Url, source: reqwest::Error) -> RequestError {
        if source.is_timeout() {
            RequestError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            RequestError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

fn decode<Resp: DeserializeOwned>(url: &Url, status: u16, body: &[u8]) -> RequestResult<Resp> {
    if !(200..300).contains(&status) {
        let body = String::from_utf8_lossy(body);
        return Err(RequestError::Status {
            url: url.to_string(),
            status,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }

    serde_json::from_slice(body).map_err(|e| RequestError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

impl Debug for RuleEngineClientInstrumented {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngineClientInstrumented")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}
