//! Advisory XSD validation through an external engine.
//!
//! The authority's schema check runs in a separate service. Its answer is
//! useful but secondary: when the service is down, slow or talking nonsense
//! the dispatcher reports `valid: true` with a warning instead of failing, so
//! an outage there never blocks emission. Only a request without XML is an
//! error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ValidatorConfig, APP_VERSION, DEFAULT_TIPO, DPS_VERSION};
use crate::error::{DpsError, Result};
use crate::xml::present;

/// Longest engine body quoted back in error messages.
const MAX_BODY_IN_ERROR: usize = 200;

/// Request body sent to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct XsdRequest<'a> {
    pub xml: &'a str,
    pub tipo: &'a str,
    pub versao: &'a str,
}

/// One schema violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XsdIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Outcome of a validation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XsdResult {
    pub valid: bool,
    pub engine: String,
    pub errors: Vec<XsdIssue>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
}

impl XsdResult {
    /// Advisory result used when the engine could not give an answer.
    pub fn unavailable(engine: &str, reason: &str) -> Self {
        Self {
            valid: true,
            engine: engine.to_string(),
            errors: Vec::new(),
            warnings: vec![format!("engine unavailable: {reason}")],
            report: None,
        }
    }

    /// Whether this result came from the downgrade path.
    pub fn is_advisory_only(&self) -> bool {
        self.valid
            && self
                .warnings
                .iter()
                .any(|w| w.starts_with("engine unavailable"))
    }
}

/// Trait for validation engines, enabling mocking in tests.
#[async_trait]
pub trait XsdEngine: Send + Sync {
    /// Name reported in results when the engine does not name itself.
    fn name(&self) -> &str;

    /// Run one validation. Errors mean "no answer", never "invalid".
    async fn validate(&self, request: &XsdRequest<'_>) -> Result<XsdResult>;
}

/// Response body of the engine.
///
/// Engines disagree on `ok` versus `valid`; both are accepted.
#[derive(Debug, Deserialize)]
struct EngineResponse {
    ok: Option<bool>,
    valid: Option<bool>,
    #[serde(default)]
    errors: Vec<EngineIssue>,
    #[serde(default)]
    warnings: Vec<String>,
    report: Option<Value>,
    engine: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EngineIssue {
    Text(String),
    Detailed {
        field: Option<String>,
        message: String,
        value: Option<Value>,
    },
}

impl From<EngineIssue> for XsdIssue {
    fn from(issue: EngineIssue) -> Self {
        match issue {
            EngineIssue::Text(message) => Self {
                message,
                ..Default::default()
            },
            EngineIssue::Detailed {
                field,
                message,
                value,
            } => Self {
                field,
                message,
                value: value.and_then(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                }),
            },
        }
    }
}

impl EngineResponse {
    /// Whether the body is a judgement on the document rather than an
    /// error from whatever answered at the endpoint.
    ///
    /// Success and 400/422 answers count as judgements. Other 4xx answers
    /// (wrong path, auth) count only when they carry `valid` or `ok`.
    fn is_verdict(&self, status: u16) -> bool {
        self.valid.is_some()
            || self.ok.is_some()
            || !(400..500).contains(&status)
            || matches!(status, 400 | 422)
    }

    fn into_result(self, default_engine: &str) -> XsdResult {
        let errors: Vec<XsdIssue> = self.errors.into_iter().map(XsdIssue::from).collect();
        XsdResult {
            valid: self.valid.or(self.ok).unwrap_or(errors.is_empty()),
            engine: self.engine.unwrap_or_else(|| default_engine.to_string()),
            errors,
            warnings: self.warnings,
            report: self.report,
        }
    }
}

/// Validation engine reached over HTTP.
pub struct HttpXsdEngine {
    http: reqwest::Client,
    endpoint: String,
    name: String,
}

impl HttpXsdEngine {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(APP_VERSION)
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            name: config.engine_name.clone(),
        })
    }
}

#[async_trait]
impl XsdEngine for HttpXsdEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, request: &XsdRequest<'_>) -> Result<XsdResult> {
        let resp = self.http.post(&self.endpoint).json(request).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if status >= 500 {
            return Err(DpsError::EngineResponse {
                status,
                message: truncate(&body),
            });
        }

        let parsed: EngineResponse =
            serde_json::from_str(&body).map_err(|e| DpsError::EngineResponse {
                status,
                message: format!("{e}: {}", truncate(&body)),
            })?;

        if !parsed.is_verdict(status) {
            return Err(DpsError::EngineResponse {
                status,
                message: truncate(&body),
            });
        }

        debug!(status, "validation engine answered");
        Ok(parsed.into_result(&self.name))
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Failure-tolerant front for an [`XsdEngine`].
pub struct XsdDispatcher<E = HttpXsdEngine> {
    engine: E,
    timeout: Duration,
}

impl XsdDispatcher<HttpXsdEngine> {
    /// Dispatcher for the HTTP engine described by `config`.
    pub fn from_config(config: &ValidatorConfig) -> Result<Self> {
        Ok(Self::new(HttpXsdEngine::new(config)?, config.timeout()))
    }
}

impl<E: XsdEngine> XsdDispatcher<E> {
    /// `timeout` bounds each request regardless of the engine's own limits.
    pub fn new(engine: E, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Validate `xml` against the schema for `tipo`/`versao`.
    ///
    /// Defaults to `DPS` / `1.00`. Returns `Err` only for a blank document.
    pub async fn validate_against_xsd(
        &self,
        xml: &str,
        tipo: Option<&str>,
        versao: Option<&str>,
    ) -> Result<XsdResult> {
        self.validate_with_cancel(xml, tipo, versao, &CancellationToken::new())
            .await
    }

    /// Like [`validate_against_xsd`](Self::validate_against_xsd), aborting the
    /// request when `cancel` fires.
    #[tracing::instrument(skip(self, xml, cancel), fields(len = xml.len()))]
    pub async fn validate_with_cancel(
        &self,
        xml: &str,
        tipo: Option<&str>,
        versao: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<XsdResult> {
        if xml.trim().is_empty() {
            return Err(DpsError::InvalidInput("xml is required".into()));
        }

        let request = XsdRequest {
            xml,
            tipo: present(tipo).unwrap_or(DEFAULT_TIPO),
            versao: present(versao).unwrap_or(DPS_VERSION),
        };

        let reason = tokio::select! {
            biased;

            () = cancel.cancelled() => "validation cancelled".to_string(),
            () = tokio::time::sleep(self.timeout) => {
                format!("no answer within {:?}", self.timeout)
            }
            outcome = self.engine.validate(&request) => match outcome {
                Ok(result) => {
                    debug!(valid = result.valid, errors = result.errors.len(), "schema check finished");
                    return Ok(result);
                }
                Err(e) => e.to_string(),
            },
        };

        warn!(engine = self.engine.name(), %reason, "schema check downgraded to advisory");
        Ok(XsdResult::unavailable(self.engine.name(), &reason))
    }
}

/// Test utilities for the validator.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Mock engine. Returns pre-configured outcomes in order and records
    /// the requests it saw.
    pub struct MockXsdEngine {
        outcomes: Mutex<Vec<Result<XsdResult>>>,
        delay: Duration,
        pub seen: Mutex<Vec<(String, String, String)>>,
    }

    impl MockXsdEngine {
        pub fn new(outcomes: Vec<Result<XsdResult>>) -> Self {
            // Reverse so we can pop from the end
            let mut outcomes = outcomes;
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn valid() -> Self {
            Self::new(vec![Ok(XsdResult {
                valid: true,
                engine: "mock".into(),
                errors: vec![],
                warnings: vec![],
                report: None,
            })])
        }

        pub fn failing(message: &str) -> Self {
            Self::new(vec![Err(DpsError::EngineResponse {
                status: 503,
                message: message.to_string(),
            })])
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl XsdEngine for MockXsdEngine {
        fn name(&self) -> &str {
            "mock"
        }

        async fn validate(&self, request: &XsdRequest<'_>) -> Result<XsdResult> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((
                    request.xml.to_string(),
                    request.tipo.to_string(),
                    request.versao.to_string(),
                ));
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut outcomes = self
                .outcomes
                .lock()
                .map_err(|e| DpsError::Config(format!("mock lock poisoned: {e}")))?;
            outcomes
                .pop()
                .unwrap_or_else(|| Err(DpsError::Config("mock exhausted".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockXsdEngine;
    use super::*;
    use pretty_assertions::assert_eq;

    fn dispatcher(engine: MockXsdEngine) -> XsdDispatcher<MockXsdEngine> {
        XsdDispatcher::new(engine, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_blank_xml_is_input_error() {
        let d = dispatcher(MockXsdEngine::valid());
        let err = d.validate_against_xsd("  ", None, None).await.unwrap_err();
        assert!(err.is_input_error());
        assert!(d.engine().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_for_tipo_and_versao() {
        let d = dispatcher(MockXsdEngine::valid());
        let result = d.validate_against_xsd("<DPS/>", None, Some(" ")).await.unwrap();
        assert!(result.valid);
        let seen = d.engine().seen.lock().unwrap();
        assert_eq!(
            seen[0],
            ("<DPS/>".to_string(), "DPS".to_string(), "1.00".to_string())
        );
    }

    #[tokio::test]
    async fn test_engine_failure_downgrades() {
        let d = dispatcher(MockXsdEngine::failing("maintenance"));
        let result = d.validate_against_xsd("<DPS/>", Some("DPS"), None).await.unwrap();
        assert!(result.valid);
        assert!(result.is_advisory_only());
        assert_eq!(result.engine, "mock");
        assert!(result.warnings[0].starts_with("engine unavailable:"));
        assert!(result.warnings[0].contains("maintenance"));
    }

    #[tokio::test]
    async fn test_invalid_report_is_passed_through() {
        let report = XsdResult {
            valid: false,
            engine: "xerces".into(),
            errors: vec![XsdIssue {
                field: Some("cTribNac".into()),
                message: "pattern mismatch".into(),
                value: Some("1".into()),
            }],
            warnings: vec![],
            report: None,
        };
        let d = dispatcher(MockXsdEngine::new(vec![Ok(report.clone())]));
        let result = d.validate_against_xsd("<DPS/>", None, None).await.unwrap();
        assert_eq!(result, report);
        assert!(!result.is_advisory_only());
    }

    #[tokio::test]
    async fn test_timeout_downgrades() {
        let engine = MockXsdEngine::valid().with_delay(Duration::from_secs(30));
        let d = XsdDispatcher::new(engine, Duration::from_millis(50));
        let result = d.validate_against_xsd("<DPS/>", None, None).await.unwrap();
        assert!(result.is_advisory_only());
    }

    #[tokio::test]
    async fn test_cancellation_downgrades() {
        let engine = MockXsdEngine::valid().with_delay(Duration::from_secs(30));
        let d = dispatcher(engine);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = d
            .validate_with_cancel("<DPS/>", None, None, &cancel)
            .await
            .unwrap();
        assert_eq!(result.warnings, vec!["engine unavailable: validation cancelled"]);
    }

    #[test]
    fn test_engine_response_with_ok_and_mixed_errors() {
        let body = r#"{
            "ok": false,
            "errors": [
                "cvc-complex-type.2.4.a: Invalid content",
                {"field": "CEP", "message": "too long", "value": 123456789}
            ],
            "warnings": ["deprecated layout"]
        }"#;
        let parsed: EngineResponse = serde_json::from_str(body).unwrap();
        let result = parsed.into_result("xsd-service");
        assert!(!result.valid);
        assert_eq!(result.engine, "xsd-service");
        assert_eq!(result.errors[0].message, "cvc-complex-type.2.4.a: Invalid content");
        assert_eq!(result.errors[1].value.as_deref(), Some("123456789"));
        assert_eq!(result.warnings, vec!["deprecated layout"]);
    }

    #[test]
    fn test_verdict_statuses() {
        let bare: EngineResponse = serde_json::from_str(r#"{"message": "Not Found"}"#).unwrap();
        assert!(bare.is_verdict(200));
        assert!(bare.is_verdict(422));
        assert!(!bare.is_verdict(404));
        assert!(!bare.is_verdict(401));

        let flagged: EngineResponse = serde_json::from_str(r#"{"valid": false}"#).unwrap();
        assert!(flagged.is_verdict(409));
    }

    #[test]
    fn test_engine_response_validity_from_errors() {
        let parsed: EngineResponse = serde_json::from_str(r#"{"errors": []}"#).unwrap();
        assert!(parsed.into_result("x").valid);
    }

    #[test]
    fn test_truncate() {
        let long = "é".repeat(300);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_BODY_IN_ERROR + 1);
        assert_eq!(truncate("short"), "short");
    }
}
