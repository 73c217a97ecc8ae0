//! HTTP client for alicd

use alic_api::{
    BadLicense, CheckLicenseRequest, ErrorDetail, GoodLicense, HealthStatus, SessionIdRequest,
    Successful, CHECK_LICENSE_PATH, END_SESSION_PATH, HEALTH_PATH, KEEPALIVE_PATH,
};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::RetryPolicy;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed after {attempts} attempts: {last_error}")]
    RequestFailed { attempts: u32, last_error: String },

    #[error("Unexpected response {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Answer to a license check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResponse {
    Granted(GoodLicense),
    Denied(BadLicense),
}

/// Answer to a keep-alive or end-session call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResponse {
    Ok,
    /// The session expired, ended, or never existed
    NotFound,
}

/// Why one attempt did not produce a result
enum AttemptError {
    Retryable(String),
    Fatal(ClientError),
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, AttemptError> {
    serde_json::from_slice(body)
        .map_err(|e| AttemptError::Retryable(format!("undecodable response body: {}", e)))
}

fn unexpected(status: StatusCode, body: &[u8]) -> AttemptError {
    AttemptError::Fatal(ClientError::UnexpectedResponse {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

fn decode_session(status: StatusCode, body: &[u8]) -> Result<SessionResponse, AttemptError> {
    match status {
        StatusCode::OK => decode::<Successful>(body).map(|_| SessionResponse::Ok),
        StatusCode::NOT_FOUND => decode::<ErrorDetail>(body).map(|_| SessionResponse::NotFound),
        _ => Err(unexpected(status, body)),
    }
}

/// Client for the alicd HTTP API
#[derive(Debug, Clone)]
pub struct LicenseClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl LicenseClient {
    /// Per-request timeout unless overridden
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(base_url: &str) -> ClientResult<Self> {
        Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> ClientResult<Self> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn check_license(
        &self,
        license_key: &str,
        fingerprint: &str,
    ) -> ClientResult<CheckResponse> {
        let body = CheckLicenseRequest::new(license_key, fingerprint);
        self.execute(Method::POST, CHECK_LICENSE_PATH, Some(&body), |status, bytes| {
            match status {
                StatusCode::OK => decode::<GoodLicense>(bytes).map(CheckResponse::Granted),
                StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                    decode::<BadLicense>(bytes).map(CheckResponse::Denied)
                }
                _ => Err(unexpected(status, bytes)),
            }
        })
        .await
    }

    pub async fn keep_alive(&self, session_id: &str) -> ClientResult<SessionResponse> {
        let body = SessionIdRequest::new(session_id);
        self.execute(Method::POST, KEEPALIVE_PATH, Some(&body), decode_session)
            .await
    }

    pub async fn end_session(&self, session_id: &str) -> ClientResult<SessionResponse> {
        let body = SessionIdRequest::new(session_id);
        self.execute(Method::POST, END_SESSION_PATH, Some(&body), decode_session)
            .await
    }

    /// Server health; a not-ready server still answers with its status
    pub async fn health(&self) -> ClientResult<HealthStatus> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status == StatusCode::OK || status == StatusCode::SERVICE_UNAVAILABLE {
            serde_json::from_slice(&bytes).map_err(|e| ClientError::UnexpectedResponse {
                status: status.as_u16(),
                body: e.to_string(),
            })
        } else {
            Err(ClientError::UnexpectedResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
    }

    async fn execute<B, T, F>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        decode_response: F,
    ) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        F: Fn(StatusCode, &[u8]) -> Result<T, AttemptError>,
    {
        let url = format!("{}{}", self.base_url, path);
        let attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                let backoff = self.retry.backoff_for(attempt - 1);
                debug!(
                    path,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying request"
                );
                tokio::time::sleep(backoff).await;
            }

            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(path, attempt, error = %e, "Request failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path, attempt, error = %e, "Reading response failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            if status.is_server_error() {
                warn!(path, attempt, status = status.as_u16(), "Server error");
                last_error = format!("server returned {}", status);
                continue;
            }

            match decode_response(status, &bytes) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Retryable(reason)) => {
                    warn!(path, attempt, reason = %reason, "Bad response");
                    last_error = reason;
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }

        Err(ClientError::RequestFailed {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alic_api::DenialReason;

    #[test]
    fn base_url_is_normalized() {
        let client = LicenseClient::new("http://127.0.0.1:8000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(matches!(
            LicenseClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn session_statuses() {
        assert!(matches!(
            decode_session(StatusCode::OK, br#"{"success": true}"#),
            Ok(SessionResponse::Ok)
        ));
        assert!(matches!(
            decode_session(StatusCode::NOT_FOUND, br#"{"detail": "Session not found"}"#),
            Ok(SessionResponse::NotFound)
        ));
        assert!(matches!(
            decode_session(StatusCode::OK, b"<html>"),
            Err(AttemptError::Retryable(_))
        ));
        assert!(matches!(
            decode_session(StatusCode::UNAUTHORIZED, b"{}"),
            Err(AttemptError::Fatal(ClientError::UnexpectedResponse { status: 401, .. }))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_exhausts_retries() {
        // Port 9 (discard) is closed on test machines
        let client = LicenseClient::new("http://127.0.0.1:9")
            .unwrap()
            .with_retry(RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            });

        match client.keep_alive("1:0:abc").await {
            Err(ClientError::RequestFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RequestFailed, got {:?}", other),
        }
    }

    #[test]
    fn denial_body_decodes() {
        let body = serde_json::to_vec(&BadLicense::new(DenialReason::LicenseExpired)).unwrap();
        let decoded: BadLicense = match decode(&body) {
            Ok(v) => v,
            Err(_) => panic!("denial body should decode"),
        };
        assert_eq!(decoded.error, DenialReason::LicenseExpired);
    }
}
