//! Monobank personal API, jar statements
//!
//! `GET /personal/statement/{account}/{from}/{to}` with the personal token in
//! `X-Token`. Both bounds are unix seconds and `to` is inclusive, answers are
//! newest first and capped at 500 items.

use reqwest::{blocking::Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::lib::{
    fetch::{SourceError, StatementSource},
    record::TransactionRecord,
    window::TimeWindow,
};
use crate::load::config::MonobankConfig;

pub struct Monobank {
    client: Client,
    base_url: String,
    token: String,
    jar_id: String,
}

impl Monobank {
    pub fn new(config: &MonobankConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            jar_id: config.jar_id.clone(),
        })
    }

    /// Query URL for the half-open `window`
    fn url(&self, window: &TimeWindow) -> String {
        format!(
            "{}/personal/statement/{}/{}/{}",
            self.base_url,
            self.jar_id,
            window.start().timestamp(),
            window.end().timestamp() - 1,
        )
    }
}

impl StatementSource for Monobank {
    fn statement(&mut self, window: &TimeWindow) -> Result<Vec<TransactionRecord>, SourceError> {
        let url = self.url(window);
        debug!(window = %window, "querying statement");
        let response = self
            .client
            .get(&url)
            .header("X-Token", &self.token)
            .send()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify(status, body));
        }
        let body = response
            .text()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        decode(&body)
    }
}

/// Failure reported by a non-success answer
fn classify(status: StatusCode, body: String) -> SourceError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        SourceError::RateLimited
    } else {
        SourceError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

/// Records of a successful answer
fn decode(body: &str) -> Result<Vec<TransactionRecord>, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! status {
        ( $code:expr ) => {
            classify(StatusCode::from_u16($code).unwrap(), "{}".to_string())
        };
    }

    #[test]
    fn answers_are_classified() {
        assert_eq!(status!(429), SourceError::RateLimited);
        assert!(status!(429).is_transient());

        let unavailable = status!(500);
        assert!(matches!(unavailable, SourceError::Status { status: 500, .. }));
        assert!(unavailable.is_transient());
        assert!(status!(503).is_transient());

        for code in [400, 403, 404] {
            let err = status!(code);
            assert!(!err.is_transient(), "{}", code);
            assert!(err.is_client_error(), "{}", code);
        }
        assert_eq!(
            status!(403),
            SourceError::Status {
                status: 403,
                body: "{}".to_string()
            }
        );
    }

    #[test]
    fn bodies_are_decoded() {
        let records = decode(
            r#"[{"id": "a1", "time": 1669900000, "description": "From: Ivan", "amount": 50000, "comment": "ivan@mail.com"}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, 1669900000);
        assert!(decode("[]").unwrap().is_empty());
        assert!(matches!(decode("<html>busy</html>"), Err(SourceError::Decode(_))));
        assert!(matches!(decode(r#"{"errorDescription": "x"}"#), Err(SourceError::Decode(_))));
    }

    #[test]
    fn url_has_inclusive_end() {
        let config = MonobankConfig {
            jar_id: "jarABC".to_string(),
            base_url: "https://api.monobank.ua/".to_string(),
            ..MonobankConfig::default()
        };
        let mono = Monobank::new(&config).unwrap();
        let window = TimeWindow::from_unix(1669845600, 1669888800).unwrap();
        assert_eq!(
            mono.url(&window),
            "https://api.monobank.ua/personal/statement/jarABC/1669845600/1669888799"
        );
    }
}
