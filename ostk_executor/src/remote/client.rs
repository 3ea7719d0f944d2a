use super::{
    EnvToken, QueryCanceller, RemoteCancelError, RemoteCancelOutcome, TokenProvider,
};
use crate::config::RemoteCancelConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const TRINO_USER_HEADER: &str = "X-Trino-User";

/// Cancels queries on a Trino coordinator with `DELETE <endpoint>/<query id>`.
#[derive(Clone)]
pub struct TrinoCancelClient {
    http: Client,
    endpoint: Url,
    user: String,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
}

impl TrinoCancelClient {
    pub fn new(
        config: &RemoteCancelConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, RemoteCancelError> {
        let endpoint = Url::parse(&config.endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(RemoteCancelError::InvalidEndpoint(config.endpoint.clone()));
        }
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            endpoint,
            user: config.user.clone(),
            tokens,
            timeout: config.timeout(),
        })
    }

    /// Client reading its token from the environment variable named in `config`.
    pub fn from_config(config: &RemoteCancelConfig) -> Result<Self, RemoteCancelError> {
        Self::new(config, Arc::new(EnvToken::new(config.token_env.clone())))
    }

    /// URL that cancels `query_id`. The id is percent-encoded as one path segment.
    pub fn query_url(&self, query_id: &str) -> Result<Url, RemoteCancelError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteCancelError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(query_id);
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send_cancel(&self, query_id: &str) -> Result<u16, RemoteCancelError> {
        let token = self.tokens.token().await?;
        let url = self.query_url(query_id)?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(token)
            .header(TRINO_USER_HEADER, &self.user)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl QueryCanceller for TrinoCancelClient {
    async fn cancel_query(&self, query_id: &str) -> RemoteCancelOutcome {
        info!("Cancelling remote query {}", query_id);
        let outcome = match self.send_cancel(query_id).await {
            Ok(status) => RemoteCancelOutcome::from_status(status),
            Err(err) => RemoteCancelOutcome::from(err),
        };
        if outcome.is_success() {
            info!("Remote query {} cancelled: {}", query_id, outcome);
        } else {
            warn!("Remote query {} not cancelled: {}", query_id, outcome);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::StaticToken;

    fn client(endpoint: &str) -> TrinoCancelClient {
        let config = RemoteCancelConfig {
            endpoint: endpoint.to_string(),
            ..RemoteCancelConfig::default()
        };
        TrinoCancelClient::new(&config, Arc::new(StaticToken::new("t"))).unwrap()
    }

    #[test]
    fn query_url_appends_one_segment() {
        let with_slash = client("https://trino.example.org/v1/query/");
        let without_slash = client("https://trino.example.org/v1/query");
        let expected = "https://trino.example.org/v1/query/20240101_120000_00042_abcde";
        assert_eq!(
            with_slash.query_url("20240101_120000_00042_abcde").unwrap().as_str(),
            expected
        );
        assert_eq!(
            without_slash.query_url("20240101_120000_00042_abcde").unwrap().as_str(),
            expected
        );
    }

    #[test]
    fn query_url_escapes_separators() {
        let url = client("https://trino.example.org/v1/query/")
            .query_url("../admin")
            .unwrap();
        assert!(url.path().starts_with("/v1/query/"));
        assert!(!url.path().contains("/admin"));
    }

    #[test]
    fn rejects_non_base_endpoint() {
        let config = RemoteCancelConfig {
            endpoint: "mailto:ops@example.org".into(),
            ..RemoteCancelConfig::default()
        };
        assert!(matches!(
            TrinoCancelClient::new(&config, Arc::new(StaticToken::new("t"))),
            Err(RemoteCancelError::InvalidEndpoint(_))
        ));
    }
}
