#![cfg(feature = "http-relay")]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::TransportError;
use crate::relay::{RelayEndpoint, RelayResponse, RelayTransport};

/// Relay client over HTTPS.
#[derive(Clone)]
pub struct HttpRelayClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelayClient {
    /// `timeout` bounds a single request, not a whole poll loop.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: RelayEndpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    async fn into_response(resp: reqwest::Response) -> Result<RelayResponse, TransportError> {
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(RelayResponse::new(status, body))
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn get(&self, endpoint: RelayEndpoint, id: &str) -> Result<RelayResponse, TransportError> {
        let url = format!("{}/{}", self.endpoint_url(endpoint), id);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Self::into_response(resp).await
    }

    async fn post(
        &self,
        endpoint: RelayEndpoint,
        body: Bytes,
    ) -> Result<RelayResponse, TransportError> {
        let resp = self
            .client
            .post(self.endpoint_url(endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Self::into_response(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = HttpRelayClient::new("https://relay.example/sync/", None).unwrap();
        assert_eq!(client.base_url(), "https://relay.example/sync");
        assert_eq!(
            client.endpoint_url(RelayEndpoint::Connect),
            "https://relay.example/sync/connect"
        );
    }
}
