//! Shared JSON-over-HTTP client for outbound adapters

use reqwest::{Client, ClientBuilder, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::error::GatewayError;

/// Thin wrapper around `reqwest::Client` bound to one base URL
#[derive(Clone)]
pub struct JsonClient {
    http: Client,
    base_url: String,
    service: &'static str,
}

impl JsonClient {
    /// Build a client for `service` rooted at `base_url`
    pub fn new(service: &'static str, base_url: &str, timeout_ms: u64) -> Result<Self, GatewayError> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .connect_timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    #[instrument(skip(self), fields(service = self.service))]
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, GatewayError> {
        let response = self.send(Method::GET, path, None::<&()>).await?;
        self.decode(response).await
    }

    #[instrument(skip(self, body), fields(service = self.service))]
    pub async fn post<T, R>(&self, path: &str, body: &T) -> Result<R, GatewayError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(body)).await?;
        self.decode(response).await
    }

    /// POST where the response body is irrelevant
    pub async fn post_unit<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), GatewayError> {
        self.send(Method::POST, path, Some(body)).await.map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        self.send(Method::DELETE, path, None::<&()>).await.map(|_| ())
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<Response, GatewayError> {
        let url = self.url(path);
        debug!("{} {} {}", self.service, method, url);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!("{} request to {} failed: {}", self.service, url, e);
            GatewayError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::HttpStatus {
                service: self.service,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn decode<R: DeserializeOwned>(&self, response: Response) -> Result<R, GatewayError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::decode(self.service, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = JsonClient::new("lock vendor", "http://vendor.local/api/", 1000).unwrap();
        assert_eq!(client.url("/locks/a/passwords"), "http://vendor.local/api/locks/a/passwords");
        assert_eq!(client.url("commands"), "http://vendor.local/api/commands");
    }
}
