use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};

use crate::config::ClientConfig;
use crate::error::{RemoteZipError, Result};

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// The one HTTP capability the range reader needs: a GET with extra headers.
///
/// Implementations only need to buffer the body of `206 Partial Content`
/// responses. Any other response may come back with an empty body, so a
/// server that ignores `Range` never causes a full download.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse>;
}

/// [`HttpTransport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client from the timeouts and user agent in `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RemoteZipError::network("<client builder>", e))?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client, e.g. one shared with other API code.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<TransportResponse> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| RemoteZipError::network(url, e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        if status != StatusCode::PARTIAL_CONTENT {
            // Dropping the response closes the connection without reading the body.
            return Ok(TransportResponse {
                status,
                headers,
                body: Vec::new(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| RemoteZipError::network(url, e))?;

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
