//! Network access for the interception layer.
//!
//! `Network` is the seam between routing decisions and the real HTTP stack:
//! the router only needs "here is a response" or "the fetch failed".

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::worker::http::{Request, Response, ResponseKind, ResponseSource, Url};

/// Something that can perform a fetch
pub trait Network: Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// `Network` backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    /// `scheme://host[:port]`, as `Request::origin` reports it
    app_origin: String,
}

impl HttpNetwork {
    pub fn new(app_origin: &str, timeout: Duration) -> Result<Self, FetchError> {
        let app_origin = Url::parse(app_origin)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", app_origin, e)))?
            .origin()
            .ascii_serialization();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, app_origin })
    }

    fn response_kind(&self, request: &Request) -> ResponseKind {
        if request.origin() == self.app_origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status();
        let redirected = response.url() != &request.url;
        let kind = self.response_kind(request);
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "Network response");

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            kind,
            redirected,
            source: ResponseSource::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin_responses_are_basic() {
        let network = HttpNetwork::new("https://shop.example:443/tienda/", Duration::from_secs(1))
            .expect("valid origin");
        let own = Request::get("https://shop.example/logo.png").expect("url");
        assert_eq!(network.response_kind(&own), ResponseKind::Basic);
        let api = Request::get("https://api.shop.example/tienda").expect("url");
        assert_eq!(network.response_kind(&api), ResponseKind::Cors);
    }

    #[test]
    fn test_invalid_app_origin_rejected() {
        assert!(HttpNetwork::new("not a url", Duration::from_secs(1)).is_err());
    }
}
