use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

/// Re-reads the current connectivity
pub trait ConnectivityProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'_, bool>;
}

/// Online if a `HEAD` against `url` gets any HTTP response in time
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    fn probe(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.client.head(&self.url).send().await {
                Ok(response) => {
                    debug!(url = %self.url, status = response.status().as_u16(), "Probe answered");
                    true
                }
                Err(e) => {
                    debug!(url = %self.url, error = %e, "Probe failed");
                    false
                }
            }
        })
    }
}

/// State reported by the host
#[derive(Debug, Default)]
pub struct FixedProbe {
    online: AtomicBool,
}

impl FixedProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for FixedProbe {
    fn probe(&self) -> BoxFuture<'_, bool> {
        let online = self.online.load(Ordering::SeqCst);
        Box::pin(async move { online })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_probe() {
        let probe = FixedProbe::new(true);
        assert!(probe.probe().await);
        probe.set(false);
        assert!(!probe.probe().await);
    }

    #[tokio::test]
    async fn test_http_probe_unreachable_is_offline() {
        let probe = HttpProbe::new("http://127.0.0.1:9", Duration::from_millis(500)).expect("client");
        assert!(!probe.probe().await);
    }
}
