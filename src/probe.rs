use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// One outbound health check: fetch `url` and report the HTTP status code.
/// No retries.
#[async_trait]
pub trait HttpProbe: Send + Sync + 'static {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError>;
}

/// [`HttpProbe`] over a shared `reqwest` client.
///
/// The client carries a hard per-request timeout so one dead host can never
/// hold a worker for long.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("linkcut/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Transport(e.to_string())
            }
        })?;

        Ok(resp.status().as_u16())
    }
}
