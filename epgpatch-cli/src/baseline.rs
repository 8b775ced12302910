use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use epgpatch_core::ports::{BaselinePort, PortError};

/// Downloads the baseline guide over plain HTTP(S).
pub(crate) struct HttpBaseline {
    client: Client,
}

impl HttpBaseline {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BaselinePort for HttpBaseline {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PortError> {
        debug!(url, "fetching baseline guide");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(body.to_vec())
    }
}
