use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::error::SyncError;
use crate::models::records::Collection;

/// Delivers one record to the server copy of its collection.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push(&self, collection: Collection, record: &serde_json::Value)
        -> Result<(), SyncError>;
}

/// `POST {base_url}/api/sync/{collection}` with the record as JSON body.
#[derive(Clone)]
pub struct HttpSyncTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSyncTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, SyncError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self, collection: Collection) -> Result<Url, SyncError> {
        Ok(self
            .base_url
            .join(&format!("api/sync/{}", collection.as_str()))?)
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn push(
        &self,
        collection: Collection,
        record: &serde_json::Value,
    ) -> Result<(), SyncError> {
        let url = self.endpoint(collection)?;

        let response = self.client.post(url).json(record).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SyncError::SyncRequestFailed {
            collection,
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let transport =
            HttpSyncTransport::new("https://example.org/studynest", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            transport
                .endpoint(Collection::QuizAttempts)
                .unwrap()
                .as_str(),
            "https://example.org/studynest/api/sync/quizAttempts"
        );

        let transport =
            HttpSyncTransport::new("http://localhost:8081/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.endpoint(Collection::Submissions).unwrap().as_str(),
            "http://localhost:8081/api/sync/submissions"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(matches!(
            HttpSyncTransport::new("not a url", Duration::from_secs(1)),
            Err(SyncError::InvalidEndpoint(_))
        ));
    }
}
