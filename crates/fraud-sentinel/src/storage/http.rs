use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use tracing::debug;

use super::{ObjectStore, StorageError};

/// Client for the Cloud Storage JSON API (or any server speaking its shape).
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
    access_token: Option<String>,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| StorageError::InvalidLocation(format!("{endpoint}: {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::InvalidLocation(endpoint.to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StorageError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            access_token,
            timeout,
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{path}` with the object name encoded
    /// as a single segment.
    pub fn object_url(&self, bucket: &str, path: &str) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::InvalidLocation(self.endpoint.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", bucket, "o", path]);
        }
        Ok(url)
    }

    fn request_error(&self, err: reqwest::Error) -> StorageError {
        if err.is_timeout() {
            StorageError::Timeout(self.timeout)
        } else {
            StorageError::Transport(err.to_string())
        }
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl std::fmt::Debug for HttpObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.access_token.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
        let url = self.object_url(bucket, path)?;
        let uri = url.to_string();
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StorageError::Status {
                status: status.as_u16(),
                uri,
            }),
        }
    }

    async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let mut url = self.object_url(bucket, path)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let uri = url.to_string();
        debug!(%uri, "fetching object");

        let response = self
            .get(url)
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            }),
            status if status.is_success() => response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|err| self.request_error(err)),
            status => Err(StorageError::Status {
                status: status.as_u16(),
                uri,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn object_names_are_encoded_as_one_segment() {
        let store = HttpObjectStore::new("https://storage.googleapis.com", None, TIMEOUT).expect("store");
        let url = store
            .object_url("landing", "daily/2024-01-01 tx.csv")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/landing/o/daily%2F2024-01-01%20tx.csv"
        );
    }

    #[test]
    fn endpoint_with_prefix_keeps_its_path() {
        let store = HttpObjectStore::new("http://localhost:4443/gcs/", None, TIMEOUT).expect("store");
        let url = store.object_url("b", "o.csv").expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:4443/gcs/storage/v1/b/b/o/o.csv"
        );
    }

    #[test]
    fn rejects_non_base_endpoints() {
        let error = HttpObjectStore::new("mailto:ops@example.com", None, TIMEOUT).expect_err("not a base");
        assert!(matches!(error, StorageError::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let store = HttpObjectStore::new(
            &format!("http://{addr}"),
            None,
            Duration::from_millis(200),
        )
        .expect("store");

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            store.exists("landing", "tx.csv"),
        )
        .await
        .expect("request finishes on its own");

        assert!(matches!(outcome, Err(StorageError::Timeout(limit)) if limit == Duration::from_millis(200)));

        let error = store
            .fetch("landing", "tx.csv")
            .await
            .expect_err("stalled fetch");
        assert!(matches!(error, StorageError::Timeout(_)));
    }
}
