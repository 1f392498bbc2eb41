//! Hosted realtime database over its REST interface.
//!
//! - `POST {path}.json` appends a child and answers `{"name": key}`.
//! - `GET`/`PUT`/`DELETE` read, replace and remove a subtree.
//! - `GET` with `Accept: text/event-stream` streams `put`/`patch` events, which
//!   we apply to a local mirror so every subscriber sees a full snapshot.
//!
//! Requests carry the signed-in session's id token as the `auth` parameter.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::plugins::auth::SessionHandle;

use super::sse::{RealtimeEvent, SseDecoder};
use super::watch::Subscription;
use super::{Snapshot, StoreError, StorePath, TreeStore};

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

pub struct RealtimeTree {
    base_url: Url,
    http: reqwest::Client,
    session: Option<SessionHandle>,
}

impl RealtimeTree {
    pub fn new(base_url: &str, http: reqwest::Client) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| StoreError::invalid_input(format!("Invalid database URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::invalid_input("Database URL cannot be a base URL"));
        }
        Ok(Self {
            base_url,
            http,
            session: None,
        })
    }

    /// Authenticate requests with whatever session is current at request time.
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub(crate) fn url(&self, path: &StorePath) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::invalid_input("Database URL cannot be a base URL"))?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                Some((last, parents)) => {
                    segments.extend(parents.iter().map(|s| s.as_str()));
                    segments.push(&format!("{last}.json"));
                }
                None => {
                    segments.push(".json");
                }
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &StorePath) -> Result<RequestBuilder, StoreError> {
        let mut builder = self.http.request(method, self.url(path)?);
        if let Some(token) = self.session.as_ref().and_then(|s| s.id_token()) {
            builder = builder.query(&[("auth", token)]);
        }
        Ok(builder)
    }
}

#[async_trait]
impl TreeStore for RealtimeTree {
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let response: PushResponse = self
            .request(Method::POST, path)?
            .json(&value)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.name)
    }

    async fn get(&self, path: &StorePath) -> Result<Snapshot, StoreError> {
        let value: Value = self
            .request(Method::GET, path)?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Snapshot::new(Some(value)))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.request(Method::PUT, path)?
            .json(&value)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.request(Method::DELETE, path)?
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let response = self
            .request(Method::GET, path)?
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let label = path.to_string();
        let task = tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut mirror = Value::Null;

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        log::warn!("Realtime stream for {} failed: {}", label, err);
                        return;
                    }
                };

                for frame in decoder.push(&bytes) {
                    let event = match RealtimeEvent::from_frame(&frame) {
                        Ok(event) => event,
                        Err(err) => {
                            log::warn!("Skipping malformed realtime event: {}", err);
                            continue;
                        }
                    };
                    match event {
                        RealtimeEvent::Cancel(reason) => {
                            log::warn!("Realtime stream for {} cancelled: {}", label, reason);
                            return;
                        }
                        RealtimeEvent::AuthRevoked => {
                            log::warn!("Realtime stream for {} lost its auth token", label);
                            return;
                        }
                        event => {
                            if event.apply(&mut mirror)
                                && tx.send(Snapshot::new(Some(mirror.clone()))).is_err()
                            {
                                return;
                            }
                        }
                    }
                }
            }
            log::debug!("Realtime stream for {} closed", label);
        });

        Ok(Subscription::new(path.clone(), rx).with_task(task))
    }

    fn backend(&self) -> &'static str {
        "realtime"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(base: &str) -> RealtimeTree {
        RealtimeTree::new(base, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn test_url_appends_json_suffix() {
        let store = tree("https://demo-default-rtdb.firebaseio.com/");
        let path = StorePath::parse("users/u1/conversations/c1").unwrap();
        assert_eq!(
            store.url(&path).unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/users/u1/conversations/c1.json"
        );
        assert_eq!(
            store.url(&StorePath::root()).unwrap().as_str(),
            "https://demo-default-rtdb.firebaseio.com/.json"
        );
    }

    #[test]
    fn test_url_escapes_segments() {
        let store = tree("https://demo.firebaseio.com");
        let path = StorePath::parse("users/a b").unwrap();
        assert_eq!(
            store.url(&path).unwrap().as_str(),
            "https://demo.firebaseio.com/users/a%20b.json"
        );
    }

    #[test]
    fn test_rejects_bad_base() {
        assert!(RealtimeTree::new("not a url", reqwest::Client::new()).is_err());
        assert!(RealtimeTree::new("mailto:someone@example.com", reqwest::Client::new()).is_err());
    }
}
