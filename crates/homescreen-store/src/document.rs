use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::KeyedStore;
use crate::error::{Result, StoreError};
use crate::keys::{DocAddress, collections_for_prefix, doc_address};

const BACKEND: &str = "document";
const DEFAULT_PAGE_SIZE: usize = 300;

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringValue {
    #[serde(rename = "stringValue")]
    pub string_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampValue {
    #[serde(rename = "timestampValue")]
    pub timestamp_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<StringValue>,
    /// The untransformed key, stored so prefix listing can filter on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_key: Option<StringValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<TimestampValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: DocumentFields,
}

impl Document {
    pub fn original_key(&self) -> Option<&str> {
        self.fields.original_key.as_ref().map(|v| v.string_value.as_str())
    }

    pub fn value(&self) -> Option<&str> {
        self.fields.value.as_ref().map(|v| v.string_value.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// ── Backend ─────────────────────────────────────────────────────────────

/// Shared backend over a collection/document REST API.
///
/// Keys are mapped onto `{collection}/{docId}` by [`doc_address`]. The API
/// cannot list by key prefix, so `list` pages through every document of the
/// candidate collections and filters on the stored original key. That is an
/// O(collection size) scan per call.
pub struct DocumentStore {
    base_url: Url,
    auth_bearer: Option<String>,
    client: reqwest::Client,
    page_size: usize,
}

impl DocumentStore {
    pub fn new(base_url: &str, auth_bearer: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| StoreError::InvalidKey(format!("invalid document store url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidKey(format!(
                "document store url cannot be a base: {}",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(StoreError::http)?;
        Ok(Self {
            base_url,
            auth_bearer: auth_bearer.filter(|t| !t.is_empty()),
            client,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn doc_url(&self, addr: &DocAddress) -> Url {
        self.url(&[addr.collection, addr.doc_id.as_str()])
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.auth_bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn fetch_page(&self, collection: &str, page_token: Option<&str>) -> Result<ListDocumentsResponse> {
        let mut url = self.url(&[collection]);
        url.query_pairs_mut()
            .append_pair("pageSize", &self.page_size.to_string());
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let resp = self
            .request(reqwest::Method::GET, url.clone())
            .send()
            .await
            .map_err(StoreError::http)?;

        let status = resp.status();
        // An empty collection may simply not exist yet.
        if status == StatusCode::NOT_FOUND {
            return Ok(ListDocumentsResponse::default());
        }
        if !status.is_success() {
            return Err(status_error(status, &url));
        }
        resp.json().await.map_err(StoreError::http)
    }
}

fn status_error(status: StatusCode, url: &Url) -> StoreError {
    StoreError::Status {
        backend: BACKEND,
        status: status.as_u16(),
        url: url.to_string(),
    }
}

#[async_trait]
impl KeyedStore for DocumentStore {
    fn backend_tag(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let url = self.doc_url(&doc_address(key)?);
        let resp = self
            .request(reqwest::Method::GET, url.clone())
            .send()
            .await
            .map_err(StoreError::http)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, &url));
        }
        let doc: Document = resp.json().await.map_err(StoreError::http)?;

        match doc.original_key() {
            Some(stored) if stored != key => {
                warn!(
                    "Document {} holds key '{}', not '{}'; treating as absent",
                    url, stored, key
                );
                return Ok(None);
            }
            _ => {}
        }

        doc.value()
            .map(|v| Some(v.to_string()))
            .ok_or_else(|| StoreError::Malformed {
                key: key.to_string(),
                reason: "document has no value field".to_string(),
            })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let url = self.doc_url(&doc_address(key)?);
        let doc = Document {
            name: None,
            fields: DocumentFields {
                value: Some(StringValue {
                    string_value: value.to_string(),
                }),
                original_key: Some(StringValue {
                    string_value: key.to_string(),
                }),
                updated_at: Some(TimestampValue {
                    timestamp_value: chrono::Utc::now().to_rfc3339(),
                }),
            },
        };

        let resp = self
            .request(reqwest::Method::PATCH, url.clone())
            .json(&doc)
            .send()
            .await
            .map_err(StoreError::http)?;

        if !resp.status().is_success() {
            return Err(status_error(resp.status(), &url));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.doc_url(&doc_address(key)?);
        let resp = self
            .request(reqwest::Method::DELETE, url.clone())
            .send()
            .await
            .map_err(StoreError::http)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }
        Err(status_error(status, &url))
    }

    #[instrument(name = "document_list", skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for collection in collections_for_prefix(prefix) {
            let mut page_token: Option<String> = None;
            let mut scanned = 0usize;
            loop {
                let page = self.fetch_page(collection, page_token.as_deref()).await?;
                scanned += page.documents.len();
                keys.extend(
                    page.documents
                        .iter()
                        .filter_map(Document::original_key)
                        .filter(|k| k.starts_with(prefix))
                        .map(str::to_string),
                );
                match page.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }
            debug!("Scanned {} documents in {} for prefix '{}'", scanned, collection, prefix);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        warn!("clear is not supported on the shared document store; ignoring");
        Ok(())
    }
}
