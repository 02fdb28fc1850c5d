//! Solr-backed [`RecordIndex`].
//!
//! Uses three Solr endpoints on one core:
//!
//! | Method | Path | Use |
//! |--------|------|-----|
//! | `GET`  | `{core}/admin/ping?wt=json` | startup reachability check |
//! | `GET`  | `{core}/select?q=…&rows=…&wt=json` | find records by field expression |
//! | `POST` | `{core}/update?commit=true` | atomic `set` updates, committed at once |
//!
//! Update bodies use Solr's atomic-update syntax:
//!
//! ```json
//! [{ "id": "…", "Modality": { "set": ["CT"] }, "url": { "set": "https://…" } }]
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::warn;

use super::{IndexError, IndexRecord, Query, RecordIndex};
use crate::config::{with_trailing_slash, IndexConfig};

pub struct SolrIndex {
    client: reqwest::Client,
    core_url: String,
}

impl SolrIndex {
    /// Client for `core` under the configured Solr base URL.
    pub fn new(config: &IndexConfig, core: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Solr")?;

        Ok(Self {
            client,
            core_url: format!("{}{}", with_trailing_slash(&config.url), core),
        })
    }

    pub fn core_url(&self) -> &str {
        &self.core_url
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, IndexError> {
        let response = request.send().await.map_err(|source| IndexError::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RecordIndex for SolrIndex {
    async fn ping(&self) -> Result<(), IndexError> {
        let url = format!("{}/admin/ping", self.core_url);
        let request = self.client.get(&url).query(&[("wt", "json")]);
        self.send(&url, request).await?;
        Ok(())
    }

    async fn search(&self, query: &Query, rows: usize) -> Result<Vec<IndexRecord>, IndexError> {
        let url = format!("{}/select", self.core_url);
        let request = self.client.get(&url).query(&[
            ("q", query.to_lucene()),
            ("rows", rows.to_string()),
            ("wt", "json".to_string()),
        ]);
        let response = self.send(&url, request).await?;

        let body: Value = response.json().await.map_err(|source| IndexError::Http {
            url: url.clone(),
            source,
        })?;
        parse_docs(&body).map_err(|reason| IndexError::Response { url, reason })
    }

    async fn set_fields(&self, id: &str, fields: &Map<String, Value>) -> Result<(), IndexError> {
        let url = format!("{}/update", self.core_url);
        let request = self
            .client
            .post(&url)
            .query(&[("commit", "true")])
            .json(&update_payload(id, fields));
        self.send(&url, request).await?;
        Ok(())
    }
}

/// Build a one-document atomic update.
pub fn update_payload(id: &str, fields: &Map<String, Value>) -> Value {
    let mut doc = Map::new();
    doc.insert("id".to_string(), Value::String(id.to_string()));
    for (name, value) in fields {
        doc.insert(name.clone(), json!({ "set": value }));
    }
    Value::Array(vec![Value::Object(doc)])
}

/// Pull `response.docs` out of a select response.
fn parse_docs(body: &Value) -> Result<Vec<IndexRecord>, String> {
    let docs = body
        .pointer("/response/docs")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing response.docs".to_string())?;

    let mut records = Vec::with_capacity(docs.len());
    for doc in docs {
        let Some(fields) = doc.as_object() else {
            warn!("Ignoring non-object Solr document: {}", doc);
            continue;
        };
        let id = match fields.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Ignoring Solr document without an id");
                continue;
            }
        };
        records.push(IndexRecord::new(id, fields.clone()));
    }
    Ok(records)
}
