//! 📡 The Elasticsearch sink — the last stop before documents become searchable.
//!
//! Speaks the `_bulk` API dialect: two lines per document (action metadata,
//! then source), newline-delimited, trailing newline included. The trailing
//! newline MATTERS. Three engineers lost weekends to this. One of them still
//! flinches at `\n`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, trace};

use crate::app_config::ElasticsearchConfig;
use crate::common::Document;
use crate::load::{BulkFailure, BulkReport, Loader};

/// 📡 The sink side of the cluster connection — pure I/O, zero buffering.
///
/// `ElasticsearchSink` renders a batch into one NDJSON payload, POSTs it to
/// `_bulk`, and reads the per-item verdicts back out of the response. That's
/// it. No internal buffer. No watermark knowledge. The worker upstream owns
/// the bookkeeping; this type owns the wire.
#[derive(Debug)]
pub(crate) struct ElasticsearchSink {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchSink {
    /// 🚀 Stand up a new sink, fully wired and ready to receive documents.
    ///
    /// Builds the HTTP client with sane timeouts (10s connect, 30s request —
    /// bulk bodies can be meaty and we're not monsters), then pings the
    /// cluster root so a bad URL or dead cluster fails loudly here, at boot,
    /// rather than quietly 10,000 documents deep.
    pub(crate) async fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a missing TLS cert or a cursed system OpenSSL. Either way: tragic.")?;

        let sink = Self { client, config };
        sink.ping().await?;
        Ok(sink)
    }

    /// 📞 "Hello? Is this thing on?" — one GET against the cluster root.
    async fn ping(&self) -> Result<()> {
        let response = self
            .with_auth(self.client.get(&self.config.url))
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 elasticsearch at '{}' is not answering — check the url, check the cluster, check your feelings",
                    self.config.url
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "💀 elasticsearch at '{}' answered the ping with {status} — it's home, but it's not happy",
                self.config.url
            );
        }
        debug!("✅ cluster is up and accepting visitors");
        Ok(())
    }

    /// 🔒 Auth priority: API key wins over basic auth. This is not a democracy.
    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 🏗️ Render the sacred two-lines-per-document bulk payload.
    ///
    /// ```text
    /// {"index":{"_index":"movies","_id":"..."}}
    /// {"title":"Blade Runner", ...}
    /// ```
    ///
    /// Same id = upsert. The action says `index`, the cluster hears "insert or
    /// overwrite", and re-delivery after a partial failure stays harmless.
    fn render_bulk_body(index: &str, docs: &[Document]) -> Result<String> {
        let mut payload = String::new();
        for doc in docs {
            let action = json!({ "index": { "_index": index, "_id": doc.id } });
            payload.push_str(
                &serde_json::to_string(&action)
                    .context("failed to serialize a bulk action line")?,
            );
            payload.push('\n');
            payload.push_str(
                &serde_json::to_string(&doc.body)
                    .context("failed to serialize a document body")?,
            );
            payload.push('\n');
        }
        Ok(payload)
    }
}

#[async_trait]
impl Loader for ElasticsearchSink {
    /// 📡 POST the batch to `_bulk` and read the verdicts.
    ///
    /// Transport trouble and non-2xx statuses are errors (the retry policy
    /// upstream will have opinions). A 2xx with `errors: true` is NOT an
    /// error: each rejected document is logged here with its id and the
    /// remote's exact complaint, and returned in the report so the caller can
    /// refuse to advance the watermark.
    async fn bulk_upsert(&self, index: &str, docs: &[Document]) -> Result<BulkReport> {
        let payload = Self::render_bulk_body(index, docs)?;
        debug!(
            index,
            docs = docs.len(),
            bytes = payload.len(),
            "📡 sending bulk request — the payload has left the building"
        );

        let bulk_url = format!("{}/_bulk", self.config.url.trim_end_matches('/'));
        let response = self
            .with_auth(
                self.client
                    .post(&bulk_url)
                    // ⚠️ application/x-ndjson, not application/json. VERY important.
                    // The cluster will 406 or silently misbehave without it.
                    .header("Content-Type", "application/x-ndjson"),
            )
            .body(payload)
            .send()
            .await
            .context("💀 The bulk request never made it to Elasticsearch. The network said 'not vibing with it.' Check connectivity, check timeouts.")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 The bulk request arrived, but Elasticsearch said '{status}'. The response read: '{body}'."
            );
        }

        let verdict: BulkResponse = response
            .json()
            .await
            .context("bulk response was not the JSON we were promised")?;

        let mut failures = Vec::new();
        if verdict.errors {
            for item in &verdict.items {
                let Some(op) = &item.index else { continue };
                let Some(remote_error) = &op.error else { continue };
                let id = op.id.clone().unwrap_or_else(|| "<no id>".to_string());
                // Per-document failure detail, with the remote's own words.
                error!(
                    index,
                    id = %id,
                    status = op.status,
                    "📛 document rejected by the cluster: {remote_error}"
                );
                failures.push(BulkFailure {
                    id,
                    reason: remote_error.to_string(),
                });
            }
        } else {
            trace!(index, "🚀 bulk request landed — all documents accepted");
        }

        Ok(BulkReport {
            accepted: docs.len().saturating_sub(failures.len()),
            failures,
        })
    }
}

/// The slice of the `_bulk` response we actually read.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BulkResponseItem>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    index: Option<BulkItemStatus>,
}

#[derive(Debug, Deserialize)]
struct BulkItemStatus {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}
