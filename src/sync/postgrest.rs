//! PostgREST (Supabase) implementation of [`RemoteSink`].

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use super::{RemoteBatch, RemoteSink, WriteMode};
use crate::config::SyncConfig;
use crate::error::ObserverError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upserts batches through the PostgREST `POST /rest/v1/{table}` endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestSink {
    client: reqwest::Client,
    base_url: String,
}

impl PostgrestSink {
    /// Creates a sink for the project at `config.base_url`, authenticated
    /// with the service key.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Config`] if the key is not a valid header
    /// value or the HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self, ObserverError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| ObserverError::Config(format!("SUPABASE_SERVICE_KEY: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ObserverError::Config(format!("SUPABASE_SERVICE_KEY: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ObserverError::Config(format!("sync http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self, batch: &RemoteBatch) -> String {
        format!(
            "{}/rest/v1/{}?on_conflict={}",
            self.base_url, batch.table, batch.on_conflict
        )
    }
}

const fn prefer(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Upsert => "resolution=merge-duplicates,return=minimal",
        WriteMode::Insert => "resolution=ignore-duplicates,return=minimal",
    }
}

impl RemoteSink for PostgrestSink {
    async fn push(&self, batch: &RemoteBatch) -> Result<(), ObserverError> {
        if batch.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.endpoint(batch))
            .header("Prefer", prefer(batch.mode))
            .json(&batch.rows)
            .send()
            .await
            .map_err(|e| ObserverError::RemoteSync(format!("{}: {e}", batch.table)))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(table = batch.table, rows = batch.rows.len(), "batch pushed");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ObserverError::RemoteSync(format!(
            "{}: HTTP {status}: {body}",
            batch.table
        )))
    }
}
