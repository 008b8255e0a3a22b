//! Remote data store abstraction.
//!
//! The [`DataStore`] trait decouples the merge stages from the Grist HTTP
//! API. Tests use an in-memory store that answers queries and records writes
//! without any network access.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::types::{Fields, Record, Row};

/// Environment variable that overrides the API key file.
pub const API_KEY_ENV: &str = "GRIST_API_KEY";

/// Operations the merge needs from a tabular store. One call per operation;
/// implementations must not retry.
pub trait DataStore {
    /// Identifier of the document this store talks to.
    fn document_id(&self) -> &str;

    /// Run a read-only SQL query, returning rows in result order.
    fn sql(&self, query: &str) -> Result<Vec<Row>>;

    /// Fetch every record of `table`.
    fn fetch_records(&self, table: &str) -> Result<Vec<Record>>;

    /// Insert one record, returning its new row id.
    fn add_record(&self, table: &str, fields: &Fields) -> Result<u64>;

    /// Change `fields` of record `id`. Unlisted columns are left untouched.
    fn update_record(&self, table: &str, id: u64, fields: &Fields) -> Result<()>;
}

/// Grist REST API client authenticated with a bearer API key.
///
/// Uses `reqwest`'s default timeouts; no retry or backoff.
pub struct GristClient {
    http: Client,
    root_url: String,
    doc_id: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SqlResponse {
    records: Vec<SqlRecord>,
}

#[derive(Debug, Deserialize)]
struct SqlRecord {
    fields: Row,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct RecordId {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct AddedRecords {
    records: Vec<RecordId>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl GristClient {
    pub fn new(
        root_url: impl Into<String>,
        doc_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("grist-merge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            root_url: root_url.into(),
            doc_id: doc_id.into(),
            api_key: api_key.into(),
        })
    }

    fn doc_url(&self, path: &str) -> String {
        format!(
            "{}/api/docs/{}{}",
            self.root_url.trim_end_matches('/'),
            self.doc_id,
            path
        )
    }

    fn records_url(&self, table: &str) -> String {
        self.doc_url(&format!("/tables/{table}/records"))
    }

    /// Send a request and fail on any non-2xx status, surfacing the store's
    /// `error` message when the body carries one.
    fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .context("send request")?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|err| err.error)
            .unwrap_or(body);
        bail!("store responded {status}: {}", message.trim());
    }
}

impl DataStore for GristClient {
    fn document_id(&self) -> &str {
        &self.doc_id
    }

    #[instrument(skip_all, fields(doc = %self.doc_id))]
    fn sql(&self, query: &str) -> Result<Vec<Row>> {
        let url = self.doc_url("/sql");
        debug!(%url, query, "running sql");
        let response = self.execute(self.http.post(&url).json(&json!({ "sql": query })))?;
        let body: SqlResponse = response.json().context("decode sql response")?;
        Ok(body.records.into_iter().map(|record| record.fields).collect())
    }

    #[instrument(skip_all, fields(doc = %self.doc_id, table = %table))]
    fn fetch_records(&self, table: &str) -> Result<Vec<Record>> {
        let url = self.records_url(table);
        debug!(%url, "fetching records");
        let response = self.execute(self.http.get(&url))?;
        let body: RecordsResponse = response.json().context("decode records response")?;
        Ok(body.records)
    }

    #[instrument(skip_all, fields(doc = %self.doc_id, table = %table))]
    fn add_record(&self, table: &str, fields: &Fields) -> Result<u64> {
        let url = self.records_url(table);
        let payload = json!({ "records": [{ "fields": fields }] });
        let response = self.execute(self.http.post(&url).json(&payload))?;
        let body: AddedRecords = response.json().context("decode add response")?;
        let id = body
            .records
            .first()
            .map(|record| record.id)
            .ok_or_else(|| anyhow!("add response listed no record id"))?;
        debug!(id, "record added");
        Ok(id)
    }

    #[instrument(skip_all, fields(doc = %self.doc_id, table = %table, id = id))]
    fn update_record(&self, table: &str, id: u64, fields: &Fields) -> Result<()> {
        let url = self.records_url(table);
        let payload = json!({ "records": [{ "id": id, "fields": fields }] });
        self.execute(self.http.patch(&url).json(&payload))?;
        debug!("record updated");
        Ok(())
    }
}

/// Resolve the API key: `GRIST_API_KEY` if set, otherwise the key file.
pub fn resolve_api_key(key_file: &Path) -> Result<String> {
    api_key_from(std::env::var(API_KEY_ENV).ok(), key_file)
}

/// A non-blank `env_value` wins; otherwise the trimmed contents of
/// `key_file`.
pub fn api_key_from(env_value: Option<String>, key_file: &Path) -> Result<String> {
    if let Some(key) = env_value {
        let key = key.trim();
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    let path = expand_home(key_file);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("read api key {}", path.display()))?;
    let key = contents.trim();
    if key.is_empty() {
        bail!("api key file {} is empty", path.display());
    }
    Ok(key.to_string())
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
