// src/store/sheets.rs
//! Google Sheets backed log store.
//!
//! Log = spreadsheet (looked up by exact title through the Drive API),
//! partition = worksheet. Rows are appended with `USER_ENTERED` so the
//! sheet parses the timestamp text as a date and the value as a number.

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::token::{bearer, ServiceAccountTokenSource, TokenSource};
use super::{LogStore, PartitionHandle, Reading, StoreError, HEADER_ROW};
use crate::credentials::Credential;

pub const DEFAULT_SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_DRIVE_FILES_BASE: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

pub struct GoogleSheetsStore {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    sheets_base: Url,
    drive_base: Url,
}

impl GoogleSheetsStore {
    /// Store authenticated with a service-account credential.
    pub fn new(credential: Credential, http: Client) -> Result<Self, StoreError> {
        let tokens = Arc::new(ServiceAccountTokenSource::new(credential, http.clone()));
        Self::with_token_source(tokens, http)
    }

    pub fn with_token_source(
        tokens: Arc<dyn TokenSource>,
        http: Client,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            http,
            tokens,
            sheets_base: parse_base(DEFAULT_SHEETS_BASE)?,
            drive_base: parse_base(DEFAULT_DRIVE_FILES_BASE)?,
        })
    }

    /// Point the client at alternative API roots (used against fakes in tests).
    pub fn with_endpoints(mut self, sheets_base: &str, drive_base: &str) -> Result<Self, StoreError> {
        self.sheets_base = parse_base(sheets_base)?;
        self.drive_base = parse_base(drive_base)?;
        Ok(self)
    }

    fn sheets_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        extend(&self.sheets_base, segments)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Response, StoreError> {
        let token = self.tokens.access_token().await?;
        let resp = req.bearer_auth(bearer(&token)).send().await?;
        check_status(resp).await
    }

    async fn find_log(&self, log_name: &str) -> Result<Option<String>, StoreError> {
        #[derive(Deserialize)]
        struct FileList {
            #[serde(default)]
            files: Vec<DriveFile>,
        }
        #[derive(Deserialize)]
        struct DriveFile {
            id: String,
        }

        let q = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false",
            escape_query(log_name)
        );
        let req = self.http.get(self.drive_base.clone()).query(&[
            ("q", q.as_str()),
            ("fields", "files(id,name)"),
            ("spaces", "drive"),
            ("pageSize", "10"),
        ]);
        let list: FileList = self.send(req).await?.json().await?;
        if list.files.len() > 1 {
            tracing::warn!(log = %log_name, count = list.files.len(), "several logs share this name, using the first");
        }
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_log(&self, log_name: &str) -> Result<String, StoreError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            spreadsheet_id: String,
        }

        let req = self
            .http
            .post(self.sheets_base.clone())
            .json(&json!({ "properties": { "title": log_name } }));
        let created: Created = self.send(req).await?.json().await?;
        tracing::info!(log = %log_name, id = %created.spreadsheet_id, "created destination log");
        Ok(created.spreadsheet_id)
    }

    async fn partition_titles(&self, log_id: &str) -> Result<Vec<String>, StoreError> {
        #[derive(Deserialize)]
        struct Spreadsheet {
            #[serde(default)]
            sheets: Vec<Sheet>,
        }
        #[derive(Deserialize)]
        struct Sheet {
            properties: SheetProperties,
        }
        #[derive(Deserialize)]
        struct SheetProperties {
            title: String,
        }

        let url = self.sheets_url(&[log_id])?;
        let req = self
            .http
            .get(url)
            .query(&[("fields", "sheets.properties.title")]);
        let doc: Spreadsheet = self.send(req).await?.json().await?;
        Ok(doc.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn create_partition(&self, log_id: &str, partition: &str) -> Result<(), StoreError> {
        let url = self.sheets_url(&[&format!("{log_id}:batchUpdate")])?;
        let req = self.http.post(url).json(&json!({
            "requests": [ { "addSheet": { "properties": { "title": partition } } } ]
        }));
        self.send(req).await?;
        Ok(())
    }

    async fn partition_is_empty(&self, log_id: &str, partition: &str) -> Result<bool, StoreError> {
        #[derive(Deserialize)]
        struct ValueRange {
            #[serde(default)]
            values: Vec<Vec<Value>>,
        }

        let range = format!("{}!A1:B1", quote_sheet(partition));
        let url = self.sheets_url(&[log_id, "values", &range])?;
        let vr: ValueRange = self.send(self.http.get(url)).await?.json().await?;
        Ok(vr.values.iter().all(|row| row.is_empty()))
    }

    async fn append_row(
        &self,
        log_id: &str,
        partition: &str,
        row: Vec<Value>,
    ) -> Result<(), StoreError> {
        let range = format!("{}!A1:append", quote_sheet(partition));
        let url = self.sheets_url(&[log_id, "values", &range])?;
        let req = self
            .http
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": [row] }));
        self.send(req).await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for GoogleSheetsStore {
    async fn resolve_partition(
        &self,
        log_name: &str,
        partition: &str,
    ) -> Result<PartitionHandle, StoreError> {
        let log_id = match self.find_log(log_name).await? {
            Some(id) => id,
            None => {
                tracing::info!(log = %log_name, "destination log not found, creating it");
                self.create_log(log_name).await?
            }
        };

        let titles = self.partition_titles(&log_id).await?;
        let needs_header = if titles.iter().any(|t| t == partition) {
            // A previous init may have created the sheet but failed on the header.
            self.partition_is_empty(&log_id, partition).await?
        } else {
            tracing::info!(log = %log_name, partition = %partition, "partition not found, creating it");
            self.create_partition(&log_id, partition).await?;
            true
        };
        if needs_header {
            tracing::info!(log = %log_name, partition = %partition, "writing header row");
            let header = HEADER_ROW.iter().map(|h| Value::from(*h)).collect();
            self.append_row(&log_id, partition, header).await?;
        }

        Ok(PartitionHandle {
            log_name: log_name.to_string(),
            log_id,
            partition: partition.to_string(),
        })
    }

    async fn append(&self, handle: &PartitionHandle, reading: &Reading) -> Result<(), StoreError> {
        let row = vec![
            Value::from(reading.timestamp_string()),
            Value::from(reading.value),
        ];
        self.append_row(&handle.log_id, &handle.partition, row).await
    }

    fn name(&self) -> &'static str {
        "google-sheets"
    }
}

fn parse_base(s: &str) -> Result<Url, StoreError> {
    let url = Url::parse(s).map_err(|e| StoreError::Config(format!("{s:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(StoreError::Config(format!("{s:?} cannot be a base url")));
    }
    Ok(url)
}

fn extend(base: &Url, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::Config(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".to_string());
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(StoreError::Auth(message));
    }
    Err(StoreError::Http {
        status: Some(status.as_u16()),
        message,
    })
}

/// Quote a worksheet title for A1 notation (`it's` -> `'it''s'`).
pub fn quote_sheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_titles_are_quoted_for_a1() {
        assert_eq!(quote_sheet("Fitnesspark-Bern"), "'Fitnesspark-Bern'");
        assert_eq!(quote_sheet("Bob's Gym"), "'Bob''s Gym'");
    }

    #[test]
    fn drive_query_escapes_quotes() {
        assert_eq!(escape_query("Bob's"), "Bob\\'s");
    }

    #[test]
    fn urls_keep_base_path_and_encode_segments() {
        let base = parse_base("http://127.0.0.1:9/v4/spreadsheets").unwrap();
        let url = extend(&base, &["abc", "values", "'Unisport Bern'!A1:append"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/v4/spreadsheets/abc/values/'Unisport%20Bern'!A1:append"
        );
        let url = extend(&base, &["abc:batchUpdate"]).unwrap();
        assert_eq!(url.path(), "/v4/spreadsheets/abc:batchUpdate");
    }

    #[test]
    fn bad_base_is_config_error() {
        assert!(matches!(parse_base("mailto:x@y"), Err(StoreError::Config(_))));
        assert!(matches!(parse_base("::"), Err(StoreError::Config(_))));
    }
}
