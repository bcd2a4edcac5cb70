//! Google Drive backend, storing the backup in the hidden `appDataFolder`.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;

use barralibre_core::sync::{
    BackupTransport, RemoteSnapshot, Revision, TransportError, UploadAck, BACKUP_FILE_NAME,
};

use super::token::{TokenError, TokenManager};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const BOUNDARY: &str = "---barra_libre_boundary";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveRevision {
    id: String,
    modified_time: DateTime<Utc>,
    /// int64 values come back as strings
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RevisionList {
    #[serde(default)]
    revisions: Vec<DriveRevision>,
}

impl From<TokenError> for TransportError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::NotLoggedIn => TransportError::Auth("not signed in".to_string()),
            TokenError::Cancelled => TransportError::AuthCancelled,
            TokenError::Http(message) => TransportError::Network(message),
            TokenError::Rejected { .. } | TokenError::Parse(_) => {
                TransportError::Auth(e.to_string())
            }
            TokenError::Io(e) => TransportError::Io(e),
        }
    }
}

pub struct DriveTransport {
    http: reqwest::Client,
    tokens: TokenManager,
    file: Mutex<Option<DriveFile>>,
}

impl DriveTransport {
    pub fn new(tokens: TokenManager) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            file: Mutex::new(None),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, TransportError> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        check_status(status, body)
    }

    /// Looks up the backup file, caching the result for this run.
    async fn find_file(&self) -> Result<Option<DriveFile>, TransportError> {
        let mut cached = self.file.lock().await;
        if cached.is_some() {
            return Ok(cached.clone());
        }

        let query = format!("name='{}'", BACKUP_FILE_NAME);
        let url = format!(
            "{}?spaces=appDataFolder&fields={}&q={}&pageSize=1",
            FILES_URL,
            urlencoding::encode("files(id,name,modifiedTime)"),
            urlencoding::encode(&query),
        );
        let body = self.send(self.http.get(&url)).await?;
        let list: FileList = parse_json(&body)?;
        *cached = list.files.into_iter().next();
        Ok(cached.clone())
    }

    async fn file_id(&self) -> Result<String, TransportError> {
        self.find_file()
            .await?
            .map(|file| file.id)
            .ok_or_else(|| TransportError::NotFound(BACKUP_FILE_NAME.to_string()))
    }
}

impl BackupTransport for DriveTransport {
    async fn upload(&self, content: &str) -> Result<UploadAck, TransportError> {
        let existing = self.find_file().await?;
        let (request, metadata) = match &existing {
            Some(file) => (
                self.http.patch(format!(
                    "{}/{}?uploadType=multipart&fields=id,modifiedTime",
                    UPLOAD_URL, file.id
                )),
                serde_json::json!({ "name": BACKUP_FILE_NAME }),
            ),
            None => (
                self.http.post(format!(
                    "{}?uploadType=multipart&fields=id,modifiedTime",
                    UPLOAD_URL
                )),
                serde_json::json!({ "name": BACKUP_FILE_NAME, "parents": ["appDataFolder"] }),
            ),
        };

        let request = request
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(multipart_body(&metadata, content));
        let body = self.send(request).await?;

        let file: DriveFile = parse_json(&body)?;
        tracing::debug!("Uploaded backup file {}", file.id);
        *self.file.lock().await = Some(file);
        Ok(UploadAck {
            updated: existing.is_some(),
        })
    }

    async fn download(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        let Some(file) = self.find_file().await? else {
            return Ok(None);
        };
        let url = format!("{}/{}?alt=media", FILES_URL, file.id);
        let content = self.send(self.http.get(&url)).await?;
        Ok(Some(RemoteSnapshot {
            content,
            modified_time: file.modified_time,
        }))
    }

    async fn list_revisions(&self) -> Result<Vec<Revision>, TransportError> {
        let id = self.file_id().await?;
        let url = format!(
            "{}/{}/revisions?fields={}",
            FILES_URL,
            id,
            urlencoding::encode("revisions(id,modifiedTime,size)"),
        );
        let body = self.send(self.http.get(&url)).await?;
        let list: RevisionList = parse_json(&body)?;

        let mut revisions: Vec<Revision> = list
            .revisions
            .into_iter()
            .map(|r| Revision {
                id: r.id,
                modified_time: r.modified_time,
                size: r.size.and_then(|s| s.parse().ok()),
            })
            .collect();
        revisions.sort_by_key(|r| r.modified_time);
        Ok(revisions)
    }

    async fn download_revision(&self, id: &str) -> Result<String, TransportError> {
        let file_id = self.file_id().await?;
        let url = format!(
            "{}/{}/revisions/{}?alt=media",
            FILES_URL,
            file_id,
            urlencoding::encode(id),
        );
        self.send(self.http.get(&url)).await
    }
}

fn check_status(status: StatusCode, body: String) -> Result<String, TransportError> {
    if status.is_success() {
        return Ok(body);
    }
    let message = error_message(&body).unwrap_or_else(|| status.to_string());
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Auth(message),
        StatusCode::NOT_FOUND => TransportError::NotFound(message),
        _ => TransportError::Http {
            status: status.as_u16(),
            message,
        },
    })
}

/// Extracts `error.message` from a Drive error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Http {
        status: 200,
        message: format!("unexpected response: {}", e),
    })
}

fn multipart_body(metadata: &serde_json::Value, content: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
         --{b}\r\nContent-Type: application/json\r\n\r\n{content}\r\n--{b}--",
        b = BOUNDARY,
        meta = metadata,
        content = content,
    )
}
