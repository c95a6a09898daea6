//! Telegram Bot API blob backend.
//!
//! Each object is sent as a document to a private chat. The returned
//! `file_id` is the handle. Reads resolve the handle to a transient file path
//! via `getFile` and download it from the file endpoint. The Bot API offers no
//! way to delete a document by `file_id`, so this backend reports
//! `supports_delete() == false`.

use super::{BlobError, BlobHandle, BlobResult, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, multipart};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Bot API download ceiling; objects above it cannot be fetched back.
pub const TELEGRAM_MAX_OBJECT_SIZE: u64 = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
    pub max_object_size: u64,
    pub timeout: Duration,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .field("max_object_size", &self.max_object_size)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    file_path: Option<String>,
}

pub struct TelegramBlobStore {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramBlobStore {
    pub fn new(config: TelegramConfig) -> BlobResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(map_transport_error)?;
        Ok(Self { http, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            file_path.trim_start_matches('/')
        )
    }

    /// Decode a Bot API envelope, mapping failures onto the blob taxonomy.
    async fn read_envelope<T>(resp: reqwest::Response) -> BlobResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = resp.status();
        let body = resp.bytes().await.map_err(map_transport_error)?;
        let envelope: Option<ApiResponse<T>> = serde_json::from_slice(&body).ok();

        match envelope {
            Some(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) if status.is_success() => Ok(result),
            Some(envelope) => Err(classify_status(
                status,
                envelope
                    .description
                    .unwrap_or_else(|| "request failed".to_string()),
            )),
            None => Err(classify_status(
                status,
                format!("unexpected response ({} bytes)", body.len()),
            )),
        }
    }
}

/// Map a reqwest failure without leaking the URL (it embeds the bot token).
fn map_transport_error(err: reqwest::Error) -> BlobError {
    let err = err.without_url();
    if err.is_decode() || err.is_builder() {
        BlobError::RemoteRejected(err.to_string())
    } else {
        BlobError::RemoteUnavailable(err.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> BlobError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        BlobError::RemoteUnavailable(format!("{}: {}", status.as_u16(), message))
    } else if status == StatusCode::NOT_FOUND {
        BlobError::NotFound
    } else {
        BlobError::RemoteRejected(format!("{}: {}", status.as_u16(), message))
    }
}

#[async_trait]
impl BlobStore for TelegramBlobStore {
    async fn put(&self, data: Bytes, label: &str) -> BlobResult<BlobHandle> {
        self.ensure_within_limit(data.len())?;
        let size = data.len();
        let part = multipart::Part::stream_with_length(data, size as u64)
            .file_name(label.to_string())
            .mime_str("application/octet-stream")
            .map_err(map_transport_error)?;
        let form = multipart::Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .part("document", part);

        let resp = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;
        let message: Message = Self::read_envelope(resp).await?;
        let document = message.document.ok_or_else(|| {
            BlobError::RemoteRejected("sendDocument returned no document".to_string())
        })?;
        tracing::debug!(%label, size, "stored document");
        Ok(document.file_id)
    }

    async fn get(&self, handle: &str) -> BlobResult<Bytes> {
        let resp = self
            .http
            .get(self.method_url("getFile"))
            .query(&[("file_id", handle)])
            .send()
            .await
            .map_err(map_transport_error)?;
        let remote: RemoteFile = Self::read_envelope(resp).await?;
        let file_path = remote.file_path.ok_or(BlobError::NotFound)?;

        let resp = self
            .http
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, "download failed".to_string()));
        }
        resp.bytes().await.map_err(map_transport_error)
    }

    async fn delete(&self, _handle: &str) -> BlobResult<()> {
        Err(BlobError::DeleteUnsupported)
    }

    async fn test_connection(&self) -> bool {
        let resp = match self.http.get(self.method_url("getMe")).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(error = %map_transport_error(err), "telegram probe failed");
                return false;
            }
        };
        match Self::read_envelope::<serde_json::Value>(resp).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "telegram probe rejected");
                false
            }
        }
    }

    fn supports_delete(&self) -> bool {
        false
    }

    fn max_object_size(&self) -> u64 {
        self.config.max_object_size
    }

    fn backend_name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one full HTTP request (headers plus body) from the socket.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            let n = stream.read(&mut tmp).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_ascii_lowercase();
            let body_len = buf.len() - header_end - 4;
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            let done = match content_length {
                Some(len) => body_len >= len,
                None if headers.contains("transfer-encoding: chunked") => {
                    text.ends_with("0\r\n\r\n")
                }
                None => true,
            };
            if done {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serves the given responses in order, one per connection, and returns
    /// the received request lines.
    async fn mock_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let request = read_request(&mut stream).await;
                seen.push(request.lines().next().unwrap_or_default().to_string());
                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            seen
        });

        (url, handle)
    }

    fn store(url: String) -> TelegramBlobStore {
        TelegramBlobStore::new(TelegramConfig {
            bot_token: "123:secret".into(),
            chat_id: "-100".into(),
            api_url: url,
            max_object_size: 1024,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn put_returns_document_file_id() {
        let (url, server) = mock_server(vec![(
            200,
            r#"{"ok":true,"result":{"message_id":7,"document":{"file_id":"BQACAgQ","file_size":5}}}"#,
        )])
        .await;

        let handle = store(url)
            .put(Bytes::from_static(b"hello"), "notes.txt.part0")
            .await
            .unwrap();
        assert_eq!(handle, "BQACAgQ");

        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("POST /bot123:secret/sendDocument"));
    }

    #[tokio::test]
    async fn get_resolves_path_then_downloads() {
        let (url, server) = mock_server(vec![
            (
                200,
                r#"{"ok":true,"result":{"file_id":"abc","file_path":"documents/file_1"}}"#,
            ),
            (200, "raw-bytes"),
        ])
        .await;

        let data = store(url).get("abc").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"raw-bytes"));

        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("GET /bot123:secret/getFile?file_id=abc"));
        assert!(seen[1].starts_with("GET /file/bot123:secret/documents/file_1"));
    }

    #[tokio::test]
    async fn api_errors_are_classified() {
        let (url, _server) = mock_server(vec![(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )])
        .await;
        let err = store(url)
            .put(Bytes::from_static(b"x"), "x")
            .await
            .unwrap_err();
        match err {
            BlobError::RemoteRejected(msg) => {
                assert!(msg.contains("chat not found"));
                assert!(!msg.contains("secret"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let (url, _server) = mock_server(vec![(502, "bad gateway")]).await;
        let err = store(url).get("abc").await.unwrap_err();
        assert!(matches!(err, BlobError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn oversized_put_fails_before_any_request() {
        let store = store("http://127.0.0.1:9".into());
        let err = store
            .put(Bytes::from(vec![0u8; 2048]), "big")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::ObjectTooLarge { .. }));
    }

    #[tokio::test]
    async fn delete_is_unsupported() {
        let store = store("http://127.0.0.1:9".into());
        assert!(!store.supports_delete());
        assert!(matches!(
            store.delete("abc").await,
            Err(BlobError::DeleteUnsupported)
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramConfig {
            bot_token: "123:secret".into(),
            chat_id: "1".into(),
            api_url: DEFAULT_API_URL.into(),
            max_object_size: TELEGRAM_MAX_OBJECT_SIZE,
            timeout: Duration::from_secs(1),
        };
        assert!(!format!("{cfg:?}").contains("secret"));
    }
}
