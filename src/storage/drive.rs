//! Google Drive v3 storage client.

use super::{RemoteFile, StorageService};
use crate::auth::{Session, bearer_token};
use crate::constants::drive::{FILES_URL, LIST_FIELDS, PAGE_SIZE};
use crate::error::{Error, Result};
use crate::http::{check_status, read_json, request_error};
use crate::output::progress::{create_download_progress, finish_progress, set_progress_position};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Drive client authenticated by its own session.
#[derive(Debug)]
pub struct DriveClient<S> {
    http: Client,
    session: Mutex<S>,
    files_url: String,
    show_progress: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        Self {
            size: file.size.as_deref().and_then(|s| s.parse().ok()),
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
        }
    }
}

impl<S: Session> DriveClient<S> {
    /// Client for the public Drive API.
    pub fn new(http: Client, session: S, show_progress: bool) -> Self {
        Self {
            http,
            session: Mutex::new(session),
            files_url: FILES_URL.to_string(),
            show_progress,
        }
    }
}

/// Drive search expression for files containing `name` with `mime_type`.
fn search_query(name: &str, mime_type: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name contains '{escaped}' and mimeType='{mime_type}' and trashed=false")
}

impl<S: Session> StorageService for DriveClient<S> {
    async fn connect(&self) -> Result<()> {
        bearer_token(&self.session).await.map(|_| ())
    }

    async fn find(&self, name_pattern: &str, mime_type: &str) -> Result<Vec<RemoteFile>> {
        let query = search_query(name_pattern, mime_type);
        debug!("Drive search: {query}");

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let token = bearer_token(&self.session).await?;
            let mut request = self
                .http
                .get(&self.files_url)
                .bearer_auth(token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", LIST_FIELDS),
                    ("spaces", "drive"),
                ])
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| request_error(&self.files_url, e))?;
            let list: FileList = read_json(response, "Drive").await?;
            files.extend(list.files.into_iter().map(RemoteFile::from));

            match list.next_page_token {
                Some(next) if page_token.as_ref() != Some(&next) => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Drive search matched {} files", files.len());
        Ok(files)
    }

    async fn download(&self, file: &RemoteFile, destination: &Path) -> Result<()> {
        let token = bearer_token(&self.session).await?;
        let url = format!("{}/{}", self.files_url, file.id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::DownloadFailed {
                url: url.clone(),
                source: Box::new(e),
            })?;
        let response = check_status(response).await?;

        let total_size = file.size.or_else(|| response.content_length()).unwrap_or(0);
        let pb = create_download_progress(total_size, &file.name, self.show_progress);

        // Stream download, truncating whatever the previous run left behind
        let mut out = File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::DownloadFailed {
                url: url.clone(),
                source: Box::new(e),
            })?;

            out.write_all(&chunk).await?;

            downloaded += chunk.len() as u64;
            set_progress_position(pb.as_ref(), downloaded);
        }
        out.flush().await?;

        finish_progress(pb, "Download complete");
        debug!("Downloaded {downloaded} bytes from {url}");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_search_query_escapes_quotes() {
        assert_eq!(
            search_query("farmer's field", "image/tiff"),
            "name contains 'farmer\\'s field' and mimeType='image/tiff' and trashed=false"
        );
    }

    #[test]
    fn test_file_list_parses_string_sizes() {
        let list: FileList = serde_json::from_str(
            r#"{"files": [
                {"id": "a", "name": "current_image.tif", "mimeType": "image/tiff", "size": "1024"},
                {"id": "b", "name": "current_image (1).tif", "mimeType": "image/tiff"}
            ]}"#,
        )
        .unwrap();

        let files: Vec<RemoteFile> = list.files.into_iter().map(RemoteFile::from).collect();
        assert_eq!(files[0].size, Some(1024));
        assert_eq!(files[0].mime_type, "image/tiff");
        assert_eq!(files[1].size, None);
    }

    #[test]
    fn test_empty_listing() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[test]
    fn test_file_list_carries_next_page_token() {
        let list: FileList = serde_json::from_str(
            r#"{"nextPageToken": "page-2", "files": [{"id": "a", "name": "current_image.tif"}]}"#,
        )
        .unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(list.files.len(), 1);
    }

    struct StaticSession;

    impl Session for StaticSession {
        async fn acquire(&mut self) -> Result<()> {
            Ok(())
        }

        async fn refresh(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_valid(&self) -> bool {
            true
        }

        fn access_token(&self) -> Option<&str> {
            Some("token")
        }
    }

    /// Serve each listing request with the page its `pageToken` names.
    async fn serve_listing(listener: TcpListener, requests: Arc<StdMutex<Vec<String>>>) {
        const FIRST: &str = r#"{"nextPageToken": "page-2", "files": [
            {"id": "a", "name": "current_image.tif", "mimeType": "image/tiff", "size": "10"}
        ]}"#;
        const SECOND: &str = r#"{"files": [
            {"id": "b", "name": "current_image (1).tif", "mimeType": "image/tiff", "size": "20"}
        ]}"#;

        while let Ok((mut socket, _)) = listener.accept().await {
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    pending.extend_from_slice(&buf[..n]);

                    while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&pending[..end]).into_owned();
                        pending.drain(..end + 4);
                        let line = head.lines().next().unwrap_or_default().to_string();

                        let body = if line.contains("pageToken=page-2") {
                            SECOND
                        } else {
                            FIRST
                        };
                        requests.lock().unwrap().push(line);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
                            body.len()
                        );
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_find_follows_next_page_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let files_url = format!("http://{}/drive/v3/files", listener.local_addr().unwrap());
        let requests = Arc::new(StdMutex::new(Vec::new()));
        let server = tokio::spawn(serve_listing(listener, Arc::clone(&requests)));

        let client = DriveClient {
            http: crate::http::local_client(),
            session: Mutex::new(StaticSession),
            files_url,
            show_progress: false,
        };

        let files = client.find("current_image", "image/tiff").await.unwrap();
        server.abort();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["current_image.tif", "current_image (1).tif"]);
        assert_eq!(files[1].size, Some(20));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|line| line.contains("pageSize=1000")));
        assert!(!requests[0].contains("pageToken"));
        assert!(requests[1].contains("pageToken=page-2"));
    }
}
