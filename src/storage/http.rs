//! HTTP client for the sync API
//!
//! Every API call is a JSON POST carrying the session token. Responses use a
//! `{code, msg, data}` envelope that is decoded into typed structs here, so
//! callers never see untyped JSON.

use super::{CloudClient, SyncDirListing, UploadToken, WorkspaceSyncMeta};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::parse_index;
use crate::types::Index;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

const ROUTE_FILE_LIST_URL: &str = "/api/sync/file-list-url";
const ROUTE_UPLOAD_TOKEN: &str = "/api/sync/upload-token";
const ROUTE_FILE_URL: &str = "/api/sync/file-url";
const ROUTE_REMOVE_FILES: &str = "/api/sync/remove-files";
const ROUTE_LIST_DIRS: &str = "/api/sync/dirs";
const ROUTE_CREATE_DIR: &str = "/api/sync/create-dir";
const ROUTE_REMOVE_DIR: &str = "/api/sync/remove-dir";
const ROUTE_SYNC_VERSION: &str = "/api/sync/workspace-version";
const ROUTE_SYNC_META: &str = "/api/sync/workspace-meta";

const SLOW_VERSION_CALL: Duration = Duration::from_secs(2);
const SLOW_META_CALL: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct UrlData {
    url: String,
}

#[derive(Deserialize)]
struct TokenData {
    token: String,
}

#[derive(Deserialize)]
struct VersionData {
    v: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirRequest<'a> {
    token: &'a str,
    dir_path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadTokenRequest<'a> {
    token: &'a str,
    dir_path: &'a str,
    name: &'a str,
    length: u64,
}

#[derive(Serialize)]
struct FileUrlRequest<'a> {
    token: &'a str,
    path: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveFilesRequest<'a> {
    token: &'a str,
    dir_path: &'a str,
    paths: &'a [String],
}

#[derive(Serialize)]
struct NameRequest<'a> {
    token: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncDirRequest<'a> {
    token: &'a str,
    sync_dir: &'a str,
}

/// reqwest-backed `CloudClient`
#[derive(Clone)]
pub struct HttpCloudClient {
    api: reqwest::Client,
    files: reqwest::Client,
    server: String,
    upload_host: String,
    account_id: String,
    session_token: String,
    index_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpCloudClient {
    /// Build a client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let mut api = reqwest::Client::builder().timeout(config.api_timeout());
        let mut files = reqwest::Client::builder();

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::config(format!("invalid proxy {}: {}", proxy, e)))?;
            api = api.proxy(proxy.clone());
            files = files.proxy(proxy);
        }

        Ok(Self {
            api: api
                .build()
                .map_err(|e| Error::config(format!("building HTTP client: {}", e)))?,
            files: files
                .build()
                .map_err(|e| Error::config(format!("building HTTP client: {}", e)))?,
            server: config.server.trim_end_matches('/').to_string(),
            upload_host: config.upload_host.clone(),
            account_id: config.account_id.clone(),
            session_token: config.session_token.clone(),
            index_timeout: config.short_timeout(),
            upload_timeout: config.long_timeout(),
        })
    }

    /// POST `body` to `route` and unwrap the envelope
    async fn call<B, T>(&self, route: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.server, route);
        let resp = self
            .api
            .post(&url)
            .query(&[("uid", self.account_id.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(route, error = %e, "API request failed");
                Error::connection(format!("cannot reach {}", route), Some(e))
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::auth("session expired, please log in again"));
        }
        if !status.is_success() {
            tracing::error!(route, status = status.as_u16(), "API request rejected");
            return Err(Error::remote(
                i64::from(status.as_u16()),
                format!("{} failed with status {}", route, status),
            ));
        }

        let envelope: Envelope<T> = resp.json().await.map_err(|e| {
            Error::connection(format!("decoding {} response", route), Some(e))
        })?;
        if envelope.code != 0 {
            tracing::error!(route, code = envelope.code, msg = %envelope.msg, "API returned error");
            return Err(Error::remote(envelope.code, envelope.msg));
        }
        Ok(envelope.data)
    }

    async fn post<B, T>(&self, route: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(route, body)
            .await?
            .ok_or_else(|| Error::remote(-1, format!("{} returned no data", route)))
    }

    async fn post_unit<B>(&self, route: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.call::<B, serde::de::IgnoredAny>(route, body).await?;
        Ok(())
    }
}

#[async_trait]
impl CloudClient for HttpCloudClient {
    async fn fetch_remote_index(&self, dir_path: &str) -> Result<Index> {
        let body = DirRequest {
            token: &self.session_token,
            dir_path,
        };
        let data: UrlData = self.post(ROUTE_FILE_LIST_URL, &body).await?;

        match self.fetch_bytes(&data.url, self.index_timeout).await {
            Ok(bytes) => parse_index(&bytes),
            Err(Error::NotFound { .. }) => {
                tracing::info!(dir = %dir_path, "No remote index yet, treating remote as empty");
                Ok(Index::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn request_upload_token(&self, rel_path: &str, dir_path: &str, length: u64) -> Result<UploadToken> {
        let body = UploadTokenRequest {
            token: &self.session_token,
            dir_path,
            name: rel_path,
            length,
        };
        let data: TokenData = self.post(ROUTE_UPLOAD_TOKEN, &body).await?;
        Ok(UploadToken::new(data.token))
    }

    async fn put_object(&self, token: &UploadToken, key: &str, local_path: &Path) -> Result<()> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| Error::io(format!("reading {}", local_path.display()), e))?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string());

        let form = Form::new()
            .text("token", token.as_str().to_string())
            .text("key", key.to_string())
            .part("file", Part::bytes(data).file_name(file_name));

        let resp = self
            .files
            .post(&self.upload_host)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::connection(format!("uploading {}", key), Some(e)))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::auth(format!("upload token for {} rejected", key)));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::transfer(key, format!("upload rejected [{}]: {}", status, detail)));
        }
        Ok(())
    }

    async fn get_object_url(&self, dir_path: &str, rel_path: &str) -> Result<String> {
        let body = FileUrlRequest {
            token: &self.session_token,
            path: format!("{}/{}", dir_path.trim_end_matches('/'), rel_path.trim_start_matches('/')),
        };
        let data: UrlData = self.post(ROUTE_FILE_URL, &body).await?;
        Ok(data.url)
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        let resp = self
            .files
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::connection(format!("fetching {}", url), Some(e)))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                path: url.to_string(),
            });
        }
        if !status.is_success() {
            tracing::error!(url, status = status.as_u16(), "Object fetch rejected");
            return Err(Error::transfer(url, format!("download failed [{}]", status)));
        }

        resp.bytes()
            .await
            .map_err(|e| Error::connection(format!("reading body of {}", url), Some(e)))
    }

    async fn delete_objects(&self, dir_path: &str, rel_paths: &[String]) -> Result<()> {
        if rel_paths.is_empty() {
            return Ok(());
        }
        let body = RemoveFilesRequest {
            token: &self.session_token,
            dir_path,
            paths: rel_paths,
        };
        self.post_unit(ROUTE_REMOVE_FILES, &body).await
    }

    async fn list_sync_directories(&self) -> Result<SyncDirListing> {
        let body = TokenRequest {
            token: &self.session_token,
        };
        let mut listing: SyncDirListing = self.post(ROUTE_LIST_DIRS, &body).await?;
        listing.dirs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn create_sync_directory(&self, name: &str) -> Result<()> {
        let body = NameRequest {
            token: &self.session_token,
            name,
        };
        self.post_unit(ROUTE_CREATE_DIR, &body).await
    }

    async fn remove_sync_directory(&self, dir_path: &str) -> Result<()> {
        let body = DirRequest {
            token: &self.session_token,
            dir_path,
        };
        self.post_unit(ROUTE_REMOVE_DIR, &body).await
    }

    async fn workspace_sync_version(&self, dir_path: &str) -> Result<i64> {
        let start = Instant::now();
        let body = SyncDirRequest {
            token: &self.session_token,
            sync_dir: dir_path,
        };
        let data: VersionData = self.post(ROUTE_SYNC_VERSION, &body).await?;

        let elapsed = start.elapsed();
        if elapsed > SLOW_VERSION_CALL {
            tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Slow sync version lookup");
        }
        Ok(data.v)
    }

    async fn workspace_sync_meta(&self, dir_path: &str) -> Result<WorkspaceSyncMeta> {
        let start = Instant::now();
        let body = SyncDirRequest {
            token: &self.session_token,
            sync_dir: dir_path,
        };
        let meta: WorkspaceSyncMeta = self.post(ROUTE_SYNC_META, &body).await?;

        let elapsed = start.elapsed();
        if elapsed > SLOW_META_CALL {
            tracing::info!(dir = %dir_path, elapsed_ms = elapsed.as_millis() as u64, "Slow sync meta lookup");
        }
        Ok(meta)
    }
}
