//! HTTP access to the mod and platform servers
//!
//! Two blocking clients share one base URL: a short-timeout one for JSON
//! and status requests, and a long-timeout one for archive downloads, which
//! can run for a long time on large payloads.

use crate::config::Config;
use crate::model::{ArchiveLocator, PackageDescriptor};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Read size for streamed downloads.
pub const DOWNLOAD_CHUNK_SIZE: usize = 81920;

pub struct ServerClient {
    base_url: String,
    client: reqwest::blocking::Client,
    download_client: reqwest::blocking::Client,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>, fetch_timeout: Duration, download_timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        // reject garbage early so every later URL join is known to work
        Url::parse(&base_url)?;

        let user_agent = format!("modsync/{}", env!("CARGO_PKG_VERSION"));

        Ok(Self {
            base_url,
            client: reqwest::blocking::Client::builder()
                .timeout(fetch_timeout)
                .user_agent(user_agent.clone())
                .build()?,
            download_client: reqwest::blocking::Client::builder()
                .timeout(download_timeout)
                .user_agent(user_agent)
                .build()?,
        })
    }

    /// Client for the mod server
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.base_url(), config.fetch_timeout(), config.download_timeout())
    }

    /// Client for the platform server
    pub fn platform_from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.platform_base_url(),
            config.fetch_timeout(),
            config.download_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/{segment}/{segment}...`, each segment percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> String {
        join_segments(&self.base_url, segments)
    }

    /// Resolve `reference` against the base URL; absolute URLs pass through.
    pub fn resolve(&self, reference: &str) -> Result<String> {
        resolve_against(&self.base_url, reference)
    }

    /// Where the archive for `descriptor` is downloaded from
    pub fn archive_url(&self, descriptor: &PackageDescriptor) -> Result<String> {
        archive_url_on(&self.base_url, descriptor)
    }

    fn send(&self, client: &reqwest::blocking::Client, url: &str) -> Result<reqwest::blocking::Response> {
        let response = client.get(url).send().map_err(|e| {
            if e.is_connect() {
                tracing::debug!("Cannot connect to {}: {}", url, e);
            } else if e.is_timeout() {
                tracing::debug!("Request to {} timed out", url);
            }
            Error::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    /// GET `url` and return the body as text
    pub fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(&self.client, url)?;
        Ok(response.text()?)
    }

    /// GET `url` and deserialize the JSON body
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Stream `url` into `dest`, reporting `(downloaded, total)` after each chunk.
    ///
    /// `total` is `None` when the server sends no content length.
    pub fn download_to<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>),
    {
        let mut response = self.send(&self.download_client, url)?;
        let total = response.content_length().filter(|len| *len > 0);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(dest)?;

        let mut buffer = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut downloaded: u64 = 0;

        loop {
            let read = response.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])?;
            downloaded += read as u64;
            on_progress(downloaded, total);
        }

        file.flush()?;
        tracing::debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(downloaded)
    }
}

pub fn join_segments(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

pub fn resolve_against(base: &str, reference: &str) -> Result<String> {
    let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
    Ok(base.join(reference)?.to_string())
}

/// Archive URL for `descriptor` as served by the server at `base`
pub fn archive_url_on(base: &str, descriptor: &PackageDescriptor) -> Result<String> {
    match &descriptor.archive {
        Some(ArchiveLocator::Url(url)) => resolve_against(base, url),
        _ => Ok(join_segments(base, &["mods", &descriptor.name])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PackagingKind;
    use tempfile::TempDir;

    fn client(base: &str) -> ServerClient {
        ServerClient::new(base, Duration::from_secs(2), Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_base() {
        let result = ServerClient::new("not a url", Duration::from_secs(1), Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let c = client("http://127.0.0.1:25569/");
        assert_eq!(
            c.endpoint(&["mods", "My Mod"]),
            "http://127.0.0.1:25569/mods/My%20Mod"
        );
    }

    #[test]
    fn test_archive_url() {
        let c = client("http://host:1");
        let by_name = PackageDescriptor::new("Radar", "1", PackagingKind::SingleFile)
            .with_archive(ArchiveLocator::FileName("Radar.zip".to_string()));
        assert_eq!(c.archive_url(&by_name).unwrap(), "http://host:1/mods/Radar");

        let relative = PackageDescriptor::new("Radar", "1", PackagingKind::SingleFile)
            .with_archive(ArchiveLocator::Url("files/radar-1.zip".to_string()));
        assert_eq!(
            c.archive_url(&relative).unwrap(),
            "http://host:1/files/radar-1.zip"
        );

        let absolute = PackageDescriptor::new("Radar", "1", PackagingKind::SingleFile)
            .with_archive(ArchiveLocator::Url("https://cdn.example/r.zip".to_string()));
        assert_eq!(c.archive_url(&absolute).unwrap(), "https://cdn.example/r.zip");
    }

    #[test]
    fn test_get_json_and_status_errors() {
        let mut server = mockito::Server::new();
        let _ok = server
            .mock("GET", "/list.json")
            .with_status(200)
            .with_body(r#"[1,2,3]"#)
            .create();
        let _missing = server.mock("GET", "/gone").with_status(404).create();

        let c = client(&server.url());
        let values: Vec<u32> = c.get_json(&c.endpoint(&["list.json"])).unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        match c.get_text(&c.endpoint(&["gone"])) {
            Err(Error::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_download_to_reports_progress() {
        let body = vec![7u8; DOWNLOAD_CHUNK_SIZE * 3 + 17];
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/blob")
            .with_status(200)
            .with_body(body.clone())
            .create();

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested").join("blob.bin");
        let c = client(&server.url());

        let mut last = (0, None);
        let written = c
            .download_to(&c.endpoint(&["blob"]), &dest, |done, total| last = (done, total))
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(last.0, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }
}
