//! Manifest fetching
//!
//! The manifest is the server's list of packages. Candidate endpoints are
//! tried in order and the first one that yields a non-empty, well-formed list
//! wins; results are never merged across endpoints. Every failure (unreachable
//! host, HTTP error, malformed JSON, empty list) is logged and reported as an
//! empty manifest, which the rest of the pipeline treats as "offline".
//!
//! Archive locators in the winning list are pinned to absolute URLs on the
//! server that answered, so a manifest served by a mirror is also downloaded
//! from that mirror.

use crate::config::Config;
use crate::model::{name_key, names_match, ArchiveLocator, PackageDescriptor};
use crate::server::{archive_url_on, ServerClient};
use crate::Result;
use std::collections::HashSet;

/// Anything that can produce the current manifest.
pub trait ManifestSource {
    /// Current manifest; empty when no endpoint could deliver one.
    fn fetch_manifest(&self) -> Vec<PackageDescriptor>;

    /// Look up one package by name (case-insensitive) in a fresh manifest.
    fn find_package(&self, name: &str) -> Option<PackageDescriptor> {
        self.fetch_manifest()
            .into_iter()
            .find(|d| names_match(&d.name, name))
    }
}

/// One server that may serve the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCandidate {
    /// Server base; archives named by the manifest are fetched from here
    pub base: String,
    pub url: String,
}

impl ManifestCandidate {
    pub fn new(base: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            url: url.into(),
        }
    }
}

pub struct ManifestFetcher<'a> {
    client: &'a ServerClient,
    candidates: Vec<ManifestCandidate>,
}

impl<'a> ManifestFetcher<'a> {
    pub fn new(client: &'a ServerClient, candidates: Vec<ManifestCandidate>) -> Self {
        Self { client, candidates }
    }

    /// Primary server first, then each configured mirror
    pub fn from_config(client: &'a ServerClient, config: &Config) -> Self {
        let candidates = config
            .server_bases()
            .into_iter()
            .zip(config.manifest_candidates())
            .map(|(base, url)| ManifestCandidate::new(base, url))
            .collect();
        Self::new(client, candidates)
    }

    pub fn candidates(&self) -> &[ManifestCandidate] {
        &self.candidates
    }

    fn fetch_from(&self, url: &str) -> Result<Vec<PackageDescriptor>> {
        let list: Option<Vec<PackageDescriptor>> = self.client.get_json(url)?;
        Ok(list.unwrap_or_default())
    }

    /// True when some candidate currently serves a usable manifest.
    pub fn is_reachable(&self) -> bool {
        !self.fetch_manifest().is_empty()
    }
}

impl ManifestSource for ManifestFetcher<'_> {
    fn fetch_manifest(&self) -> Vec<PackageDescriptor> {
        for candidate in &self.candidates {
            match self.fetch_from(&candidate.url) {
                Ok(list) if !list.is_empty() => {
                    tracing::debug!("Manifest from {} lists {} package(s)", candidate.url, list.len());
                    return pin_archives(dedupe_by_name(list), &candidate.base);
                }
                Ok(_) => tracing::warn!("Manifest at {} is empty", candidate.url),
                Err(e) => tracing::warn!("Failed to fetch manifest from {}: {}", candidate.url, e),
            }
        }

        Vec::new()
    }
}

/// Keep the first descriptor for each name (case-insensitive).
pub fn dedupe_by_name(list: Vec<PackageDescriptor>) -> Vec<PackageDescriptor> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|d| {
            let fresh = seen.insert(name_key(&d.name));
            if !fresh {
                tracing::warn!("Manifest lists '{}' more than once; keeping the first", d.name);
            }
            fresh
        })
        .collect()
}

/// Rewrite every archive locator as an absolute URL on `base`.
pub fn pin_archives(list: Vec<PackageDescriptor>, base: &str) -> Vec<PackageDescriptor> {
    list.into_iter()
        .map(|mut descriptor| {
            match archive_url_on(base, &descriptor) {
                Ok(url) => descriptor.archive = Some(ArchiveLocator::Url(url)),
                Err(e) => tracing::warn!("Cannot resolve archive for '{}': {}", descriptor.name, e),
            }
            descriptor
        })
        .collect()
}
