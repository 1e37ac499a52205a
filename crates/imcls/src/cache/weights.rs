//! # Pretrained Weight Sources
//!
//! The `pretrained` fields of the model configs name a weights record either
//! by local path or by `http(s)` URL. URLs are read through the
//! [`DiskCacheConfig`] cache; local paths are used as-is.

use crate::cache::disk::DiskCacheConfig;
use anyhow::{Context, bail};
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
    match name {
        Some(n) => format!("{n}-{hash}-{base_name}"),
        None => format!("{hash}-{base_name}"),
    }
}

/// Get the cache resource key for a pretrained weights file.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Where a `pretrained` field points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PretrainedSource {
    /// A weights record on the local filesystem.
    Local(PathBuf),

    /// A weights record to download through the cache.
    Remote(String),
}

impl PretrainedSource {
    /// Classify a `pretrained` field value.
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Remote(value.to_string())
        } else {
            Self::Local(PathBuf::from(value))
        }
    }

    /// Resolve to a local weights file.
    ///
    /// # Arguments
    ///
    /// - `name`: the module the weights are for; prefixes the cache key.
    /// - `disk_cache`: the cache used for remote sources.
    pub fn resolve(
        &self,
        name: &str,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        match self {
            Self::Local(path) => {
                if !record_exists(path) {
                    bail!("pretrained weights not found: {}", path.display());
                }
                Ok(path.clone())
            }
            Self::Remote(url) => {
                let cache_key = url_to_cache_key(Some(name), url);
                let resource = pretrained_weights_resource_key(&cache_key);
                disk_cache
                    .fetch_resource(url, &resource)
                    .with_context(|| format!("fetching pretrained weights for `{name}`"))
            }
        }
    }
}

/// Burn file recorders accept the path with or without the record extension.
fn record_exists(path: &std::path::Path) -> bool {
    path.exists() || path.with_extension("mpk").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            PretrainedSource::parse("https://example.com/w/vit.mpk"),
            PretrainedSource::Remote("https://example.com/w/vit.mpk".to_string())
        );
        assert_eq!(
            PretrainedSource::parse("weights/vit"),
            PretrainedSource::Local(PathBuf::from("weights/vit"))
        );
    }

    #[test]
    fn test_url_to_cache_key() {
        let url = "https://example.com/weights/extractor-1234.mpk";
        let hash = X25.checksum(url.as_bytes()).to_string();

        assert_eq!(
            url_to_cache_key(Some("extractor"), url),
            format!("extractor-{hash}-extractor-1234.mpk")
        );
        assert_eq!(
            url_to_cache_key(None, url),
            format!("{hash}-extractor-1234.mpk")
        );
    }

    #[test]
    fn test_resolve_local() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::default();

        let missing = PretrainedSource::Local(dir.path().join("missing"));
        assert!(missing.resolve("model", &cache).is_err());

        std::fs::write(dir.path().join("present.mpk"), b"").unwrap();
        let present = PretrainedSource::Local(dir.path().join("present"));
        assert_eq!(
            present.resolve("model", &cache).unwrap(),
            dir.path().join("present")
        );
    }

    #[test]
    fn test_resolve_remote_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCacheConfig::new().with_cache_root(Some(dir.path().to_path_buf()));
        let url = "https://invalid.example/vit.mpk";

        let resource = pretrained_weights_resource_key(&url_to_cache_key(Some("vit"), url));
        let cached = cache.ensure_resource_parent_dir(&resource).unwrap();
        std::fs::write(&cached, b"weights").unwrap();

        let source = PretrainedSource::parse(url);
        assert_eq!(source.resolve("vit", &cache).unwrap(), cached);
    }
}
