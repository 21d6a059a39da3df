//! The storage boundary: listing, reading and writing documents.
use crate::href;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::info;

pub trait BlobStore {
    /// Keys of all objects under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn read(&self, href: &str) -> Result<String>;

    async fn write(&self, href: &str, text: &str, content_type: &str) -> Result<()>;
}

/// Map-backed store. Objects are addressed by href; `list` reports them as
/// keys relative to `base`.
pub struct MemoryStore {
    base: String,
    objects: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// Adds an object by key, as a listing would report it.
    pub fn insert_key(&self, key: &str, text: &str) -> Result<()> {
        let href = href::join(&self.base, key)?;
        self.insert(&href, text)
    }

    pub fn insert(&self, href: &str, text: &str) -> Result<()> {
        self.objects
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(href.to_string(), text.to_string());
        Ok(())
    }

    pub fn get(&self, href: &str) -> Option<String> {
        self.objects.lock().ok()?.get(href).cloned()
    }

    pub fn hrefs(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl BlobStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let base = format!("{}/", self.base);
        let keys = self
            .hrefs()
            .into_iter()
            .filter_map(|href| href.strip_prefix(&base).map(str::to_string))
            .filter(|key| key.starts_with(prefix))
            .collect();
        Ok(keys)
    }

    async fn read(&self, href: &str) -> Result<String> {
        self.get(href).ok_or(anyhow!("No object at: {}", href))
    }

    async fn write(&self, href: &str, text: &str, _content_type: &str) -> Result<()> {
        self.insert(href, text)
    }
}

/// Passes reads through and prints writes to stdout instead of storing them.
pub struct DryRun<S> {
    inner: S,
}

impl<S: BlobStore> DryRun<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: BlobStore> BlobStore for DryRun<S> {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn read(&self, href: &str) -> Result<String> {
        self.inner.read(href).await
    }

    async fn write(&self, href: &str, text: &str, content_type: &str) -> Result<()> {
        info!(href, content_type, "dry run, not writing");
        println!("{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://globalnightlight.s3.amazonaws.com";

    #[tokio::test]
    async fn test_memory_store_list_and_read() {
        let store = MemoryStore::new(BASE);
        store.insert_key("npp_202008/a.json", "{}").unwrap();
        store.insert_key("npp_202009/b.json", "{}").unwrap();
        store.insert("/local/c.json", "{}").unwrap();

        let keys = store.list("npp_202008").await.unwrap();
        assert_eq!(keys, vec!["npp_202008/a.json"]);

        let text = store
            .read("https://globalnightlight.s3.amazonaws.com/npp_202009/b.json")
            .await
            .unwrap();
        assert_eq!(text, "{}");
        assert!(store.read("https://globalnightlight.s3.amazonaws.com/missing.json").await.is_err());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let store = DryRun::new(MemoryStore::new(BASE));
        store.write("/out/catalog.json", "{}", "application/json").await.unwrap();
        assert!(store.inner.get("/out/catalog.json").is_none());
    }
}
