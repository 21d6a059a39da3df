use crate::config::RunConfig;
use crate::href;
use crate::s3::{self, DEFAULT_REGION};
use crate::store::BlobStore;
use anyhow::{anyhow, Result};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, PartialEq)]
pub struct S3Object {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Parses virtual-hosted S3 URLs, with or without a region in the host.
    pub fn from_url(url: &str) -> Result<Self> {
        let re = Regex::new(
            r"^https?://(?<bucket>[\w.-]+?)\.s3(?:[.-](?<region>[\w-]+))?\.amazonaws\.com/(?<key>.+)$",
        )
        .expect("Regex pattern should always compile");

        let captures = re
            .captures(url)
            .ok_or(anyhow!("No regex matches found for: {}", url))?;

        let region = captures
            .name("region")
            .map_or(DEFAULT_REGION, |m| m.as_str());

        Ok(Self {
            region: region.to_string(),
            bucket: captures["bucket"].to_string(),
            key: captures["key"].to_string(),
        })
    }
}

/// Store backed by one S3 bucket for listing. Reads and writes dispatch on
/// the href: `http*` URLs go over the network, anything else is a local path.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    pub async fn from_config(config: &RunConfig) -> Self {
        let client = match &config.profile {
            Some(profile) => s3::client_from_profile(profile, &config.region).await,
            None => s3::anon_client(&config.region).await,
        };
        Self::new(client, &config.bucket)
    }

    /// Region to use for `object` when it differs from the client's own.
    fn region_override(&self, object: &S3Object) -> Option<Region> {
        let current = self.client.config().region().map(|region| region.as_ref());
        (current != Some(object.region.as_str())).then(|| Region::new(object.region.clone()))
    }

    fn client_for(&self, object: &S3Object) -> Client {
        match self.region_override(object) {
            Some(region) => {
                debug!(bucket = %object.bucket, %region, "using regional client");
                Client::from_conf(self.client.config().to_builder().region(region).build())
            }
            None => self.client.clone(),
        }
    }
}

fn local_path(href: &str) -> PathBuf {
    Url::parse(href)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(href))
}

impl BlobStore for S3Store {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = vec![];
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
        }
        info!(bucket = %self.bucket, prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn read(&self, href: &str) -> Result<String> {
        debug!(href, "reading");
        if href::is_http(href) {
            let text = reqwest::get(href).await?.error_for_status()?.text().await?;
            return Ok(text);
        }
        Ok(fs::read_to_string(local_path(href))?)
    }

    async fn write(&self, href: &str, text: &str, content_type: &str) -> Result<()> {
        if href::is_http(href) {
            let object = S3Object::from_url(href)?;
            self.client_for(&object)
                .put_object()
                .bucket(&object.bucket)
                .key(&object.key)
                .body(ByteStream::from(text.as_bytes().to_vec()))
                .content_type(content_type)
                .send()
                .await?;
        } else {
            let path = local_path(href);
            if let Some(parent_dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(parent_dir)?;
            }
            fs::write(&path, text)?;
        }
        info!(href, "written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_object_from_regional_url() {
        let url = "https://globalnightlight.s3.us-west-2.amazonaws.com/npp_202008/SVDNB_npp_d20200801_t0048355_e0054159_b45395_c20200801045415683718_noaa_ops.rade9.co.tif";
        let object = S3Object::from_url(url).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "globalnightlight".to_string(),
                region: "us-west-2".to_string(),
                key: "npp_202008/SVDNB_npp_d20200801_t0048355_e0054159_b45395_c20200801045415683718_noaa_ops.rade9.co.tif"
                    .to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_write_uses_the_object_region() {
        let store = S3Store::new(s3::anon_client(DEFAULT_REGION).await, "globalnightlight");
        let global = S3Object::from_url("https://globalnightlight.s3.amazonaws.com/npp_202008/catalog.json").unwrap();
        assert_eq!(store.region_override(&global), None);

        let regional =
            S3Object::from_url("https://globalnightlight.s3.us-west-2.amazonaws.com/npp_202008/catalog.json").unwrap();
        assert_eq!(store.region_override(&regional), Some(Region::new("us-west-2")));
        let client = store.client_for(&regional);
        assert_eq!(client.config().region().map(|region| region.as_ref()), Some("us-west-2"));
    }

    #[test]
    fn test_s3_object_from_global_url() {
        let url = "https://globalnightlight.s3.amazonaws.com/npp_202008/npp_d20200801_t0048355_e0054159_b45395.json";
        let object = S3Object::from_url(url).unwrap();
        assert_eq!(
            object,
            S3Object {
                bucket: "globalnightlight".to_string(),
                region: "us-east-1".to_string(),
                key: "npp_202008/npp_d20200801_t0048355_e0054159_b45395.json".to_string()
            }
        );
        assert!(S3Object::from_url("https://example.com/catalog.json").is_err());
    }

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("/tmp/a/catalog.json"), PathBuf::from("/tmp/a/catalog.json"));
        assert_eq!(local_path("file:///tmp/a/catalog.json"), PathBuf::from("/tmp/a/catalog.json"));
    }
}
