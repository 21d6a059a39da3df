use crate::href;
use crate::item::ItemLocation;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use toml;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub bucket: String,
    pub region: String,
    /// AWS profile used for writes. Without one the client is anonymous.
    #[serde(default)]
    pub profile: Option<String>,
    /// Location of the global `catalog.json`.
    pub catalog_root: String,
    pub root_catalog: RootCatalog,
}

/// Identity of the top-level catalog created by a rebase.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RootCatalog {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub title: Option<String>,
}

pub fn run_config_toml() -> toml::Table {
    toml::toml! {
        bucket = "globalnightlight"

        region = "us-east-1"

        catalog_root = "https://globalnightlight.s3.amazonaws.com"

        [root_catalog]
        id = "nighttime_visible_radiance_1992-2020"
        description = "Nightly visible radiance catalogues from DMSP-OLS (1992-2017, various satellites) and VIIRS NPP (2012-2020)."
    }
}

impl RunConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())?;
        Ok(config)
    }

    /// Where the granules and items of `prefix` live.
    pub fn item_location(&self, prefix: &str) -> Result<ItemLocation> {
        Ok(ItemLocation {
            segment_root: href::join(&self.catalog_root, prefix.trim_matches('/'))?,
            catalog_root: self.catalog_root.trim_end_matches('/').to_string(),
        })
    }
}
