//! Runs of the two batch jobs: building one Item per segment of a listing
//! prefix, and rebasing an existing catalog tree.
use crate::asset::AssetFactory;
use crate::catalog::{CatalogTree, LinkRebaser, RebaseReport};
use crate::config::RunConfig;
use crate::error::{CatalogError, Result};
use crate::filename::{self, SegmentKey};
use crate::href;
use crate::item::{ItemBuilder, ItemLocation};
use crate::segment::{self, Grouping};
use crate::stac_operations::{TemplateItem, JSON};
use crate::store::BlobStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SegmentTask {
    pub segment: SegmentKey,
    /// Paths relative to the plan's segment root, in sorted order.
    pub files: Vec<String>,
}

impl SegmentTask {
    /// The first `.json` object of the group.
    pub fn template_file(&self) -> Option<&str> {
        self.files
            .iter()
            .map(String::as_str)
            .find(|file| filename::extension(file) == Some("json"))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub prefix: String,
    pub segment_root: String,
    pub catalog_root: String,
    pub segments: Vec<SegmentTask>,
    pub unassigned: Vec<String>,
}

impl SegmentPlan {
    pub fn new(prefix: &str, config: &RunConfig, grouping: Grouping) -> Result<Self> {
        let prefix = prefix.trim_matches('/');
        let location = config.item_location(prefix)?;
        let dir = format!("{prefix}/");
        let relative = |key: String| match key.strip_prefix(&dir) {
            Some(rest) => rest.to_string(),
            None => filename::basename(&key).to_string(),
        };

        let segments = grouping
            .segments
            .into_iter()
            .map(|(segment, keys)| SegmentTask {
                segment,
                files: keys.into_iter().map(&relative).collect(),
            })
            .collect();

        Ok(Self {
            prefix: prefix.to_string(),
            segment_root: location.segment_root,
            catalog_root: location.catalog_root,
            segments,
            unassigned: grouping.unassigned.into_iter().collect(),
        })
    }

    /// Lists `prefix` and groups the keys by segment.
    pub async fn from_listing(store: &impl BlobStore, config: &RunConfig, prefix: &str) -> Result<Self> {
        let keys = store.list(prefix.trim_matches('/')).await?;
        let grouping = segment::group(&keys);
        info!(
            prefix,
            keys = keys.len(),
            segments = grouping.segments.len(),
            unassigned = grouping.unassigned.len(),
            "grouped listing"
        );
        Self::new(prefix, config, grouping)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn location(&self) -> ItemLocation {
        ItemLocation {
            segment_root: self.segment_root.clone(),
            catalog_root: self.catalog_root.clone(),
        }
    }

    /// Builds and writes the Item of every segment. A failing segment is
    /// recorded in the report and does not stop the others.
    pub async fn execute(&self, store: &impl BlobStore) -> RunReport {
        let location = self.location();
        let mut report = RunReport {
            unassigned: self.unassigned.clone(),
            ..RunReport::default()
        };

        for task in &self.segments {
            match self.publish(store, &location, task).await {
                Ok(href) => report.written.push(href),
                Err(error) => {
                    warn!(segment = %task.segment, %error, "segment failed");
                    report.failed.push(SegmentFailure {
                        segment: task.segment.clone(),
                        error,
                    });
                }
            }
        }
        report
    }

    async fn publish(&self, store: &impl BlobStore, location: &ItemLocation, task: &SegmentTask) -> Result<String> {
        let template_file = task.template_file().ok_or_else(|| CatalogError::MissingTemplate {
            segment: task.segment.to_string(),
            reason: "no .json object in segment".to_string(),
        })?;
        let template_href = href::join(&self.segment_root, template_file)?;
        let template = TemplateItem::from_json(&store.read(&template_href).await?)?;

        let assets = AssetFactory::new(&self.segment_root).build(&task.segment, &task.files)?;
        let item = ItemBuilder::new(location).build(&task.segment, assets, Some(&template))?;

        let item_href = location.item_href(&task.segment)?;
        store
            .write(&item_href, &serde_json::to_string_pretty(&item)?, JSON)
            .await?;
        Ok(item_href)
    }
}

#[derive(Debug)]
pub struct SegmentFailure {
    pub segment: SegmentKey,
    pub error: CatalogError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub written: Vec<String>,
    pub unassigned: Vec<String>,
    pub failed: Vec<SegmentFailure>,
}

impl RunReport {
    pub fn log_summary(&self) {
        info!(
            written = self.written.len(),
            unassigned = self.unassigned.len(),
            failed = self.failed.len(),
            "item run finished"
        );
        for failure in &self.failed {
            warn!(segment = %failure.segment, error = %failure.error, "not published");
        }
    }
}

/// Reads the tree at `source` and writes it again under `new_root`.
pub async fn rebase_catalog(
    store: &impl BlobStore,
    source: &str,
    new_root: &str,
    config: &RunConfig,
) -> Result<RebaseReport> {
    let tree = CatalogTree::read(store, source).await?;
    let unreadable = tree.unreadable.len();
    let rebase = LinkRebaser::new(new_root, &config.root_catalog).rebase(&tree);
    let report = rebase.persist(store).await?;
    info!(
        root = %report.root_href,
        attached = report.attached.len(),
        unresolved = report.unresolved.len(),
        failed = report.failed.len(),
        unreadable,
        "rebase finished"
    );
    Ok(report)
}
