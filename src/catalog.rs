//! Relocation of an existing catalog tree onto a new storage root.
//!
//! Each child catalog moves through three stages:
//!
//! 1. unprocessed, as read from the source tree,
//! 2. links rewritten for its new location ([`ChildStage::LinksRewritten`]),
//! 3. written and linked from the new root ([`ChildStage::Attached`]).
//!
//! Documents are only ever written under the new root, and the new root
//! catalog is written last, so an interrupted rebase leaves the source tree
//! untouched and never publishes a root that points at a missing child.
use crate::config::RootCatalog;
use crate::error::{CatalogError, Result};
use crate::href;
use crate::stac_operations::{self, JSON};
use crate::store::BlobStore;
use regex::Regex;
use stac::{Catalog, Link, Links};
use std::fmt;
use tracing::{debug, info, warn};

const CATALOG_FILE: &str = "catalog.json";

/// A new tree root located at `self_href`.
pub fn new_root_catalog(id: &str, description: &str, self_href: &str) -> Catalog {
    let mut catalog = Catalog::new(id, description);
    stac_operations::set_structural_links(&mut catalog, self_href, self_href, None);
    catalog
}

pub fn validate(catalog: &Catalog) -> Result<()> {
    if catalog.id.is_empty() {
        return Err(CatalogError::validation(&catalog.id, "catalog id is empty"));
    }
    stac_operations::check_structural_links(&catalog.id, catalog)
}

/// A catalog together with the href it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChild {
    pub href: String,
    pub catalog: Catalog,
}

#[derive(Debug)]
pub struct UnreadableChild {
    pub href: String,
    pub error: CatalogError,
}

/// A root catalog and its direct children, as found in storage.
#[derive(Debug)]
pub struct CatalogTree {
    pub href: String,
    pub root: Catalog,
    pub children: Vec<SourceChild>,
    pub unreadable: Vec<UnreadableChild>,
}

impl CatalogTree {
    /// Reads the catalog at `href` and each of its `child` links. A child
    /// that cannot be read is recorded and does not stop the others.
    pub async fn read(store: &impl BlobStore, href: &str) -> Result<Self> {
        let root = read_catalog(store, href).await?;
        let mut children = vec![];
        let mut unreadable = vec![];

        for link in root.iter_child_links() {
            let child_href = href::resolve(href, &link.href)?;
            match read_catalog(store, &child_href).await {
                Ok(catalog) => children.push(SourceChild {
                    href: child_href,
                    catalog,
                }),
                Err(error) => {
                    warn!(href = %child_href, %error, "unable to read child catalog");
                    unreadable.push(UnreadableChild {
                        href: child_href,
                        error,
                    });
                }
            }
        }
        info!(href, children = children.len(), "read catalog tree");

        Ok(Self {
            href: href.to_string(),
            root,
            children,
            unreadable,
        })
    }
}

async fn read_catalog(store: &impl BlobStore, href: &str) -> Result<Catalog> {
    Ok(serde_json::from_str(&store.read(href).await?)?)
}

/// The directory a child catalog is moved to, derived from its id.
///
/// Single-satellite catalogs (VIIRS) are keyed by period alone. Catalogs from
/// the multi-satellite era carry a platform marker and are keyed by
/// `{platform}_{period}` so that concurrent satellites do not collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationKey {
    SingleSatellite { period: String },
    PlatformPrefixed { platform: String, period: String },
}

impl RelocationKey {
    pub fn from_catalog_id(id: &str) -> Result<Self> {
        let period_re = Regex::new(r"^\d{4}(\d{2})?$").expect("Regex pattern should always compile");
        let platform_re = Regex::new(r"^(F\d{2}|npp|j01)$").expect("Regex pattern should always compile");
        let unresolved = || CatalogError::UnresolvedRelocationKey(id.to_string());

        let tokens: Vec<&str> = id.split('_').collect();
        let (period, rest) = tokens.split_last().ok_or_else(unresolved)?;
        if !period_re.is_match(period) {
            return Err(unresolved());
        }

        let platforms: Vec<&str> = rest
            .iter()
            .copied()
            .filter(|token| platform_re.is_match(token))
            .collect();
        match platforms.as_slice() {
            [] => Ok(Self::SingleSatellite {
                period: period.to_string(),
            }),
            [platform] => Ok(Self::PlatformPrefixed {
                platform: platform.to_string(),
                period: period.to_string(),
            }),
            _ => Err(unresolved()),
        }
    }
}

impl fmt::Display for RelocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleSatellite { period } => f.write_str(period),
            Self::PlatformPrefixed { platform, period } => write!(f, "{platform}_{period}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStage {
    LinksRewritten,
    Attached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelocatedChild {
    pub key: RelocationKey,
    pub href: String,
    pub catalog: Catalog,
    pub stage: ChildStage,
}

#[derive(Debug)]
pub struct UnresolvedChild {
    pub id: String,
    pub href: String,
    pub error: CatalogError,
}

/// Normalises a directory-relative path. `None` when it is empty or climbs
/// out of the directory.
fn within_dir(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = vec![];
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            _ => parts.push(part),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Path of an item relative to its catalog's directory. Accepts relative
/// links and absolute links under either the old or the new directory, so
/// rewriting an already rebased catalog changes nothing.
fn item_path(target: &str, old_dir: &str, new_dir: &str) -> Option<String> {
    for dir in [new_dir, old_dir].into_iter().filter(|dir| !dir.is_empty()) {
        if let Some(rest) = target.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
            return within_dir(rest);
        }
    }
    if href::is_absolute(target) {
        return None;
    }
    within_dir(target)
}

pub struct LinkRebaser {
    new_root: String,
    root_catalog: RootCatalog,
}

impl LinkRebaser {
    pub fn new(new_root: &str, root_catalog: &RootCatalog) -> Self {
        Self {
            new_root: new_root.trim_end_matches('/').to_string(),
            root_catalog: root_catalog.clone(),
        }
    }

    pub fn root_href(&self) -> String {
        format!("{}/{CATALOG_FILE}", self.new_root)
    }

    /// Rewrites the links of one child for its place under the new root.
    /// Links come out as `self`, `root`, `parent`, the other links in their
    /// original order, then the `item` links in their original order.
    pub fn relocate(&self, child: &SourceChild) -> Result<RelocatedChild> {
        let key = RelocationKey::from_catalog_id(&child.catalog.id)?;
        let old_dir = href::parent(&child.href);
        let new_dir = format!("{}/{key}", self.new_root);
        let self_href = format!("{new_dir}/{CATALOG_FILE}");
        let root_href = self.root_href();

        let mut relocated = child.catalog.clone();
        let mut items = vec![];
        let mut others = vec![];
        for mut link in relocated.links.drain(..) {
            if link.is_item() {
                let path = item_path(&link.href, old_dir, &new_dir).ok_or_else(|| {
                    CatalogError::UnrelocatableItemLink {
                        catalog: child.catalog.id.clone(),
                        href: link.href.clone(),
                    }
                })?;
                link.href = format!("{new_dir}/{path}");
                if link.r#type.is_none() {
                    link.r#type = Some(JSON.to_string());
                }
                items.push(link);
            } else {
                others.push(link);
            }
        }
        relocated.links = others;
        relocated.links.append(&mut items);
        stac_operations::set_structural_links(&mut relocated, &self_href, &root_href, Some(&root_href));

        validate(&relocated)?;
        debug!(id = %relocated.id, %key, "links rewritten");

        Ok(RelocatedChild {
            key,
            href: self_href,
            catalog: relocated,
            stage: ChildStage::LinksRewritten,
        })
    }

    /// Relocates every child of `tree` under a fresh root catalog. Children
    /// that cannot be relocated are reported, never attached.
    pub fn rebase(&self, tree: &CatalogTree) -> Rebase {
        let mut root = new_root_catalog(
            &self.root_catalog.id,
            &self.root_catalog.description,
            &self.root_href(),
        );
        root.title = self.root_catalog.title.clone();

        let mut children = vec![];
        let mut unresolved = vec![];
        for child in &tree.children {
            match self.relocate(child) {
                Ok(relocated) => children.push(relocated),
                Err(error) => {
                    warn!(id = %child.catalog.id, href = %child.href, %error, "child catalog skipped");
                    unresolved.push(UnresolvedChild {
                        id: child.catalog.id.clone(),
                        href: child.href.clone(),
                        error,
                    });
                }
            }
        }

        Rebase {
            root,
            children,
            unresolved,
        }
    }
}

#[derive(Debug)]
pub struct Rebase {
    pub root: Catalog,
    pub children: Vec<RelocatedChild>,
    pub unresolved: Vec<UnresolvedChild>,
}

#[derive(Debug)]
pub struct RebaseReport {
    pub root_href: String,
    pub attached: Vec<String>,
    pub unresolved: Vec<UnresolvedChild>,
    pub failed: Vec<UnreadableChild>,
}

impl Rebase {
    /// Links child `index` from the new root. Attaching twice is a no-op.
    pub fn attach(&mut self, index: usize) {
        let Some(child) = self.children.get_mut(index) else {
            return;
        };
        if child.stage == ChildStage::Attached {
            return;
        }
        self.root
            .links
            .push(Link::child(&child.href).title(child.catalog.title.clone()));
        child.stage = ChildStage::Attached;
    }

    pub fn attach_all(&mut self) {
        for index in 0..self.children.len() {
            self.attach(index);
        }
    }

    /// Writes every child, attaches the ones that were written and finally
    /// writes the new root.
    pub async fn persist(mut self, store: &impl BlobStore) -> Result<RebaseReport> {
        let mut failed = vec![];
        for index in 0..self.children.len() {
            let child = &self.children[index];
            let href = child.href.clone();
            let text = serde_json::to_string_pretty(&child.catalog)?;
            match store.write(&href, &text, JSON).await {
                Ok(()) => self.attach(index),
                Err(error) => {
                    warn!(%href, %error, "child catalog not written");
                    failed.push(UnreadableChild {
                        href,
                        error: CatalogError::Store(error),
                    });
                }
            }
        }

        validate(&self.root)?;
        let root_href = self
            .root
            .self_link()
            .map(|link| link.href.clone())
            .unwrap_or_default();
        store
            .write(&root_href, &serde_json::to_string_pretty(&self.root)?, JSON)
            .await?;
        info!(href = %root_href, children = self.children.len() - failed.len(), "root catalog written");

        let attached = self
            .children
            .into_iter()
            .filter(|child| child.stage == ChildStage::Attached)
            .map(|child| child.href)
            .collect();
        Ok(RebaseReport {
            root_href,
            attached,
            unresolved: self.unresolved,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const OLD_ROOT: &str = "https://globalnightlight.s3.amazonaws.com";
    const NEW_ROOT: &str = "/data/nightlights";

    fn root_catalog() -> RootCatalog {
        RootCatalog {
            id: "nighttime_visible_radiance_1992-2020".to_string(),
            description: "Nightly visible radiance catalogues.".to_string(),
            title: None,
        }
    }

    fn viirs_child() -> SourceChild {
        let text = r#"{
            "type": "Catalog",
            "stac_version": "1.0.0",
            "id": "VIIRS_DNB_rade9_201204",
            "description": "VIIRS DNB radiance, April 2012",
            "links": [
                {"rel": "root", "href": "../VIIRS_npp_catalog.json", "type": "application/json"},
                {"rel": "parent", "href": "../VIIRS_npp_catalog.json", "type": "application/json"},
                {"rel": "item", "href": "./npp_d20120401_t0012345_e0018149_b02342.json", "type": "application/json"},
                {"rel": "license", "href": "https://example.com/license"},
                {"rel": "item", "href": "./npp_d20120401_t0018161_e0023565_b02342.json"},
                {"rel": "self", "href": "https://globalnightlight.s3.amazonaws.com/201204/VIIRS_npp_catalog.json"}
            ],
            "keywords": ["nightlights"]
        }"#;
        SourceChild {
            href: format!("{OLD_ROOT}/201204/VIIRS_npp_catalog.json"),
            catalog: serde_json::from_str(text).unwrap(),
        }
    }

    fn hrefs(catalog: &Catalog) -> Vec<(String, String)> {
        catalog
            .links
            .iter()
            .map(|l| (l.rel.clone(), l.href.clone()))
            .collect()
    }

    #[test]
    fn test_relocation_keys() {
        assert_eq!(
            RelocationKey::from_catalog_id("VIIRS_DNB_rade9_201204").unwrap().to_string(),
            "201204"
        );
        assert_eq!(
            RelocationKey::from_catalog_id("DMSP_F12_OLS_199503").unwrap(),
            RelocationKey::PlatformPrefixed {
                platform: "F12".to_string(),
                period: "199503".to_string()
            }
        );
        assert_eq!(
            RelocationKey::from_catalog_id("DMSP_F12_OLS_199503").unwrap().to_string(),
            "F12_199503"
        );
        assert_eq!(
            RelocationKey::from_catalog_id("DMSP_F10_1992").unwrap().to_string(),
            "F10_1992"
        );
        for id in ["VIIRS_DNB_rade9", "misc", "DMSP_F12_F14_199503", "VIIRS_2012040"] {
            assert!(
                matches!(
                    RelocationKey::from_catalog_id(id),
                    Err(CatalogError::UnresolvedRelocationKey(_))
                ),
                "{id} should not resolve"
            );
        }
    }

    #[test]
    fn test_relocate_viirs_child() {
        let rebaser = LinkRebaser::new(NEW_ROOT, &root_catalog());
        let relocated = rebaser.relocate(&viirs_child()).unwrap();

        assert_eq!(relocated.href, "/data/nightlights/201204/catalog.json");
        assert_eq!(relocated.stage, ChildStage::LinksRewritten);
        let s = |a: &str, b: &str| (a.to_string(), b.to_string());
        assert_eq!(
            hrefs(&relocated.catalog),
            vec![
                s("self", "/data/nightlights/201204/catalog.json"),
                s("root", "/data/nightlights/catalog.json"),
                s("parent", "/data/nightlights/catalog.json"),
                s("license", "https://example.com/license"),
                s("item", "/data/nightlights/201204/npp_d20120401_t0012345_e0018149_b02342.json"),
                s("item", "/data/nightlights/201204/npp_d20120401_t0018161_e0023565_b02342.json"),
            ]
        );
        assert!(relocated.catalog.iter_item_links().all(|link| link.is_json()));
        // Everything but the links is carried over.
        assert_eq!(relocated.catalog.id, "VIIRS_DNB_rade9_201204");
        assert_eq!(relocated.catalog.additional_fields["keywords"][0], "nightlights");
    }

    #[test]
    fn test_relocate_is_idempotent() {
        let rebaser = LinkRebaser::new(NEW_ROOT, &root_catalog());
        let first = rebaser.relocate(&viirs_child()).unwrap();

        let again = SourceChild {
            href: viirs_child().href,
            catalog: first.catalog.clone(),
        };
        let second = rebaser.relocate(&again).unwrap();
        assert_eq!(second.catalog.links, first.catalog.links);
        assert_eq!(
            serde_json::to_string_pretty(&second.catalog).unwrap(),
            serde_json::to_string_pretty(&first.catalog).unwrap()
        );

        // Also when reading the rebased child back from its new location.
        let reread = SourceChild {
            href: first.href.clone(),
            catalog: first.catalog.clone(),
        };
        assert_eq!(rebaser.relocate(&reread).unwrap().catalog.links, first.catalog.links);
    }

    #[test]
    fn test_relocate_rejects_item_links_outside_the_directory() {
        let rebaser = LinkRebaser::new(NEW_ROOT, &root_catalog());
        for target in [
            "https://elsewhere.example.com/201204/x.json",
            "../201205/npp_x.json",
            "./../201205/npp_x.json",
            "./a/../../201205/npp_x.json",
            "https://globalnightlight.s3.amazonaws.com/201204/../201205/npp_x.json",
        ] {
            let mut child = viirs_child();
            child.catalog.links.push(Link::item(target));
            assert!(
                matches!(rebaser.relocate(&child), Err(CatalogError::UnrelocatableItemLink { .. })),
                "{target} should not be relocated"
            );
        }
    }

    #[test]
    fn test_relocate_normalises_item_paths() {
        let rebaser = LinkRebaser::new(NEW_ROOT, &root_catalog());
        let mut child = viirs_child();
        child.catalog.links = vec![Link::item("./granules/../npp_x.json"), Link::item("sub/npp_y.json")];
        let relocated = rebaser.relocate(&child).unwrap();
        let items: Vec<&str> = relocated
            .catalog
            .iter_item_links()
            .map(|link| link.href.as_str())
            .collect();
        assert_eq!(
            items,
            vec![
                "/data/nightlights/201204/npp_x.json",
                "/data/nightlights/201204/sub/npp_y.json"
            ]
        );
    }

    #[test]
    fn test_rebase_skips_unresolved_children() {
        let mut unknown = viirs_child();
        unknown.catalog.id = "VIIRS_DNB_rade9_monthly".to_string();
        let source = format!("{OLD_ROOT}/VIIRS_npp_catalog.json");
        let tree = CatalogTree {
            href: source.clone(),
            root: new_root_catalog("VIIRS_npp", "VIIRS", &source),
            children: vec![viirs_child(), unknown],
            unreadable: vec![],
        };

        let mut rebase = LinkRebaser::new(NEW_ROOT, &root_catalog()).rebase(&tree);
        assert_eq!(rebase.children.len(), 1);
        assert_eq!(rebase.unresolved.len(), 1);
        assert_eq!(rebase.unresolved[0].id, "VIIRS_DNB_rade9_monthly");

        rebase.attach_all();
        rebase.attach_all();
        let children: Vec<&Link> = rebase.root.iter_child_links().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].href, "/data/nightlights/201204/catalog.json");

        // Every node of the new tree agrees on the root.
        let root_href = &rebase.root.self_link().unwrap().href;
        assert_eq!(&rebase.root.root_link().unwrap().href, root_href);
        for child in &rebase.children {
            assert_eq!(&child.catalog.root_link().unwrap().href, root_href);
            assert_eq!(&child.catalog.parent_link().unwrap().href, root_href);
        }
    }

    #[tokio::test]
    async fn test_read_and_persist_tree() {
        let store = MemoryStore::new(OLD_ROOT);
        let source = format!("{OLD_ROOT}/VIIRS_npp_catalog.json");
        let root = r#"{
            "type": "Catalog",
            "stac_version": "1.0.0",
            "id": "VIIRS_npp",
            "description": "VIIRS NPP nightly radiance",
            "links": [
                {"rel": "self", "href": "https://globalnightlight.s3.amazonaws.com/VIIRS_npp_catalog.json"},
                {"rel": "root", "href": "./VIIRS_npp_catalog.json"},
                {"rel": "child", "href": "./201204/VIIRS_npp_catalog.json"},
                {"rel": "child", "href": "/201205/VIIRS_npp_catalog.json"}
            ]
        }"#;
        store.insert(&source, root).unwrap();
        let child = viirs_child();
        store
            .insert(&child.href, &serde_json::to_string(&child.catalog).unwrap())
            .unwrap();

        let tree = CatalogTree::read(&store, &source).await.unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].href, child.href);
        assert_eq!(tree.unreadable.len(), 1);
        assert_eq!(
            tree.unreadable[0].href,
            "https://globalnightlight.s3.amazonaws.com/201205/VIIRS_npp_catalog.json"
        );

        let rebase = LinkRebaser::new(NEW_ROOT, &root_catalog()).rebase(&tree);
        let report = rebase.persist(&store).await.unwrap();
        assert_eq!(report.root_href, "/data/nightlights/catalog.json");
        assert_eq!(report.attached, vec!["/data/nightlights/201204/catalog.json"]);

        let written: Catalog =
            serde_json::from_str(&store.get("/data/nightlights/catalog.json").unwrap()).unwrap();
        assert_eq!(written.id, "nighttime_visible_radiance_1992-2020");
        assert_eq!(written.iter_child_links().count(), 1);
        assert!(store.get("/data/nightlights/201204/catalog.json").is_some());

        // The source tree is untouched.
        assert_eq!(store.get(&source).unwrap(), root);
    }
}
