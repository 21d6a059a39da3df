use crate::error::{CatalogError, Result};
use serde::Deserialize;
use serde_json::Value;
use stac::{Bbox, Link, Links};

pub const EO_EXTENSION: &str = "https://stac-extensions.github.io/eo/v1.0.0/schema.json";

pub const JSON: &str = "application/json";
pub const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
pub const HDF5: &str = "application/x-hdf5";

/// The parts of a previously published item that are reused as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateItem {
    pub id: String,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub geometry: Option<Value>,
}

impl TemplateItem {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The template's bbox, if it has 4 or 6 finite numbers.
    pub fn bbox(&self) -> Option<Result<Bbox>> {
        let values = self.bbox.clone()?;
        if values.iter().any(|v| !v.is_finite()) {
            return Some(Err(CatalogError::validation(&self.id, "bbox holds a non-finite number")));
        }
        Some(Bbox::try_from(values).map_err(CatalogError::from))
    }
}

/// Replaces the navigational links of `document`, keeping every other link
/// in its original order after them.
pub fn set_structural_links(document: &mut impl Links, self_href: &str, root_href: &str, parent_href: Option<&str>) {
    let mut links = vec![Link::self_(self_href), Link::root(root_href)];
    links.extend(parent_href.map(Link::parent));
    links.extend(
        document
            .links_mut()
            .drain(..)
            .filter(|link| !(link.is_self() || link.is_root() || link.is_parent())),
    );
    *document.links_mut() = links;
}

/// Checks the navigational links every document must carry: exactly one
/// `self` and one `root`, and at most one `parent`.
pub(crate) fn check_structural_links(id: &str, document: &impl Links) -> Result<()> {
    let links = document.links();
    for (rel, min, max) in [("self", 1, 1), ("root", 1, 1), ("parent", 0, 1)] {
        let count = links.iter().filter(|link| link.rel == rel).count();
        if count < min || count > max {
            return Err(CatalogError::validation(
                id,
                format!("expected {min}..={max} '{rel}' links, found {count}"),
            ));
        }
    }
    if let Some(link) = links.iter().find(|link| link.href.is_empty()) {
        return Err(CatalogError::validation(id, format!("empty href on '{}' link", link.rel)));
    }
    Ok(())
}
