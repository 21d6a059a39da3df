use crate::asset::{self, AssetRole};
use crate::error::{CatalogError, Result};
use crate::filename::SegmentKey;
use crate::href;
use crate::stac_operations::{self, TemplateItem, EO_EXTENSION};
use stac::{Asset, Fields, Item, Links};
use std::collections::BTreeMap;

/// Ground sample distance of VIIRS DNB, in metres.
pub const GSD: f64 = 750.0;
pub const PLATFORM: &str = "s-npp";
pub const INSTRUMENTS: [&str; 1] = ["viirs"];

/// Where the items of one listing prefix are published.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemLocation {
    /// Directory holding the segment files and the item documents.
    pub segment_root: String,
    /// Directory holding the top-level catalog.
    pub catalog_root: String,
}

impl ItemLocation {
    pub fn item_href(&self, segment: &SegmentKey) -> Result<String> {
        Ok(href::join(&self.segment_root, &format!("{segment}.json"))?)
    }
}

pub struct ItemBuilder<'a> {
    location: &'a ItemLocation,
}

impl<'a> ItemBuilder<'a> {
    pub fn new(location: &'a ItemLocation) -> Self {
        Self { location }
    }

    /// Assembles and validates the item for `segment`. Geometry is never
    /// computed here; it comes from `template`.
    pub fn build(
        &self,
        segment: &SegmentKey,
        assets: BTreeMap<String, Asset>,
        template: Option<&TemplateItem>,
    ) -> Result<Item> {
        let missing = |reason: &str| CatalogError::MissingTemplate {
            segment: segment.to_string(),
            reason: reason.to_string(),
        };
        let template = template.ok_or_else(|| missing("no template item supplied"))?;
        let bbox = template
            .bbox()
            .ok_or_else(|| missing(&format!("template {} has no bbox", template.id)))??;
        let geometry = template
            .geometry
            .clone()
            .ok_or_else(|| missing(&format!("template {} has no geometry", template.id)))?;

        let start = segment.start_datetime()?;
        let end = segment.end_datetime()?;

        let mut item = Item::new(segment);
        item.bbox = Some(bbox);
        item.geometry = serde_json::from_value(geometry)?;
        item.properties.datetime = Some(start);
        item.properties.start_datetime = Some(start);
        item.properties.end_datetime = Some(end);
        let _ = item.set_field("gsd", GSD)?;
        let _ = item.set_field("platform", PLATFORM)?;
        let _ = item.set_field("instruments", INSTRUMENTS)?;

        if assets.values().any(asset::has_eo_bands) {
            item.extensions.push(EO_EXTENSION.to_string());
        }
        item.assets.extend(assets);

        stac_operations::set_structural_links(
            &mut item,
            &self.location.item_href(segment)?,
            &href::join(&self.location.catalog_root, "catalog.json")?,
            Some(&href::join(&self.location.segment_root, "catalog.json")?),
        );

        validate(&item)?;
        Ok(item)
    }
}

pub fn validate(item: &Item) -> Result<()> {
    let id = item.id.as_str();
    if id.is_empty() {
        return Err(CatalogError::validation(id, "item id is empty"));
    }
    let properties = &item.properties;
    if let (Some(start), Some(end)) = (properties.start_datetime, properties.end_datetime) {
        if start > end {
            return Err(CatalogError::validation(
                id,
                format!("end_datetime {end} precedes start_datetime {start}"),
            ));
        }
    } else {
        return Err(CatalogError::validation(id, "missing start_datetime or end_datetime"));
    }
    if !item.bbox.is_some_and(|bbox| bbox.is_valid()) {
        return Err(CatalogError::validation(id, "missing or inverted bbox"));
    }
    if item.geometry.is_none() {
        return Err(CatalogError::validation(id, "missing geometry"));
    }
    if !item.assets.contains_key(AssetRole::QualityFlag.key()) {
        return Err(CatalogError::validation(id, "missing VFLAG asset"));
    }
    if let Some((key, _)) = item.assets.iter().find(|(_, asset)| asset.href.is_empty()) {
        return Err(CatalogError::validation(id, format!("asset '{key}' has no href")));
    }
    stac_operations::check_structural_links(id, item)
}

pub fn self_href(item: &Item) -> Option<&str> {
    item.self_link().map(|link| link.href.as_str())
}
