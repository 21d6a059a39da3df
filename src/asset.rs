//! Classification of a segment's files into item assets.
use crate::error::Result;
use crate::filename::{self, FilenameFields, SegmentKey};
use crate::href;
use crate::stac_operations::{COG, HDF5};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use stac::{Asset, Fields};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The quality-flag mask is never listed with the granules; its name is
/// derived from the segment key.
pub const VFLAG_SUFFIX: &str = ".co.tif";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetRole {
    /// Day/Night Band radiance.
    Dnb,
    /// M15 thermal band.
    M15,
    Geolocation,
    GeolocationSample,
    QualityFlag,
}

impl AssetRole {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Dnb => "DNB",
            Self::M15 => "M15",
            Self::Geolocation => "LI",
            Self::GeolocationSample => "SAMPLE",
            Self::QualityFlag => "VFLAG",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Dnb => "VIIRS Day/Night Band radiance",
            Self::M15 => "VIIRS M15 thermal infrared radiance",
            Self::Geolocation => "Geolocation",
            Self::GeolocationSample => "Geolocation samples",
            Self::QualityFlag => "Quality flag mask",
        }
    }

    fn band(&self) -> Option<Band> {
        match self {
            Self::Dnb => Some(Band::new(self.key(), "day night band", 0.7, 0.4)),
            Self::M15 => Some(Band::new(self.key(), "thermal infrared", 10.763, 1.0)),
            _ => None,
        }
    }
}

/// Outcome of looking at a single file. Unknown products are ignored
/// rather than rejected so new file types in the bucket do not break runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Asset(AssetRole),
    Ignored,
}

pub fn classify(fields: &FilenameFields, file: &str) -> Classification {
    let is_sample = filename::basename(file).contains("samples");
    match fields.product_code.as_str() {
        "SVDNB" if filename::extension(file) == Some("tif") => Classification::Asset(AssetRole::Dnb),
        "SVM15" => Classification::Asset(AssetRole::M15),
        "GDNBO" | "GDTCN" if is_sample => Classification::Asset(AssetRole::GeolocationSample),
        "GDNBO" | "GDTCN" => Classification::Asset(AssetRole::Geolocation),
        _ => Classification::Ignored,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub name: String,
    pub common_name: String,
    pub center_wavelength: f64,
    pub full_width_half_max: f64,
}

impl Band {
    fn new(name: &str, common_name: &str, center_wavelength: f64, full_width_half_max: f64) -> Self {
        Self {
            name: name.to_string(),
            common_name: common_name.to_string(),
            center_wavelength,
            full_width_half_max,
        }
    }
}

const EO_BANDS: &str = "eo:bands";

/// Creates the asset for one file. `created` is written with microsecond
/// precision to match the creation token.
pub fn new_asset(role: AssetRole, href: String, media_type: Option<&str>, created: Option<DateTime<Utc>>) -> Result<Asset> {
    let mut asset = Asset::new(href).role("data");
    asset.title = Some(role.title().to_string());
    asset.r#type = media_type.map(str::to_string);
    asset.created = created.map(|created| created.to_rfc3339_opts(SecondsFormat::Micros, true));
    if let Some(band) = role.band() {
        let _ = asset.set_field(EO_BANDS, [band])?;
    }
    Ok(asset)
}

pub fn has_eo_bands(asset: &Asset) -> bool {
    asset.field(EO_BANDS).is_some()
}

fn media_type_for(file: &str) -> Option<&'static str> {
    match filename::extension(file)? {
        "tif" | "tiff" => Some(COG),
        "h5" => Some(HDF5),
        _ => None,
    }
}

/// Builds the assets for the files of one segment, keyed by role. File
/// paths are relative to `root_url`.
pub struct AssetFactory<'a> {
    root_url: &'a str,
}

impl<'a> AssetFactory<'a> {
    pub fn new(root_url: &'a str) -> Self {
        Self { root_url }
    }

    /// Files are visited in sorted order. When several files share a role the
    /// last one wins, which is the most recent reprocessing since the
    /// creation token sorts chronologically.
    pub fn build<S: AsRef<str>>(&self, segment: &SegmentKey, files: &[S]) -> Result<BTreeMap<String, Asset>> {
        let mut files: Vec<&str> = files.iter().map(|file| file.as_ref()).collect();
        files.sort_unstable();

        let mut assets: BTreeMap<String, Asset> = BTreeMap::new();
        for file in files {
            let Ok(fields) = filename::parse(file) else {
                debug!(file, "skipping file without granule fields");
                continue;
            };
            let role = match classify(&fields, file) {
                Classification::Asset(role) => role,
                Classification::Ignored => {
                    debug!(file, product = %fields.product_code, "no asset role for product");
                    continue;
                }
            };

            let asset = new_asset(
                role,
                href::join(self.root_url, file)?,
                media_type_for(file),
                Some(fields.created()?),
            )?;
            if let Some(replaced) = assets.insert(role.key().to_string(), asset) {
                warn!(%segment, file, replaced = %replaced.href, "duplicate {} asset, keeping the later file", role.key());
            }
        }

        let vflag = AssetRole::QualityFlag;
        let vflag_href = href::join(self.root_url, &format!("{segment}{VFLAG_SUFFIX}"))?;
        assets.insert(vflag.key().to_string(), new_asset(vflag, vflag_href, Some(COG), None)?);

        Ok(assets)
    }
}
