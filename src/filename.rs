//! Positional fields of VIIRS granule filenames.
//!
//! A granule name is a fixed-order, underscore-delimited record:
//!
//! ```text
//! SVDNB_npp_d20200801_t0048355_e0054159_b45395_c20200801045415683718_noaa_ops.rade9.co.tif
//! |     |   |         |        |        |      |                     |
//! |     |   date      start    end      orbit  creation              suffix
//! |     platform
//! product code
//! ```
//!
//! Time tokens carry a one-letter marker (`d`, `t`, `e`, `c`) followed by
//! zero-padded digits. Calendar parsing is deferred to
//! [`parse_compact_timestamp`].
use crate::error::{CatalogError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Granule names with fewer fields are not part of any segment.
pub const MIN_FIELDS: usize = 7;

const SEGMENT_FIELDS: usize = 5;

/// A token made of a one-letter marker and its payload, e.g. `t0048355`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkedToken {
    marker: Option<char>,
    value: String,
}

impl MarkedToken {
    pub fn new(raw: &str) -> Self {
        let mut chars = raw.chars();
        let marker = chars.next();
        Self {
            marker,
            value: chars.as_str().to_string(),
        }
    }

    pub fn marker(&self) -> Option<char> {
        self.marker
    }

    /// The token without its marker.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for MarkedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(marker) = self.marker {
            write!(f, "{marker}")?;
        }
        f.write_str(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameFields {
    pub product_code: String,
    pub platform: String,
    pub date: MarkedToken,
    pub start: MarkedToken,
    pub end: MarkedToken,
    pub orbit: MarkedToken,
    pub creation: MarkedToken,
    /// Everything after the creation token, still split on `_`.
    pub suffix: Vec<String>,
}

impl FilenameFields {
    pub fn segment_key(&self) -> SegmentKey {
        SegmentKey {
            platform: self.platform.clone(),
            date: self.date.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            orbit: self.orbit.clone(),
        }
    }

    pub fn created(&self) -> Result<DateTime<Utc>> {
        parse_compact_timestamp(self.creation.value())
    }
}

/// Splits the basename of `raw_key` into its positional fields.
pub fn parse(raw_key: &str) -> Result<FilenameFields> {
    let tokens: Vec<&str> = basename(raw_key).split('_').collect();
    if tokens.len() < MIN_FIELDS {
        return Err(CatalogError::Unparseable {
            key: raw_key.to_string(),
            tokens: tokens.len(),
        });
    }

    Ok(FilenameFields {
        product_code: tokens[0].to_string(),
        platform: tokens[1].to_string(),
        date: MarkedToken::new(tokens[2]),
        start: MarkedToken::new(tokens[3]),
        end: MarkedToken::new(tokens[4]),
        orbit: MarkedToken::new(tokens[5]),
        creation: MarkedToken::new(tokens[6]),
        suffix: tokens[7..].iter().map(|t| t.to_string()).collect(),
    })
}

/// The segment a raw key belongs to, or `None` for keys that are
/// deliberately kept out of segment grouping (too few fields).
pub fn derive_segment_key(raw_key: &str) -> Option<SegmentKey> {
    parse(raw_key).ok().map(|fields| fields.segment_key())
}

pub fn basename(raw_key: &str) -> &str {
    raw_key.rsplit('/').next().unwrap_or(raw_key)
}

/// File extension of the basename, without the dot.
pub fn extension(raw_key: &str) -> Option<&str> {
    Path::new(basename(raw_key))
        .extension()
        .and_then(|ext| ext.to_str())
}

/// Identifier shared by every granule of one orbital pass, e.g.
/// `npp_d20200801_t0048355_e0054159_b45395`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    platform: String,
    date: MarkedToken,
    start: MarkedToken,
    end: MarkedToken,
    orbit: MarkedToken,
}

impl SegmentKey {
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn orbit(&self) -> &MarkedToken {
        &self.orbit
    }

    pub fn start_datetime(&self) -> Result<DateTime<Utc>> {
        parse_compact_timestamp(&format!("{}{}", self.date.value(), self.start.value()))
    }

    /// Reuses the start date: a segment is assumed not to cross midnight.
    pub fn end_datetime(&self) -> Result<DateTime<Utc>> {
        parse_compact_timestamp(&format!("{}{}", self.date.value(), self.end.value()))
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.platform, self.date, self.start, self.end, self.orbit
        )
    }
}

impl FromStr for SegmentKey {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split('_').collect();
        if tokens.len() != SEGMENT_FIELDS {
            return Err(CatalogError::Unparseable {
                key: s.to_string(),
                tokens: tokens.len(),
            });
        }
        Ok(Self {
            platform: tokens[0].to_string(),
            date: MarkedToken::new(tokens[1]),
            start: MarkedToken::new(tokens[2]),
            end: MarkedToken::new(tokens[3]),
            orbit: MarkedToken::new(tokens[4]),
        })
    }
}

impl Serialize for SegmentKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SegmentKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses `YYYYMMDDHHMMSS` followed by one to six fractional-second digits.
pub fn parse_compact_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let malformed = || CatalogError::MalformedTimestamp(value.to_string());

    if !(15..=20).contains(&value.len()) || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let (whole, fraction) = value.split_at(14);
    let naive = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").map_err(|_| malformed())?;
    let micros: u32 = format!("{fraction:0<6}").parse().map_err(|_| malformed())?;
    let naive = naive.with_nanosecond(micros * 1_000).ok_or_else(malformed)?;

    Ok(Utc.from_utc_datetime(&naive))
}
