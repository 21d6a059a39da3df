#![allow(async_fn_in_trait)]
pub mod asset;
pub mod catalog;
pub mod config;
mod error;
pub mod filename;
pub mod href;
pub mod item;
pub mod pipeline;
mod s3;
pub mod s3_operations;
pub mod segment;
pub mod stac_operations;
pub mod store;

pub use error::{CatalogError, Result};
