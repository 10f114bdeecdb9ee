//! Canopy height model pipeline for airborne LiDAR tiles.
//!
//! Each tile is rasterized twice, once from the ground-classified returns
//! (DTM) and once from all returns (DSM); the difference, masked for nodata
//! and low vegetation, is the canopy height model. Per-tile CHMs can then
//! be mosaicked into one continuous raster. [`batch::BatchRunner`] drives
//! the whole sequence.

pub mod batch;
pub mod commons;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo_core;
pub mod model;
pub mod raster;
