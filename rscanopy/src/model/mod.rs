//! The pipeline proper: per-tile elevation models, grid alignment, CHM
//! compositing and mosaicking.

pub mod align;
pub mod chm;
pub mod elevation;
pub mod mosaic;
