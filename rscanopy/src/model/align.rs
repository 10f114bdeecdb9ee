use log::warn;

use crate::raster::Grid;

/// Equalize the shapes of a tile's DTM/DSM pair.
///
/// The smaller grid grows with zero rows at the bottom and zero columns at
/// the right until both shapes match. This is deliberately crude: the two
/// grids are assumed to share an origin and differ only by trailing extent
/// (the DTM, cut from the ground subset, is usually the smaller one), so a
/// few artifact pixels along the southern and eastern edges are accepted.
/// Matching shapes pass through unchanged, which also makes the operation
/// idempotent.
pub fn align_pair(dtm: Grid, dsm: Grid) -> (Grid, Grid) {
    if dtm.shape() == dsm.shape() {
        return (dtm, dsm);
    }

    let rows = dtm.rows().max(dsm.rows());
    let cols = dtm.cols().max(dsm.cols());
    warn!(
        "grid shapes differ ({}x{} vs {}x{}), padding both to {}x{}",
        dtm.rows(),
        dtm.cols(),
        dsm.rows(),
        dsm.cols(),
        rows,
        cols
    );

    (dtm.pad_to(rows, cols), dsm.pad_to(rows, cols))
}
