use std::fmt;

/// Coordinate reference system identified by an EPSG code.
///
/// The projected/geographic kind decides which GeoTIFF key the code is
/// written under, so two systems with the same code but different kinds do
/// not compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crs {
    epsg: u32,
    geographic: bool,
}

impl Crs {
    pub fn projected(epsg: u32) -> Self {
        Crs {
            epsg,
            geographic: false,
        }
    }

    pub fn geographic(epsg: u32) -> Self {
        Crs {
            epsg,
            geographic: true,
        }
    }

    /// Classify an EPSG code by convention: the 4000-4999 block holds the
    /// geographic systems (4326, 4269, ...), everything else is treated as
    /// projected.
    pub fn from_epsg(epsg: u32) -> Self {
        if (4000..5000).contains(&epsg) {
            Crs::geographic(epsg)
        } else {
            Crs::projected(epsg)
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn is_geographic(&self) -> bool {
        self.geographic
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// North-up affine transform mapping pixel space to world coordinates.
///
/// `pixel_height` is negative: row indices grow southward while world Y
/// grows northward. The origin is the outer corner of the top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Square-pixel transform at the given cell size, top-left origin.
    pub fn north_up(origin_x: f64, origin_y: f64, resolution: f64) -> Self {
        GeoTransform::new(origin_x, origin_y, resolution, -resolution)
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// Absolute cell sizes (x, y).
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// World coordinates of a (col, row) pixel position. Fractional
    /// positions are fine; (0.0, 0.0) maps to the origin.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Inverse of `pixel_to_geo`.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// The world-space footprint of a grid with this transform.
    pub fn extent(&self, rows: usize, cols: usize) -> BoundingBox {
        let (x0, y0) = self.pixel_to_geo(0.0, 0.0);
        let (x1, y1) = self.pixel_to_geo(cols as f64, rows as f64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}
