use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::error::{ChmError, Result};
use crate::geo_core::{Crs, GeoTransform};
use crate::raster::{Grid, Raster};

// GeoKeyDirectory key ids
const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const CODE_USER_DEFINED: u16 = 32767;

fn not_geotiff(path: &Path, reason: &str) -> ChmError {
    ChmError::NotGeoTiff {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read a single-band GeoTIFF into a raster.
///
/// Any integer or float sample type is widened to f32. Georeferencing comes
/// from the ModelPixelScale and ModelTiepoint tags; both must be present.
/// The GeoKeyDirectory and GDAL_NODATA tags are optional.
pub fn read_geotiff(path: &Path) -> Result<Raster> {
    let file = File::open(path).map_err(|e| ChmError::TiffRead {
        path: path.to_path_buf(),
        source: tiff::TiffError::IoError(e),
    })?;
    let wrap = |e: tiff::TiffError| ChmError::TiffRead {
        path: path.to_path_buf(),
        source: e,
    };

    let mut decoder = Decoder::new(BufReader::new(file)).map_err(wrap)?;

    // Budget for large tiles; a 10k x 10k f32 raster alone is 400 MB
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (cols, rows) = decoder.dimensions().map_err(wrap)?;

    match decoder.colortype().map_err(wrap)? {
        tiff::ColorType::Gray(_) => {}
        other => {
            return Err(not_geotiff(
                path,
                &format!("expected a single-band raster, found {:?}", other),
            ))
        }
    }

    let scale = match decoder.find_tag(Tag::ModelPixelScaleTag).map_err(wrap)? {
        Some(value) => value.into_f64_vec().map_err(wrap)?,
        None => return Err(not_geotiff(path, "missing ModelPixelScale tag")),
    };
    let tiepoint = match decoder.find_tag(Tag::ModelTiepointTag).map_err(wrap)? {
        Some(value) => value.into_f64_vec().map_err(wrap)?,
        None => return Err(not_geotiff(path, "missing ModelTiepoint tag")),
    };
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(not_geotiff(path, "georeferencing tags are truncated"));
    }

    // Tiepoint format: [i, j, k, x, y, z] anchors pixel (i, j) at world (x, y)
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    let transform = GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]);

    let crs = match decoder.find_tag(Tag::GeoKeyDirectoryTag).map_err(wrap)? {
        Some(value) => parse_geo_keys(&value.into_u16_vec().map_err(wrap)?),
        None => None,
    };

    let nodata = read_nodata(&mut decoder);

    let samples = decode_samples(decoder.read_image().map_err(wrap)?);
    if samples.len() != rows as usize * cols as usize {
        return Err(not_geotiff(path, "sample count does not match dimensions"));
    }

    let grid = Grid::from_data(rows as usize, cols as usize, samples);
    let mut raster = Raster::new(grid, transform, crs);
    if let Some(value) = nodata {
        raster = raster.with_nodata(value);
    }
    Ok(raster)
}

/// Write a raster as a single-band f32 GeoTIFF.
///
/// Always writes ModelPixelScale and ModelTiepoint; the GeoKeyDirectory and
/// GDAL_NODATA tags are written when the raster carries a CRS or nodata
/// value. Parent directories are created as needed.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path).map_err(|e| ChmError::TiffWrite {
        path: path.to_path_buf(),
        source: tiff::TiffError::IoError(e),
    })?;
    let wrap = |e: tiff::TiffError| ChmError::TiffWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(wrap)?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(raster.cols() as u32, raster.rows() as u32)
        .map_err(wrap)?;

    let transform = raster.transform();
    let (res_x, res_y) = transform.resolution();
    let (origin_x, origin_y) = transform.origin();
    let scale = [res_x, res_y, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, origin_x, origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(wrap)?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(wrap)?;

    if let Some(crs) = raster.crs() {
        let keys = geo_key_directory(crs);
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &keys[..])
            .map_err(wrap)?;
    }

    if let Some(nodata) = raster.nodata() {
        let text = format!("{}", nodata);
        image
            .encoder()
            .write_tag(Tag::GdalNodata, text.as_str())
            .map_err(wrap)?;
    }

    image.write_data(raster.grid().data()).map_err(wrap)?;
    Ok(())
}

/// Minimal GeoKeyDirectory: model type, raster type, and the EPSG code
/// under the key matching the CRS kind.
fn geo_key_directory(crs: Crs) -> Vec<u16> {
    let (model_type, code_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, KEY_GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, KEY_PROJECTED_CS_TYPE)
    };
    let code = u16::try_from(crs.epsg()).unwrap_or(CODE_USER_DEFINED);
    vec![
        1,
        1,
        0,
        3, // header: version 1.1, 3 keys
        KEY_MODEL_TYPE,
        0,
        1,
        model_type,
        KEY_RASTER_TYPE,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
        code_key,
        0,
        1,
        code,
    ]
}

fn parse_geo_keys(keys: &[u16]) -> Option<Crs> {
    if keys.len() < 4 {
        return None;
    }
    let mut model_type = None;
    let mut geographic_code = None;
    let mut projected_code = None;
    for entry in keys[4..].chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            // Value lives in another tag; none of the keys we care about do
            continue;
        }
        match key {
            KEY_MODEL_TYPE => model_type = Some(value),
            KEY_GEOGRAPHIC_TYPE => geographic_code = Some(value),
            KEY_PROJECTED_CS_TYPE => projected_code = Some(value),
            _ => {}
        }
    }

    let usable = |code: &u16| *code != 0 && *code != CODE_USER_DEFINED;
    let geographic = geographic_code
        .filter(usable)
        .map(|c| Crs::geographic(c as u32));
    let projected = projected_code
        .filter(usable)
        .map(|c| Crs::projected(c as u32));
    match model_type {
        Some(MODEL_TYPE_GEOGRAPHIC) => geographic,
        Some(MODEL_TYPE_PROJECTED) => projected,
        _ => projected.or(geographic),
    }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .parse()
        .ok()
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}
