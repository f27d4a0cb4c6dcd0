//! # Slippy-map tiling
//!
//! The graph is partitioned into square Web-Mercator tiles at a fixed
//! integer zoom: `2^zoom × 2^zoom` tiles, with the tile at column `x` and
//! row `y` identified by `y * 2^zoom + x`. The zoom is configured once per
//! graph and never changes over its lifetime.
//!
//! Within a tile, vertex coordinates are quantized to a grid of `2^12 - 1`
//! cells per axis and stored as two 24-bit little-endian integers (6 bytes
//! per vertex). At zoom 14 a tile is roughly 2.4 km across, so the
//! worst-case rounding error stays well under a metre.

use geo::{Coord, Rect, coord};
use std::f64::consts::PI;

/// The default tile zoom for new graphs.
pub const DEFAULT_ZOOM: u8 = 14;

/// The number of quantization cells per tile axis.
pub(crate) const GRID_CELLS: u32 = (1 << 12) - 1;

/// Bytes per quantized coordinate axis.
pub(crate) const COORDINATE_AXIS_BYTES: usize = 3;

/// Bytes per quantized vertex coordinate (both axes).
pub(crate) const COORDINATE_BYTES: usize = 2 * COORDINATE_AXIS_BYTES;

/// The latitude at which the Web-Mercator projection is cut off.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[inline]
fn side(zoom: u8) -> u32 {
    1 << zoom
}

/// The tile column and row containing the given coordinate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tile_xy(coordinate: Coord<f64>, zoom: u8) -> (u32, u32) {
    let n = f64::from(side(zoom));
    let x = ((coordinate.x + 180.0) / 360.0 * n).floor();
    let lat_rad = coordinate
        .y
        .clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT)
        .to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();

    let max = side(zoom) - 1;
    (
        (x.max(0.0) as u32).min(max),
        (y.max(0.0) as u32).min(max),
    )
}

/// The local tile id for the given column and row.
#[inline]
pub fn tile_id_from_xy(x: u32, y: u32, zoom: u8) -> u32 {
    y * side(zoom) + x
}

/// The id of the tile containing the given coordinate.
pub fn tile_id_for(coordinate: Coord<f64>, zoom: u8) -> u32 {
    let (x, y) = tile_xy(coordinate, zoom);
    tile_id_from_xy(x, y, zoom)
}

fn lat_for_row(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// The geographic bounding rectangle of a tile.
pub fn tile_bounds(tile_id: u32, zoom: u8) -> Rect<f64> {
    let n = f64::from(side(zoom));
    let x = f64::from(tile_id % side(zoom));
    let y = f64::from(tile_id / side(zoom));

    let west = x / n * 360.0 - 180.0;
    let east = (x + 1.0) / n * 360.0 - 180.0;
    let north = lat_for_row(y, n);
    let south = lat_for_row(y + 1.0, n);

    Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north })
}

/// Enumerates the ids of all tiles whose bounds overlap `rect`.
pub fn tiles_in_rect(rect: Rect<f64>, zoom: u8) -> impl Iterator<Item = u32> {
    // Tile rows grow southward, so the row range starts at the north edge.
    let (x0, y0) = tile_xy(coord! { x: rect.min().x, y: rect.max().y }, zoom);
    let (x1, y1) = tile_xy(coord! { x: rect.max().x, y: rect.min().y }, zoom);

    (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| tile_id_from_xy(x, y, zoom)))
}

/// Quantizes a coordinate to grid cells within the given tile bounds.
///
/// Latitude is interpolated linearly between the tile's north and south
/// edges; over the extent of a single tile the deviation from the true
/// projection is negligible.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn quantize(bounds: &Rect<f64>, coordinate: Coord<f64>) -> (u32, u32) {
    let fx = ((coordinate.x - bounds.min().x) / bounds.width()).clamp(0.0, 1.0);
    let fy = ((coordinate.y - bounds.min().y) / bounds.height()).clamp(0.0, 1.0);
    (
        (fx * f64::from(GRID_CELLS)).round() as u32,
        (fy * f64::from(GRID_CELLS)).round() as u32,
    )
}

/// The inverse of [`quantize`], up to the grid resolution.
pub(crate) fn dequantize(bounds: &Rect<f64>, cells: (u32, u32)) -> Coord<f64> {
    coord! {
        x: bounds.min().x + f64::from(cells.0) / f64::from(GRID_CELLS) * bounds.width(),
        y: bounds.min().y + f64::from(cells.1) / f64::from(GRID_CELLS) * bounds.height(),
    }
}
