use shared::TileRect;

pub const DEFAULT_TILE_EDGE: u32 = 256;

/// Splits a `width`x`height` image into square tiles of `tile_edge` pixels.
///
/// Rows are walked top to bottom and columns left to right within a row, so
/// `chunk_id` follows raster order. Tiles on the right and bottom border are
/// clipped to the image. Zero-area tiles are never emitted and do not consume
/// an id. A `tile_edge` of zero yields no tiles.
pub fn partition(width: u32, height: u32, tile_edge: u32) -> Vec<TileRect> {
    if tile_edge == 0 {
        return Vec::new();
    }

    let step = tile_edge as usize;
    let mut tiles = Vec::new();
    let mut next_id = 0u32;

    for y in (0..height).step_by(step) {
        for x in (0..width).step_by(step) {
            let tile_width = tile_edge.min(width - x);
            let tile_height = tile_edge.min(height - y);
            if tile_width == 0 || tile_height == 0 {
                continue;
            }
            tiles.push(TileRect {
                chunk_id: next_id,
                x,
                y,
                width: tile_width,
                height: tile_height,
            });
            next_id += 1;
        }
    }

    tiles
}
