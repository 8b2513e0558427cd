//! Flattening tiles into a single viewport image.

use crate::tile::Tile;
use image::{Pixel, Rgba};
use pdf_engine::RgbaImage;
use viewer_core::{Layout, Point, ViewportTransform};

/// Draws `tiles` into a viewport-sized image over `background`, sampling
/// each tile at the pixel centers of the viewport.
pub fn compose<'a>(
    tiles: impl IntoIterator<Item = &'a Tile>,
    transform: &ViewportTransform,
    layout: Layout,
    background: Rgba<u8>,
) -> RgbaImage {
    let width = layout.viewport.width.round().max(1.0) as u32;
    let height = layout.viewport.height.round().max(1.0) as u32;
    let mut canvas = RgbaImage::from_pixel(width, height, background);

    for tile in tiles {
        let rect = tile.document_rect;
        let top_left = transform.document_to_screen(layout, Point::new(rect.x, rect.y));
        let bottom_right = transform.document_to_screen(layout, Point::new(rect.right(), rect.bottom()));

        let x0 = top_left.x.floor().max(0.0) as u32;
        let y0 = top_left.y.floor().max(0.0) as u32;
        let x1 = (bottom_right.x.ceil().max(0.0) as u32).min(width);
        let y1 = (bottom_right.y.ceil().max(0.0) as u32).min(height);
        let (tile_width, tile_height) = tile.image.dimensions();

        for y in y0..y1 {
            for x in x0..x1 {
                let document = transform
                    .screen_to_document(layout, Point::new(x as f32 + 0.5, y as f32 + 0.5));
                if document.x < rect.x
                    || document.y < rect.y
                    || document.x >= rect.right()
                    || document.y >= rect.bottom()
                {
                    continue;
                }

                let sx = (((document.x - rect.x) * tile.raster_scale) as u32).min(tile_width - 1);
                let sy = (((document.y - rect.y) * tile.raster_scale) as u32).min(tile_height - 1);
                canvas.get_pixel_mut(x, y).blend(tile.image.get_pixel(sx, sy));
            }
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileKey;
    use viewer_core::{Rect, Size};

    const BACKGROUND: Rgba<u8> = Rgba([40, 40, 40, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn tile(rect: Rect, raster_scale: f32, color: Rgba<u8>) -> Tile {
        let width = (rect.width * raster_scale) as u32;
        let height = (rect.height * raster_scale) as u32;
        Tile {
            key: TileKey::new(0, 0, 0, 0),
            document_rect: rect,
            raster_scale,
            image: RgbaImage::from_pixel(width, height, color),
            blank: false,
        }
    }

    #[test]
    fn test_tile_lands_under_page_position() {
        // 100 x 100 page centered in a 200 x 100 viewport at scale 1.
        let layout = Layout::new(Size::new(200.0, 100.0), Size::new(100.0, 100.0));
        let transform = ViewportTransform::fit(layout, 5.0);
        let tiles = [tile(Rect::new(0.0, 0.0, 50.0, 50.0), 2.0, RED)];

        let image = compose(&tiles, &transform, layout, BACKGROUND);

        assert_eq!(image.dimensions(), (200, 100));
        assert_eq!(*image.get_pixel(50, 0), RED);
        assert_eq!(*image.get_pixel(99, 49), RED);
        assert_eq!(*image.get_pixel(100, 0), BACKGROUND);
        assert_eq!(*image.get_pixel(49, 0), BACKGROUND);
        assert_eq!(*image.get_pixel(60, 50), BACKGROUND);
    }

    #[test]
    fn test_transparent_tile_pixels_keep_background() {
        let layout = Layout::new(Size::new(10.0, 10.0), Size::new(10.0, 10.0));
        let transform = ViewportTransform::fit(layout, 5.0);
        let tiles = [tile(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0, Rgba([0, 0, 0, 0]))];

        let image = compose(&tiles, &transform, layout, BACKGROUND);
        assert!(image.pixels().all(|pixel| *pixel == BACKGROUND));
    }
}
