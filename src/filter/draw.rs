use image::{Rgb, RgbImage};

use crate::detect::BoundingBox;

use super::{OUTLINE_COLOR, OUTLINE_STROKE};

/// Color and stroke width of a highlight outline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutlineStyle {
    pub color: Rgb<u8>,
    pub stroke: u32,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            color: OUTLINE_COLOR,
            stroke: OUTLINE_STROKE,
        }
    }
}

/// Draw an unfilled rectangle. The stroke grows inward from the box edges and is
/// clipped to the image.
pub fn draw_outline(image: &mut RgbImage, bbox: &BoundingBox, style: OutlineStyle) {
    let (width, height) = image.dimensions();
    if bbox.width == 0 || bbox.height == 0 || bbox.x >= width || bbox.y >= height {
        return;
    }
    let stroke = style.stroke.max(1);

    let x0 = bbox.x;
    let y0 = bbox.y;
    // Exclusive far edges of the unclipped box.
    let x_end = bbox.x.saturating_add(bbox.width);
    let y_end = bbox.y.saturating_add(bbox.height);

    let inner_left = x0.saturating_add(stroke);
    let inner_right = x_end.saturating_sub(stroke);
    let inner_top = y0.saturating_add(stroke);
    let inner_bottom = y_end.saturating_sub(stroke);

    for y in y0..y_end.min(height) {
        let full_row = y < inner_top || y >= inner_bottom;
        for x in x0..x_end.min(width) {
            if full_row || x < inner_left || x >= inner_right {
                image.put_pixel(x, y, style.color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painted(image: &RgbImage) -> usize {
        image.pixels().filter(|p| p.0 == OUTLINE_COLOR.0).count()
    }

    #[test]
    fn outline_has_expected_pixel_count() {
        let mut image = RgbImage::new(20, 20);
        draw_outline(&mut image, &BoundingBox::new(2, 3, 8, 6), OutlineStyle::default());
        // 8x6 box minus its 4x2 interior.
        assert_eq!(painted(&image), 8 * 6 - 4 * 2);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn small_box_is_filled() {
        let mut image = RgbImage::new(10, 10);
        draw_outline(&mut image, &BoundingBox::new(1, 1, 3, 3), OutlineStyle::default());
        assert_eq!(painted(&image), 9);
    }

    #[test]
    fn outline_is_clipped_to_image() {
        let mut image = RgbImage::new(10, 10);
        draw_outline(&mut image, &BoundingBox::new(6, 6, 10, 10), OutlineStyle::default());
        // Only the top and left strokes fall inside.
        assert_eq!(painted(&image), 4 * 2 + 2 * 2);

        let mut untouched = RgbImage::new(10, 10);
        draw_outline(&mut untouched, &BoundingBox::new(12, 0, 4, 4), OutlineStyle::default());
        assert_eq!(painted(&untouched), 0);
    }
}
