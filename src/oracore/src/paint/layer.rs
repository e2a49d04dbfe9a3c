// SPDX-License-Identifier: GPL-3.0-or-later

use super::color::{Pixel8, ZERO_PIXEL8};
use super::{Blendmode, Image8, Rectangle, Size};

/// One paintable element of the document's layer stack.
///
/// The raster is attached separately from the descriptor attributes:
/// it stays `None` until the referenced archive entry has been decoded,
/// and remains `None` when that decode fails. A layer without a raster
/// keeps its place in the stack but is skipped when compositing.
#[derive(Clone)]
pub struct Layer {
    pub name: String,
    /// Offset of the layer's top-left corner within the canvas
    pub x: i32,
    pub y: i32,
    /// The raw composite-op attribute value, kept for override lookup
    pub composite_op: String,
    /// The blend mode resolved from `composite_op`
    pub blendmode: Blendmode,
    pub opacity: f32,
    pub hidden: bool,
    pub image: Option<Image8>,
}

impl Layer {
    /// A blank, fully opaque, visible source-over layer
    pub fn new(name: &str) -> Layer {
        Layer {
            name: name.into(),
            x: 0,
            y: 0,
            composite_op: Blendmode::Normal.svg_name().into(),
            blendmode: Blendmode::Normal,
            opacity: 1.0,
            hidden: false,
            image: None,
        }
    }

    /// Intrinsic width of the decoded raster (zero while undecoded)
    pub fn width(&self) -> u32 {
        self.image.as_ref().map_or(0, |img| img.width as u32)
    }

    /// Intrinsic height of the decoded raster (zero while undecoded)
    pub fn height(&self) -> u32 {
        self.image.as_ref().map_or(0, |img| img.height as u32)
    }

    /// The layer's placement rectangle on the canvas
    pub fn rect(&self) -> Option<Rectangle> {
        let img = self.image.as_ref()?;
        if img.is_null() {
            return None;
        }
        Some(Rectangle::new(
            self.x,
            self.y,
            img.width as i32,
            img.height as i32,
        ))
    }

    /// Render this layer's raster, translated by its offset, into a
    /// canvas-sized pixel buffer. Out-of-canvas parts are clipped.
    pub fn canvas_pixels(&self, canvas_width: u32, canvas_height: u32) -> Vec<Pixel8> {
        let mut buffer = vec![ZERO_PIXEL8; (canvas_width * canvas_height) as usize];

        if let (Some(img), Some(layer_rect)) = (self.image.as_ref(), self.rect()) {
            let canvas = Size::new(canvas_width as i32, canvas_height as i32);
            if let Some(dest) = layer_rect.cropped(canvas) {
                let src = dest.offset(-self.x, -self.y);
                let dest_rows =
                    super::rectiter::RowIterMut::new(&mut buffer, canvas_width as usize, &dest);
                for (d, s) in dest_rows.zip(img.rows(&src)) {
                    d.copy_from_slice(s);
                }
            }
        }

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::color::WHITE_PIXEL8;

    fn solid_layer(x: i32, y: i32, w: usize, h: usize) -> Layer {
        let mut layer = Layer::new("test");
        layer.x = x;
        layer.y = y;
        let mut img = Image8::new(w, h);
        img.pixels.fill(WHITE_PIXEL8);
        layer.image = Some(img);
        layer
    }

    #[test]
    fn test_blank_layer_defaults() {
        let layer = Layer::new("fresh");
        assert_eq!(layer.name, "fresh");
        assert_eq!((layer.x, layer.y), (0, 0));
        assert_eq!(layer.composite_op, "svg:src-over");
        assert_eq!(layer.blendmode, Blendmode::Normal);
        assert_eq!(layer.opacity, 1.0);
        assert!(!layer.hidden);
        assert_eq!((layer.width(), layer.height()), (0, 0));
        assert_eq!(layer.rect(), None);
    }

    #[test]
    fn test_canvas_pixels_centered() {
        let layer = solid_layer(1, 1, 2, 2);
        let buffer = layer.canvas_pixels(4, 4);

        let lit = buffer.iter().filter(|&&p| p == WHITE_PIXEL8).count();
        assert_eq!(lit, 4);
        assert_eq!(buffer[1 * 4 + 1], WHITE_PIXEL8);
        assert_eq!(buffer[2 * 4 + 2], WHITE_PIXEL8);
        assert_eq!(buffer[0], ZERO_PIXEL8);
    }

    #[test]
    fn test_canvas_pixels_clipped() {
        // Sticks out over the top-left corner; only one pixel lands
        let layer = solid_layer(-1, -1, 2, 2);
        let buffer = layer.canvas_pixels(3, 3);

        assert_eq!(buffer[0], WHITE_PIXEL8);
        assert_eq!(buffer.iter().filter(|&&p| p == WHITE_PIXEL8).count(), 1);
    }

    #[test]
    fn test_canvas_pixels_fully_outside() {
        let layer = solid_layer(10, 10, 2, 2);
        let buffer = layer.canvas_pixels(3, 3);
        assert!(buffer.iter().all(|&p| p == ZERO_PIXEL8));
    }

    #[test]
    fn test_canvas_pixels_without_raster() {
        let layer = Layer::new("empty");
        let buffer = layer.canvas_pixels(2, 2);
        assert!(buffer.iter().all(|&p| p == ZERO_PIXEL8));
    }
}
