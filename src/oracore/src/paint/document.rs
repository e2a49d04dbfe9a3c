// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use tracing::debug;

use super::color::Pixel8;
use super::rasterop;
use super::rectiter::RowIterMut;
use super::{Blendmode, Color, Image8, Layer};

/// A row blend function over premultiplied pixels, the same shape as the
/// rasterop functions. Used to override built-in compositing per operator.
pub type BlendFn = fn(&mut [Pixel8], &[Pixel8], u8);

/// Per-render configuration. Passed explicitly to every render call;
/// there is no ambient render state.
#[derive(Clone)]
pub struct RenderOptions {
    /// Return the authoring tool's premerged image when one is present,
    /// skipping per-layer compositing entirely.
    pub prefer_merged: bool,
    /// Paint the canvas with this color before compositing. The default
    /// is a fully transparent canvas.
    pub background: Option<Color>,
    /// Replacement blend functions, keyed by the raw composite-op string.
    pub blend_overrides: HashMap<String, BlendFn>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            prefer_merged: true,
            background: None,
            blend_overrides: HashMap::new(),
        }
    }
}

impl RenderOptions {
    /// Always composite from the layer stack
    pub fn layers_only() -> Self {
        RenderOptions {
            prefer_merged: false,
            ..Default::default()
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Isolation {
    Isolate,
    /// Isolate when opacity < 1.0 or the blend mode is not source-over
    Auto,
}

/// A nested layer group, composited as a virtual layer
#[derive(Clone)]
pub struct Group {
    pub name: String,
    pub composite_op: String,
    pub blendmode: Blendmode,
    pub opacity: f32,
    pub hidden: bool,
    pub isolation: Isolation,
    /// Back-to-front, like the document's own layer list
    pub children: Vec<StackElement>,
}

impl Group {
    pub fn new(name: &str) -> Group {
        Group {
            name: name.into(),
            composite_op: Blendmode::Normal.svg_name().into(),
            blendmode: Blendmode::Normal,
            opacity: 1.0,
            hidden: false,
            isolation: Isolation::Auto,
            children: Vec::new(),
        }
    }

    /// Does this group composite through a buffer of its own?
    pub fn isolated(&self) -> bool {
        matches!(self.isolation, Isolation::Isolate)
            || self.opacity < 1.0
            || self.blendmode != Blendmode::Normal
    }
}

#[derive(Clone)]
pub enum StackElement {
    Layer(Layer),
    Group(Group),
}

impl StackElement {
    pub fn as_layer(&self) -> Option<&Layer> {
        match self {
            StackElement::Layer(l) => Some(l),
            StackElement::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            StackElement::Layer(_) => None,
            StackElement::Group(g) => Some(g),
        }
    }
}

/// A loaded OpenRaster document: canvas size, the layer stack in
/// back-to-front paint order, and the optional bundled rasters.
#[derive(Clone, Default)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<StackElement>,
    pub thumbnail: Option<Image8>,
    pub merged: Option<Image8>,
}

impl Document {
    pub fn new(width: u32, height: u32) -> Document {
        Document {
            width,
            height,
            ..Default::default()
        }
    }

    /// Number of actual layers in the stack, groups descended into
    pub fn layer_count(&self) -> usize {
        count_layers(&self.layers)
    }

    /// Insert a new blank layer at the given back-to-front position.
    /// An absent or out-of-range index appends, making the layer topmost.
    pub fn add_layer(&mut self, name: &str, index: Option<usize>) -> &mut Layer {
        let at = match index {
            Some(i) if i < self.layers.len() => i,
            _ => self.layers.len(),
        };
        self.layers.insert(at, StackElement::Layer(Layer::new(name)));

        match &mut self.layers[at] {
            StackElement::Layer(layer) => layer,
            StackElement::Group(_) => unreachable!(),
        }
    }

    /// A copy of the bundled thumbnail, or an empty image if there is none
    pub fn thumbnail_image(&self) -> Image8 {
        self.thumbnail.clone().unwrap_or_default()
    }

    /// Flatten the document into a single canvas-sized raster.
    ///
    /// With `prefer_merged` set and a premerged image present this is a
    /// straight copy; otherwise the layer stack is composited
    /// back-to-front onto a transparent canvas. Never fails: a document
    /// with no layers (or a zero-sized canvas) yields a blank image.
    pub fn to_image(&self, opts: &RenderOptions) -> Image8 {
        if opts.prefer_merged {
            if let Some(merged) = &self.merged {
                debug!("compositing shortcut: returning premerged image");
                return merged.clone();
            }
        }

        let mut canvas = Image8::new(self.width as usize, self.height as usize);
        if let Some(bg) = opts.background {
            if !bg.is_transparent() {
                canvas.pixels.fill(bg.as_pixel8());
            }
        }
        flatten_onto(&mut canvas, &self.layers, 1.0, opts);
        canvas
    }
}

fn count_layers(elements: &[StackElement]) -> usize {
    elements
        .iter()
        .map(|e| match e {
            StackElement::Layer(_) => 1,
            StackElement::Group(g) => count_layers(&g.children),
        })
        .sum()
}

/// Composite a back-to-front element list onto the destination canvas.
/// `parent_opacity` carries the accumulated opacity of enclosing
/// pass-through groups.
fn flatten_onto(
    dest: &mut Image8,
    elements: &[StackElement],
    parent_opacity: f32,
    opts: &RenderOptions,
) {
    for element in elements {
        match element {
            StackElement::Layer(layer) => {
                if layer.hidden {
                    continue;
                }
                let img = match layer.image.as_ref() {
                    Some(img) => img,
                    None => continue,
                };
                let opacity = layer.opacity.clamp(0.0, 1.0) * parent_opacity;
                if opacity < 1.0 / 256.0 {
                    continue;
                }

                let dest_rect = match layer.rect().and_then(|r| r.cropped(dest.size())) {
                    Some(r) => r,
                    None => continue,
                };
                let src_rect = dest_rect.offset(-layer.x, -layer.y);

                let o = (opacity * 255.0) as u8;
                let blend = resolve_blend(opts, &layer.composite_op);
                let stride = dest.width;
                for (d, s) in
                    RowIterMut::new(&mut dest.pixels, stride, &dest_rect).zip(img.rows(&src_rect))
                {
                    match blend {
                        Some(f) => f(d, s, o),
                        None => rasterop::pixel_blend(d, s, o, layer.blendmode),
                    }
                }
            }
            StackElement::Group(group) => {
                if group.hidden {
                    continue;
                }
                let opacity = group.opacity.clamp(0.0, 1.0) * parent_opacity;
                if opacity < 1.0 / 256.0 {
                    continue;
                }

                if group.isolated() {
                    let mut scratch = Image8::new(dest.width, dest.height);
                    flatten_onto(&mut scratch, &group.children, 1.0, opts);

                    let o = (opacity * 255.0) as u8;
                    match resolve_blend(opts, &group.composite_op) {
                        Some(f) => f(&mut dest.pixels, &scratch.pixels, o),
                        None => rasterop::pixel_blend(
                            &mut dest.pixels,
                            &scratch.pixels,
                            o,
                            group.blendmode,
                        ),
                    }
                } else {
                    flatten_onto(dest, &group.children, opacity, opts);
                }
            }
        }
    }
}

fn resolve_blend(opts: &RenderOptions, composite_op: &str) -> Option<BlendFn> {
    opts.blend_overrides.get(composite_op).copied()
}
