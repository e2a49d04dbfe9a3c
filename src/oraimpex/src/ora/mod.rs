// SPDX-License-Identifier: GPL-3.0-or-later

//! The stack descriptor: an intermediate, fully-defaulted representation
//! of stack.xml. The reader maps it into the document model once every
//! raster decode has settled.

use oracore::paint::{Blendmode, Isolation};

pub(crate) mod reader;

pub(crate) struct OraCanvas {
    pub size: (u32, u32),
    pub root: OraStack,
}

/// Attributes shared by layers and stacks. Every field is resolved to
/// its default here; nothing downstream looks at raw attributes again.
pub(crate) struct OraCommon {
    pub name: String,
    /// Canvas position with all enclosing stack offsets folded in
    pub offset: (i32, i32),
    pub opacity: f32,
    pub hidden: bool,
    /// Raw composite-op value (defaulted when absent)
    pub composite_op: String,
    /// Blend mode resolved from composite_op; Normal when unrecognized
    pub blendmode: Blendmode,
}

impl Default for OraCommon {
    fn default() -> Self {
        OraCommon {
            name: String::new(),
            offset: (0, 0),
            opacity: 1.0,
            hidden: false,
            composite_op: Blendmode::Normal.svg_name().into(),
            blendmode: Blendmode::Normal,
        }
    }
}

pub(crate) struct OraLayer {
    pub common: OraCommon,
    /// Archive path of the layer's raster; a layer without one is kept
    /// but never gets a raster
    pub src: Option<String>,
}

pub(crate) struct OraStack {
    pub common: OraCommon,
    pub isolation: Isolation,
    /// Document order: first child is the topmost
    pub children: Vec<OraStackElement>,
}

pub(crate) enum OraStackElement {
    Stack(OraStack),
    Layer(OraLayer),
}
