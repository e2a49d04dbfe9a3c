// SPDX-License-Identifier: GPL-3.0-or-later

use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

/// The compositing operators supported by the renderer.
///
/// The names on the wire are the SVG compositing operator names used by
/// OpenRaster's `composite-op` attribute, with an optional `svg:` prefix.
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Blendmode {
    Normal = 0,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Dodge,
    Burn,
    HardLight,
    SoftLight,
    Add,
    Behind,
    Recolor,
}

impl Blendmode {
    pub fn svg_name(self) -> &'static str {
        use Blendmode::*;
        match self {
            Normal => "svg:src-over",
            Multiply => "svg:multiply",
            Screen => "svg:screen",
            Overlay => "svg:overlay",
            Darken => "svg:darken",
            Lighten => "svg:lighten",
            Dodge => "svg:color-dodge",
            Burn => "svg:color-burn",
            HardLight => "svg:hard-light",
            SoftLight => "svg:soft-light",
            Add => "svg:plus",
            Behind => "svg:dst-over",
            Recolor => "svg:src-atop",
        }
    }

    pub fn from_svg_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("svg:").unwrap_or(name);

        use Blendmode::*;
        Some(match name {
            "src-over" => Normal,
            "multiply" => Multiply,
            "screen" => Screen,
            "overlay" => Overlay,
            "darken" => Darken,
            "lighten" => Lighten,
            "color-dodge" => Dodge,
            "color-burn" => Burn,
            "hard-light" => HardLight,
            "soft-light" => SoftLight,
            "plus" => Add,
            "dst-over" => Behind,
            "src-atop" => Recolor,
            _ => {
                return None;
            }
        })
    }
}

impl Default for Blendmode {
    fn default() -> Self {
        Blendmode::Normal
    }
}
