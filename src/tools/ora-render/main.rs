// SPDX-License-Identifier: GPL-3.0-or-later

// Renders an OpenRaster file to a flat PNG. This can be used to compare
// this crate's interpretation of an .ora file with the authoring tool's
// own premerged image.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{ensure, Context, Result};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

use oracore::paint::{Color, RenderOptions};
use oraimpex::conv::from_image8;
use oraimpex::load_openraster_file;

fn main() -> Result<()> {
    let flags = xflags::parse_or_exit! {
        /// Print extra debugging information.
        optional -V,--verbose
        /// Always composite from the layer stack, even when the archive
        /// bundles a premerged image.
        optional -l,--layers
        /// Write the embedded thumbnail instead of the composite.
        optional -t,--thumbnail
        /// Fill the canvas with this color (e.g. "#ffffff") before
        /// compositing. The default is a transparent canvas.
        optional -b,--background color: String
        /// The OpenRaster file to render.
        required input: PathBuf
        /// The PNG file to write.
        required output: PathBuf
    };

    tracing_subscriber::fmt()
        .with_max_level(if flags.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::WARN
        })
        .init();

    let background = match &flags.background {
        Some(s) => Some(Color::from_str(s).map_err(|e| anyhow::anyhow!("{}: {}", s, e))?),
        None => None,
    };

    let doc = load_openraster_file(&flags.input)
        .with_context(|| format!("could not load {}", flags.input.display()))?;
    debug!(
        "loaded {}x{} document with {} layers",
        doc.width,
        doc.height,
        doc.layer_count()
    );

    let img = if flags.thumbnail {
        doc.thumbnail_image()
    } else {
        doc.to_image(&RenderOptions {
            prefer_merged: !flags.layers,
            background,
            ..Default::default()
        })
    };
    ensure!(
        !img.is_null(),
        "{} has nothing to render",
        flags.input.display()
    );

    from_image8(&img)
        .save(&flags.output)
        .with_context(|| format!("could not write {}", flags.output.display()))?;

    Ok(())
}
