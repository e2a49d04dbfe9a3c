// SPDX-License-Identifier: GPL-3.0-or-later

use super::{OraCanvas, OraCommon, OraLayer, OraStack, OraStackElement};
use crate::conv::to_image8;
use crate::{OraError, OraLoadResult};

use oracore::paint::{Blendmode, Document, Group, Image8, Isolation, Layer, StackElement};

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::thread;

use image::io::Reader as ImageReader;
use tracing::{debug, warn};
use xml::attribute::OwnedAttribute;
use xml::reader::{EventReader, XmlEvent};
use zip::ZipArchive;

const MIMETYPE: &[u8] = b"image/openraster";
const THUMBNAIL_PATH: &str = "Thumbnails/thumbnail.png";
const MERGED_PATH: &str = "mergedimage.png";

pub fn load_openraster_file<P: AsRef<Path>>(path: P) -> OraLoadResult {
    load_openraster(File::open(path.as_ref())?)
}

pub fn load_openraster_bytes(bytes: &[u8]) -> OraLoadResult {
    load_openraster(Cursor::new(bytes))
}

/// Load an OpenRaster document from an archive.
///
/// Only an unreadable container or a missing/broken stack.xml is fatal.
/// Absent thumbnail and merged-image entries leave the matching document
/// fields unset, and a layer whose raster entry is missing or does not
/// decode is kept in the stack without a raster.
pub fn load_openraster<R: Read + Seek>(reader: R) -> OraLoadResult {
    let mut archive = ZipArchive::new(reader)?;

    check_mimetype(&mut archive);

    let canvas = {
        let stack_file = match archive.by_name("stack.xml") {
            Ok(f) => f,
            Err(_) => {
                warn!("archive has no stack.xml");
                return Err(OraError::MalformedArchive);
            }
        };
        parse_stack_xml(stack_file)?
    };

    // Pull the bytes of every referenced raster entry up front; a zip
    // archive can only be read one entry at a time.
    let mut wanted: Vec<String> = vec![THUMBNAIL_PATH.into(), MERGED_PATH.into()];
    collect_sources(&canvas.root, &mut wanted);
    wanted.sort();
    wanted.dedup();

    let pending: Vec<(String, Vec<u8>)> = wanted
        .into_iter()
        .filter_map(|name| entry_bytes(&mut archive, &name).map(|bytes| (name, bytes)))
        .collect();

    // Decode the rasters concurrently. The scope join is the completion
    // barrier: assembly starts only after every decode task has settled,
    // each as a decoded image or a logged failure.
    let mut images: HashMap<String, Image8> = HashMap::new();
    thread::scope(|scope| {
        let tasks: Vec<_> = pending
            .iter()
            .map(|(name, bytes)| (name, scope.spawn(move || decode_image(bytes))))
            .collect();

        for (name, task) in tasks {
            match task.join() {
                Ok(Ok(img)) => {
                    images.insert(name.clone(), img);
                }
                Ok(Err(e)) => warn!("could not decode {}: {}", name, e),
                Err(_) => warn!("decode task for {} panicked", name),
            }
        }
    });
    debug!("decoded {} of {} raster entries", images.len(), pending.len());

    let mut doc = Document::new(canvas.size.0, canvas.size.1);
    doc.layers = build_elements(&canvas.root, &images);
    doc.thumbnail = images.remove(THUMBNAIL_PATH);
    doc.merged = images.remove(MERGED_PATH);

    Ok(doc)
}

/// OpenRaster files are identified by a "mimetype" entry. The original
/// tools are not consistent about it, so a bad one is only a warning.
fn check_mimetype<R: Read + Seek>(archive: &mut ZipArchive<R>) {
    match archive.by_name("mimetype") {
        Ok(mut entry) => {
            let mut mimetype = Vec::new();
            if entry.read_to_end(&mut mimetype).is_ok() && mimetype != MIMETYPE {
                warn!("unexpected archive mimetype, trying to load anyway");
            }
        }
        Err(_) => warn!("archive has no mimetype entry"),
    }
}

fn entry_bytes<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut entry = match archive.by_name(name) {
        Ok(e) => e,
        Err(_) => {
            debug!("archive has no {} entry", name);
            return None;
        }
    };

    let mut bytes = Vec::with_capacity(entry.size() as usize);
    match entry.read_to_end(&mut bytes) {
        Ok(_) => Some(bytes),
        Err(e) => {
            warn!("could not read {}: {}", name, e);
            None
        }
    }
}

fn decode_image(bytes: &[u8]) -> Result<Image8, OraError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(to_image8(&img.into_rgba8()))
}

fn collect_sources(stack: &OraStack, out: &mut Vec<String>) {
    for child in &stack.children {
        match child {
            OraStackElement::Stack(substack) => collect_sources(substack, out),
            OraStackElement::Layer(layer) => {
                if let Some(src) = &layer.src {
                    out.push(src.clone());
                }
            }
        }
    }
}

/// Turn a descriptor stack into model elements, reversing each level
/// from document order (top first) into back-to-front paint order.
fn build_elements(stack: &OraStack, images: &HashMap<String, Image8>) -> Vec<StackElement> {
    stack
        .children
        .iter()
        .rev()
        .map(|child| match child {
            OraStackElement::Stack(substack) => StackElement::Group(Group {
                name: substack.common.name.clone(),
                composite_op: substack.common.composite_op.clone(),
                blendmode: substack.common.blendmode,
                opacity: substack.common.opacity,
                hidden: substack.common.hidden,
                isolation: substack.isolation,
                children: build_elements(substack, images),
            }),
            OraStackElement::Layer(oralayer) => {
                let image = oralayer
                    .src
                    .as_ref()
                    .and_then(|src| images.get(src).cloned());
                if image.is_none() {
                    warn!(
                        "layer {:?} has no usable raster and will not be drawn",
                        oralayer.common.name
                    );
                }

                StackElement::Layer(Layer {
                    name: oralayer.common.name.clone(),
                    x: oralayer.common.offset.0,
                    y: oralayer.common.offset.1,
                    composite_op: oralayer.common.composite_op.clone(),
                    blendmode: oralayer.common.blendmode,
                    opacity: oralayer.common.opacity,
                    hidden: oralayer.common.hidden,
                    image,
                })
            }
        })
        .collect()
}

fn parse_stack_xml<R: Read>(file: R) -> Result<OraCanvas, OraError> {
    let mut parser = EventReader::new(file);

    // Expect <image> as the root element
    loop {
        match parser.next() {
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                if name.local_name != "image" {
                    warn!("expected <image> root element, got <{}>", name);
                    return Err(OraError::MalformedArchive);
                }

                return parse_image(attributes, &mut parser);
            }
            Ok(XmlEvent::EndDocument) => {
                warn!("unexpected end of stack.xml");
                return Err(OraError::MalformedArchive);
            }
            Err(e) => {
                warn!("error reading stack.xml: {}", e);
                return Err(OraError::MalformedArchive);
            }
            _ => {}
        }
    }
}

fn parse_image<R: Read>(
    mut attributes: Vec<OwnedAttribute>,
    parser: &mut EventReader<R>,
) -> Result<OraCanvas, OraError> {
    // A missing or unparsable size makes a degenerate 0x0 canvas,
    // which renders blank. Not an error.
    let mut canvas = OraCanvas {
        size: (
            take_attribute(&mut attributes, "w")
                .and_then(|a| a.parse::<u32>().ok())
                .unwrap_or(0),
            take_attribute(&mut attributes, "h")
                .and_then(|a| a.parse::<u32>().ok())
                .unwrap_or(0),
        ),
        root: OraStack {
            common: OraCommon::default(),
            isolation: Isolation::Auto,
            children: Vec::new(),
        },
    };

    loop {
        match parser.next() {
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                if name.local_name == "stack" {
                    canvas.root = parse_stack(attributes, (0, 0), parser)?;
                } else {
                    debug!("skipping <image> element <{}>", name.local_name);
                    skip_element(parser)?;
                }
            }
            Ok(XmlEvent::EndElement { .. }) => {
                return Ok(canvas);
            }
            Ok(XmlEvent::EndDocument) => {
                warn!("unexpected end of stack.xml while reading <image>");
                return Err(OraError::MalformedArchive);
            }
            Err(e) => {
                warn!("error reading stack.xml: {}", e);
                return Err(OraError::MalformedArchive);
            }
            _ => {}
        }
    }
}

fn parse_stack<R: Read>(
    mut attributes: Vec<OwnedAttribute>,
    offset: (i32, i32),
    parser: &mut EventReader<R>,
) -> Result<OraStack, OraError> {
    let mut stack = OraStack {
        common: take_common(&mut attributes, offset),
        isolation: match take_attribute(&mut attributes, "isolation").as_deref() {
            Some("isolate") => Isolation::Isolate,
            _ => Isolation::Auto,
        },
        children: Vec::new(),
    };

    loop {
        match parser.next() {
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                if name.local_name == "stack" {
                    let substack = parse_stack(attributes, stack.common.offset, parser)?;
                    stack.children.push(OraStackElement::Stack(substack));
                } else if name.local_name == "layer" {
                    let layer = parse_layer(attributes, stack.common.offset, parser)?;
                    stack.children.push(OraStackElement::Layer(layer));
                } else {
                    warn!("unsupported stack element <{}>", name.local_name);
                    skip_element(parser)?;
                }
            }
            Ok(XmlEvent::EndElement { .. }) => {
                return Ok(stack);
            }
            Ok(XmlEvent::EndDocument) => {
                warn!("unexpected end of stack.xml while reading <stack>");
                return Err(OraError::MalformedArchive);
            }
            Err(e) => {
                warn!("error reading stack.xml: {}", e);
                return Err(OraError::MalformedArchive);
            }
            _ => {}
        }
    }
}

fn parse_layer<R: Read>(
    mut attributes: Vec<OwnedAttribute>,
    offset: (i32, i32),
    parser: &mut EventReader<R>,
) -> Result<OraLayer, OraError> {
    let layer = OraLayer {
        common: take_common(&mut attributes, offset),
        src: take_attribute(&mut attributes, "src"),
    };

    if layer.src.is_none() {
        warn!("layer {:?} has no src attribute", layer.common.name);
    }

    // A layer element should not have any children
    loop {
        match parser.next() {
            Ok(XmlEvent::StartElement { name, .. }) => {
                warn!("unsupported layer element <{}>", name.local_name);
                skip_element(parser)?;
            }
            Ok(XmlEvent::EndElement { .. }) => {
                return Ok(layer);
            }
            Ok(XmlEvent::EndDocument) => {
                warn!("unexpected end of stack.xml while reading <layer>");
                return Err(OraError::MalformedArchive);
            }
            Err(e) => {
                warn!("error reading stack.xml: {}", e);
                return Err(OraError::MalformedArchive);
            }
            _ => {}
        }
    }
}

/// Map the attributes shared by layers and stacks, applying defaults so
/// the descriptor is fully populated. The enclosing stacks' offset is
/// folded into the element's own.
fn take_common(attributes: &mut Vec<OwnedAttribute>, offset: (i32, i32)) -> OraCommon {
    let composite_op = take_attribute(attributes, "composite-op")
        .unwrap_or_else(|| Blendmode::Normal.svg_name().into());
    let blendmode = match Blendmode::from_svg_name(&composite_op) {
        Some(mode) => mode,
        None => {
            warn!(
                "unknown composite-op {:?}, falling back to source-over",
                composite_op
            );
            Blendmode::Normal
        }
    };

    OraCommon {
        name: take_attribute(attributes, "name").unwrap_or_default(),
        offset: (
            offset.0
                + take_attribute(attributes, "x")
                    .and_then(|a| a.parse::<i32>().ok())
                    .unwrap_or(0),
            offset.1
                + take_attribute(attributes, "y")
                    .and_then(|a| a.parse::<i32>().ok())
                    .unwrap_or(0),
        ),
        opacity: take_attribute(attributes, "opacity")
            .and_then(|a| a.parse::<f32>().ok())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0),
        hidden: take_attribute(attributes, "visibility").map_or(false, |a| a == "hidden"),
        composite_op,
        blendmode,
    }
}

fn take_attribute(attrs: &mut Vec<OwnedAttribute>, name: &str) -> Option<String> {
    attrs
        .iter()
        .position(|a| a.name.local_name == name)
        .map(|idx| attrs.remove(idx).value)
}

fn skip_element<R: Read>(parser: &mut EventReader<R>) -> Result<(), OraError> {
    let mut depth = 1;
    loop {
        match parser.next() {
            Ok(XmlEvent::StartElement { .. }) => {
                depth += 1;
            }
            Ok(XmlEvent::EndElement { .. }) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Ok(XmlEvent::EndDocument) => {
                warn!("unexpected end of stack.xml");
                return Err(OraError::MalformedArchive);
            }
            Err(e) => {
                warn!("error reading stack.xml: {}", e);
                return Err(OraError::MalformedArchive);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> OraCanvas {
        parse_stack_xml(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_minimal_document() {
        let canvas = parse(
            r#"<image w="64" h="48">
                 <stack>
                   <layer src="data/l.png"/>
                 </stack>
               </image>"#,
        );

        assert_eq!(canvas.size, (64, 48));
        assert_eq!(canvas.root.children.len(), 1);
        match &canvas.root.children[0] {
            OraStackElement::Layer(l) => {
                assert_eq!(l.src.as_deref(), Some("data/l.png"));
                assert_eq!(l.common.name, "");
                assert_eq!(l.common.offset, (0, 0));
                assert_eq!(l.common.opacity, 1.0);
                assert!(!l.common.hidden);
                assert_eq!(l.common.composite_op, "svg:src-over");
                assert_eq!(l.common.blendmode, Blendmode::Normal);
            }
            OraStackElement::Stack(_) => panic!("expected a layer"),
        }
    }

    #[test]
    fn test_layer_attributes() {
        let canvas = parse(
            r#"<image w="10" h="10">
                 <stack>
                   <layer name="top" x="3" y="-2" opacity="0.5"
                          composite-op="svg:multiply" visibility="hidden"
                          src="a.png"/>
                 </stack>
               </image>"#,
        );

        match &canvas.root.children[0] {
            OraStackElement::Layer(l) => {
                assert_eq!(l.common.name, "top");
                assert_eq!(l.common.offset, (3, -2));
                assert_eq!(l.common.opacity, 0.5);
                assert!(l.common.hidden);
                assert_eq!(l.common.composite_op, "svg:multiply");
                assert_eq!(l.common.blendmode, Blendmode::Multiply);
            }
            OraStackElement::Stack(_) => panic!("expected a layer"),
        }
    }

    #[test]
    fn test_only_literal_hidden_hides() {
        for (value, hidden) in [("hidden", true), ("visible", false), ("wonky", false)] {
            let xml = format!(
                r#"<image w="1" h="1"><stack>
                     <layer visibility="{}" src="a.png"/>
                   </stack></image>"#,
                value
            );
            let canvas = parse(&xml);
            match &canvas.root.children[0] {
                OraStackElement::Layer(l) => assert_eq!(l.common.hidden, hidden, "{}", value),
                OraStackElement::Stack(_) => unreachable!(),
            }
        }
    }

    #[test]
    fn test_unknown_composite_op_resolves_to_normal() {
        let canvas = parse(
            r#"<image w="1" h="1"><stack>
                 <layer composite-op="krita:fancy" src="a.png"/>
               </stack></image>"#,
        );

        match &canvas.root.children[0] {
            OraStackElement::Layer(l) => {
                // The raw value is kept for override lookup
                assert_eq!(l.common.composite_op, "krita:fancy");
                assert_eq!(l.common.blendmode, Blendmode::Normal);
            }
            OraStackElement::Stack(_) => unreachable!(),
        }
    }

    #[test]
    fn test_nested_stack_offsets_fold() {
        let canvas = parse(
            r#"<image w="100" h="100">
                 <stack>
                   <stack name="g" x="10" y="20" isolation="isolate">
                     <layer name="inner" x="1" y="2" src="a.png"/>
                   </stack>
                 </stack>
               </image>"#,
        );

        match &canvas.root.children[0] {
            OraStackElement::Stack(group) => {
                assert_eq!(group.common.name, "g");
                assert_eq!(group.common.offset, (10, 20));
                assert_eq!(group.isolation, Isolation::Isolate);
                match &group.children[0] {
                    OraStackElement::Layer(l) => assert_eq!(l.common.offset, (11, 22)),
                    OraStackElement::Stack(_) => panic!("expected a layer"),
                }
            }
            OraStackElement::Layer(_) => panic!("expected a stack"),
        }
    }

    #[test]
    fn test_document_order_is_kept_in_descriptor() {
        let canvas = parse(
            r#"<image w="1" h="1"><stack>
                 <layer name="A" src="a.png"/>
                 <layer name="B" src="b.png"/>
                 <layer name="C" src="c.png"/>
               </stack></image>"#,
        );

        let names: Vec<&str> = canvas
            .root
            .children
            .iter()
            .map(|c| match c {
                OraStackElement::Layer(l) => l.common.name.as_str(),
                OraStackElement::Stack(s) => s.common.name.as_str(),
            })
            .collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn test_missing_canvas_size_is_degenerate() {
        let canvas = parse(r#"<image><stack/></image>"#);
        assert_eq!(canvas.size, (0, 0));
    }

    #[test]
    fn test_wrong_root_element() {
        assert!(matches!(
            parse_stack_xml(r#"<not-an-image/>"#.as_bytes()),
            Err(OraError::MalformedArchive)
        ));
    }

    #[test]
    fn test_broken_xml() {
        assert!(matches!(
            parse_stack_xml(r#"<image w="1" h="1"><stack>"#.as_bytes()),
            Err(OraError::MalformedArchive)
        ));
    }

    #[test]
    fn test_unknown_elements_are_skipped() {
        let canvas = parse(
            r#"<image w="5" h="5">
                 <gadget><deeply><nested/></deeply></gadget>
                 <stack>
                   <layer src="a.png"><oddity/></layer>
                 </stack>
               </image>"#,
        );
        assert_eq!(canvas.size, (5, 5));
        assert_eq!(canvas.root.children.len(), 1);
    }
}
