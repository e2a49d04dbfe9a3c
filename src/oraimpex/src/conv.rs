// SPDX-License-Identifier: GPL-3.0-or-later

use image::RgbaImage;
use oracore::paint::color::{Pixel8, ALPHA_CHANNEL};
use oracore::paint::Image8;

/// Convert a decoded (non-premultiplied) RGBA image into the
/// premultiplied flat buffer the compositor works on.
pub fn to_image8(img: &RgbaImage) -> Image8 {
    let mut out = Image8::new(img.width() as usize, img.height() as usize);

    let pixels = bytemuck::cast_slice::<_, Pixel8>(img.as_raw());

    out.pixels.iter_mut().zip(pixels.iter()).for_each(|(d, s)| {
        let a = s[ALPHA_CHANNEL] as u32;
        d[0] = u8_mult(s[0] as u32, a);
        d[1] = u8_mult(s[1] as u32, a);
        d[2] = u8_mult(s[2] as u32, a);
        d[ALPHA_CHANNEL] = s[ALPHA_CHANNEL];
    });

    out
}

/// Convert a premultiplied flat buffer back to a plain RGBA image
pub fn from_image8(img: &Image8) -> RgbaImage {
    let mut rgba = Vec::with_capacity(img.width * img.height * 4);

    for px in img.pixels.iter() {
        let a = px[ALPHA_CHANNEL] as u32;
        let ia = if a > 0 { (255 * 255 + a / 2) / a } else { 0 };

        rgba.push(u8_mult(px[0] as u32, ia));
        rgba.push(u8_mult(px[1] as u32, ia));
        rgba.push(u8_mult(px[2] as u32, ia));
        rgba.push(px[ALPHA_CHANNEL]);
    }

    image::RgbaImage::from_raw(img.width as u32, img.height as u32, rgba).unwrap()
}

fn u8_mult(a: u32, b: u32) -> u8 {
    let c = a * b + 0x80;
    (((c >> 8) + c) >> 8) as u8
}
