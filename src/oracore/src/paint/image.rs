// SPDX-License-Identifier: GPL-3.0-or-later

use super::color::Pixel8;
use super::rectiter::{RowIter, RowIterMut};
use super::{Rectangle, Size};

/// A flat image buffer
#[derive(Clone, Default)]
pub struct Image<T>
where
    T: Clone + Default + Eq,
{
    pub pixels: Vec<T>,
    pub width: usize,
    pub height: usize,
}

pub type Image8 = Image<Pixel8>;

impl<T> Image<T>
where
    T: Clone + Default + Eq,
{
    pub fn new(width: usize, height: usize) -> Image<T> {
        Image {
            pixels: vec![T::default(); width * height],
            width,
            height,
        }
    }

    pub fn is_null(&self) -> bool {
        debug_assert!(self.pixels.len() == self.width * self.height);
        self.pixels.is_empty()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    /// This image's rectangle, unless the image is empty
    pub fn rect(&self) -> Option<Rectangle> {
        if self.is_null() {
            None
        } else {
            Some(Rectangle::new(0, 0, self.width as i32, self.height as i32))
        }
    }

    pub fn rows(&self, rect: &Rectangle) -> RowIter<T> {
        RowIter::new(&self.pixels, self.width, rect)
    }

    pub fn rows_mut(&mut self, rect: &Rectangle) -> RowIterMut<T> {
        RowIterMut::new(&mut self.pixels, self.width, rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let mut img: Image<u8> = Image::new(4, 3);
        assert!(!img.is_null());
        assert_eq!(img.size(), Size::new(4, 3));

        for row in img.rows_mut(&Rectangle::new(1, 1, 2, 2)) {
            row.fill(7);
        }

        let rows: Vec<&[u8]> = img.rows(&img.rect().unwrap()).collect();
        assert_eq!(rows[0], &[0, 0, 0, 0]);
        assert_eq!(rows[1], &[0, 7, 7, 0]);
        assert_eq!(rows[2], &[0, 7, 7, 0]);
    }

    #[test]
    fn test_null_image() {
        let img: Image<u8> = Image::default();
        assert!(img.is_null());
        assert_eq!(img.rect(), None);
    }
}
