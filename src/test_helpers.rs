//! Shared test utilities: synthetic encoded images.
//!
//! Fixtures are generated in memory so tests never depend on files checked
//! into the repository.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// RGB JPEG with a diagonal gradient, so resampling has something to chew on.
pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// RGBA PNG filled with one colour.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

#[test]
fn fixtures_decode_to_requested_size() {
    let jpeg = image::load_from_memory(&gradient_jpeg(40, 30)).unwrap();
    assert_eq!((jpeg.width(), jpeg.height()), (40, 30));

    let png = image::load_from_memory(&solid_png(5, 6, [0, 0, 0, 0])).unwrap();
    assert_eq!((png.width(), png.height()), (5, 6));
    assert!(png.color().has_alpha());
}
