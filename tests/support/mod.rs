pub mod mock_backend;

pub use mock_backend::{BackendCall, MockBackend};

use bytes::Bytes;
use std::io::Cursor;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A small decodable PNG for exercising real derivation in tests
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    use image::{DynamicImage, ImageFormat, RgbImage};

    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        image::Rgb([40, 110, 180]),
    ));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    Bytes::from(out)
}
