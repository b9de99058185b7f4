//! Raster image re-encoding through the `image` crate.
//!
//! Decoding sniffs the actual container from the magic bytes, so a PNG
//! saved with a `.jpg` extension still converts. Encoding is CPU-bound and
//! runs on the blocking pool.

use crate::converter::{read_to_vec, run_blocking, write_all_and_flush, Converter, TransformContext};
use crate::error::TransformError;
use crate::format::{FormatPair, FormatTag};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// JPEG quality used for every lossy output.
pub const JPEG_QUALITY: u8 = 90;

/// The tag a format is registered under.
pub fn tag_for(format: ImageFormat) -> FormatTag {
    FormatTag::known(match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        _ => "bin",
    })
}

/// Decodes any supported raster format and re-encodes it as `target`.
#[derive(Debug, Clone)]
pub struct RasterConverter {
    pair: FormatPair,
    output: ImageFormat,
}

impl RasterConverter {
    pub fn new(source: ImageFormat, target: ImageFormat) -> Self {
        Self {
            pair: FormatPair::new(tag_for(source), tag_for(target)),
            output: target,
        }
    }
}

#[async_trait]
impl Converter for RasterConverter {
    fn source_format(&self) -> &FormatTag {
        &self.pair.source
    }

    fn target_format(&self) -> &FormatTag {
        &self.pair.target
    }

    async fn transform(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        target: &mut (dyn AsyncWrite + Unpin + Send),
        ctx: &TransformContext,
    ) -> Result<(), TransformError> {
        let bytes = read_to_vec(source).await?;
        ctx.check_cancelled()?;

        let output = self.output;
        let encoded = run_blocking(move || {
            let img = image::load_from_memory(&bytes).map_err(TransformError::read)?;
            debug!("Decoded {}x{} image", img.width(), img.height());
            encode(img, output)
        })
        .await?;

        write_all_and_flush(target, &encoded).await
    }
}

fn encode(img: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))
                .map_err(TransformError::transform)?;
        }
        ImageFormat::Bmp => {
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)
                .map_err(TransformError::transform)?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buf), other)
                .map_err(TransformError::transform)?;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use image::{Rgba, RgbaImage};

    fn sample_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([200, 10, 10, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    async fn run(c: &RasterConverter, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let ctx = TransformContext::detached(c, input.len() as u64);
        let mut src = input;
        let mut out = Vec::new();
        c.transform(&mut src, &mut out, &ctx).await.map(|_| out)
    }

    #[tokio::test]
    async fn png_to_jpg_and_back() {
        let to_jpg = RasterConverter::new(ImageFormat::Png, ImageFormat::Jpeg);
        assert_eq!(to_jpg.pair().to_string(), "png → jpg");

        let jpg = run(&to_jpg, &sample_png()).await.unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);

        let to_png = RasterConverter::new(ImageFormat::Jpeg, ImageFormat::Png);
        let png = run(&to_png, &jpg).await.unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[tokio::test]
    async fn png_to_bmp() {
        let c = RasterConverter::new(ImageFormat::Png, ImageFormat::Bmp);
        let bmp = run(&c, &sample_png()).await.unwrap();
        assert_eq!(&bmp[..2], b"BM");
    }

    #[tokio::test]
    async fn garbage_is_a_read_error() {
        let c = RasterConverter::new(ImageFormat::Png, ImageFormat::Jpeg);
        let err = run(&c, b"definitely not an image").await.unwrap_err();
        assert_eq!(err.stage, Stage::Read);

        let err = run(&c, b"").await.unwrap_err();
        assert_eq!(err.stage, Stage::Read);
    }

    #[test]
    fn tags() {
        assert_eq!(tag_for(ImageFormat::Jpeg).as_str(), "jpg");
        assert_eq!(tag_for(ImageFormat::WebP).as_str(), "webp");
    }
}
