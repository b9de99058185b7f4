//! Reference converters shipped with the crate.
//!
//! Each one is a thin wrapper over a library that exercises the pipeline
//! end to end.
//! Hosts are free to ignore [`builtin_descriptors`] and register their own.
//!
//! | Pair | Converter | Backend |
//! |------|-----------|---------|
//! | `txt → pdf` | [`TextToPdf`] | `lopdf` |
//! | `pdf → txt` | [`PdfToText`] | `lopdf` content decoding |
//! | `png ⇄ jpg`, `png ⇄ bmp`, `webp → png/jpg` | [`RasterConverter`] | `image` |
//! | `md → html` | [`MarkdownToHtml`] | `comrak` |
//! | `json → xml` | [`JsonToXml`] | `serde_json` |

pub mod data;
pub mod markdown;
pub mod raster;
pub mod text;

pub use self::data::JsonToXml;
pub use self::markdown::MarkdownToHtml;
pub use self::raster::RasterConverter;
pub use self::text::{PdfToText, TextToPdf};

use crate::registry::ConverterDescriptor;
use image::ImageFormat;

/// Descriptors for every reference converter.
pub fn builtin_descriptors() -> Vec<ConverterDescriptor> {
    let image_pair = |source: ImageFormat, target: ImageFormat| {
        let src = raster::tag_for(source);
        let dst = raster::tag_for(target);
        ConverterDescriptor::new(src.as_str(), dst.as_str(), move || {
            RasterConverter::new(source, target)
        })
    };

    vec![
        ConverterDescriptor::new("txt", "pdf", TextToPdf::new),
        ConverterDescriptor::new("pdf", "txt", PdfToText::new),
        ConverterDescriptor::new("md", "html", MarkdownToHtml::new),
        ConverterDescriptor::new("json", "xml", JsonToXml::new),
        image_pair(ImageFormat::Png, ImageFormat::Jpeg),
        image_pair(ImageFormat::Jpeg, ImageFormat::Png),
        image_pair(ImageFormat::Png, ImageFormat::Bmp),
        image_pair(ImageFormat::Bmp, ImageFormat::Png),
        image_pair(ImageFormat::WebP, ImageFormat::Png),
        image_pair(ImageFormat::WebP, ImageFormat::Jpeg),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::registry::ConverterRegistry;

    #[test]
    fn builtins_register_cleanly() {
        let (reg, errors) =
            ConverterRegistry::from_descriptors(builtin_descriptors(), DuplicatePolicy::Reject);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(reg.len(), 10);
        assert!(reg.contains("TXT", "pdf"));
        assert!(reg.contains("webp", "jpg"));
        assert!(!reg.contains("jpg", "webp"));
    }

    #[tokio::test]
    async fn every_builtin_honours_its_pair() {
        let (reg, _) =
            ConverterRegistry::from_descriptors(builtin_descriptors(), DuplicatePolicy::Reject);
        for entry in reg.iter() {
            let converter = (entry.factory())().unwrap();
            assert!(
                converter.can_convert(&entry.pair().source, &entry.pair().target),
                "{} does not handle {}",
                entry.name(),
                entry.pair()
            );
        }
    }
}
