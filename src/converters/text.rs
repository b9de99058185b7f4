//! Plain text ⇄ PDF via `lopdf`.
//!
//! [`TextToPdf`] lays the text out as Helvetica 11 pt lines, one
//! `Tj`/`T*` pair per line, paginated, and lets `lopdf` serialise and
//! compress the document. [`PdfToText`] loads a document with `lopdf`,
//! decodes each page's content stream into operations and collects the
//! strings shown by `Tj`, `TJ`, `'` and `"`. It recovers text from simple,
//! text-based PDFs such as the ones [`TextToPdf`] writes; it does not
//! interpret font encodings or page layout.

use crate::converter::{read_to_vec, run_blocking, write_all_and_flush, Converter, TransformContext};
use crate::error::TransformError;
use crate::format::{FormatPair, FormatTag};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

// ── Page geometry (points) ───────────────────────────────────────────────

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 72;
const FONT_SIZE: i64 = 11;
const LEADING: i64 = 14;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
/// Helvetica averages ~0.5 em per glyph, so ~85 columns fit between margins.
const WRAP_COLUMNS: usize = 85;

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").unwrap());

// ── txt → pdf ────────────────────────────────────────────────────────────

/// Renders UTF-8 text as a paginated PDF.
///
/// Characters outside Latin-1 are replaced with `?` (the standard Helvetica
/// font has no glyphs for them). An empty source produces a single blank
/// page.
#[derive(Debug, Clone)]
pub struct TextToPdf {
    pair: FormatPair,
}

impl TextToPdf {
    pub fn new() -> Self {
        Self {
            pair: FormatPair::new(FormatTag::known("txt"), FormatTag::known("pdf")),
        }
    }
}

impl Default for TextToPdf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for TextToPdf {
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
        let pdf = run_blocking(move || render_pdf(&String::from_utf8_lossy(&bytes))).await?;
        debug!("Rendered {} PDF bytes", pdf.len());
        write_all_and_flush(target, &pdf).await
    }
}

/// Split `text` into display lines: normalise line endings, expand tabs,
/// wrap long lines at word boundaries where possible.
fn layout_lines(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let text = RE_LINE_BREAK.replace_all(text, "\n");

    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let line = raw.replace('\t', "    ");
        let chars: Vec<char> = line.chars().collect();
        if chars.len() <= WRAP_COLUMNS {
            lines.push(line);
            continue;
        }
        let mut start = 0;
        while start < chars.len() {
            let mut end = (start + WRAP_COLUMNS).min(chars.len());
            if end < chars.len() {
                if let Some(space) = chars[start..end].iter().rposition(|c| *c == ' ') {
                    if space > 0 {
                        end = start + space + 1;
                    }
                }
            }
            lines.push(chars[start..end].iter().collect());
            start = end;
        }
    }
    lines
}

/// WinAnsi bytes for `line`; Latin-1 maps through unchanged.
fn win_ansi(line: &str) -> Vec<u8> {
    line.chars()
        .map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?'))
        .collect()
}

fn page_content(lines: &[String]) -> Content {
    let top = PAGE_HEIGHT - MARGIN - FONT_SIZE;
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Integer(FONT_SIZE)]),
        Operation::new("TL", vec![Object::Integer(LEADING)]),
        Operation::new("Td", vec![Object::Integer(MARGIN), Object::Integer(top)]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(line))]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

fn render_pdf(text: &str) -> Result<Vec<u8>, TransformError> {
    let lines = layout_lines(text);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for chunk in lines.chunks(LINES_PER_PAGE) {
        let content = page_content(chunk).encode().map_err(TransformError::transform)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Converted Text Document"),
        "Producer" => Object::string_literal("fileconvert"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(TransformError::write)?;
    Ok(out)
}

// ── pdf → txt ────────────────────────────────────────────────────────────

/// Extracts text from text-based PDFs. Pages are joined with a newline.
///
/// An empty source or one `lopdf` cannot parse fails at the read stage.
/// A valid PDF with no extractable text (e.g. a scan) produces empty output.
#[derive(Debug, Clone)]
pub struct PdfToText {
    pair: FormatPair,
}

impl PdfToText {
    pub fn new() -> Self {
        Self {
            pair: FormatPair::new(FormatTag::known("pdf"), FormatTag::known("txt")),
        }
    }
}

impl Default for PdfToText {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for PdfToText {
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
        if bytes.is_empty() {
            return Err(TransformError::read("source is empty, expected a PDF document"));
        }
        ctx.check_cancelled()?;
        let text = run_blocking(move || extract_text(&bytes)).await?;
        write_all_and_flush(target, text.as_bytes()).await
    }
}

/// A `TJ` adjustment beyond this (thousandths of an em) reads as a space.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

fn extract_text(pdf: &[u8]) -> Result<String, TransformError> {
    let doc = Document::load_mem(pdf).map_err(TransformError::read)?;

    let mut pages = Vec::new();
    for (number, page_id) in doc.get_pages() {
        let data = doc.get_page_content(page_id).map_err(TransformError::read)?;
        let content = Content::decode(&data).map_err(TransformError::read)?;
        match page_text(&content.operations) {
            Some(text) => pages.push(text),
            None => debug!("Page {} shows no text", number),
        }
    }
    debug!("Extracted text from {} pages", pages.len());
    Ok(pages.join("\n"))
}

/// Text shown on one page, or `None` if it shows none. Line-positioning
/// operators and `ET` start a new line before the next shown string.
fn page_text(operations: &[Operation]) -> Option<String> {
    let mut out: Vec<u8> = Vec::new();
    let mut started = false;
    let mut pending_break = false;

    let mut show = |bytes: &[u8], out: &mut Vec<u8>, pending_break: &mut bool| {
        if *pending_break && started {
            out.push(b'\n');
        }
        *pending_break = false;
        started = true;
        out.extend_from_slice(bytes);
    };

    for op in operations {
        match op.operator.as_str() {
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show(bytes.as_slice(), &mut out, &mut pending_break);
                }
            }
            "'" => {
                pending_break = true;
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show(bytes.as_slice(), &mut out, &mut pending_break);
                }
            }
            "\"" => {
                pending_break = true;
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    show(bytes.as_slice(), &mut out, &mut pending_break);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    show(array_text(items).as_slice(), &mut out, &mut pending_break);
                }
            }
            "T*" | "Td" | "TD" | "ET" => pending_break = true,
            _ => {}
        }
    }

    started.then(|| latin1(&out))
}

fn array_text(items: &[Object]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in items {
        let adjust = match item {
            Object::String(bytes, _) => {
                out.extend_from_slice(bytes);
                continue;
            }
            Object::Integer(n) => *n as f32,
            Object::Real(r) => *r as f32,
            _ => continue,
        };
        if adjust < TJ_SPACE_THRESHOLD && out.last() != Some(&b' ') {
            out.push(b' ');
        }
    }
    out
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    fn roundtrip(text: &str) -> String {
        extract_text(&render_pdf(text).unwrap()).unwrap()
    }

    /// A one-page document whose content stream is `content`, verbatim.
    fn pdf_with_content(content: &[u8]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn hello_survives_roundtrip() {
        let pdf = render_pdf("Hello").unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));
        assert_eq!(extract_text(&pdf).unwrap(), "Hello");
    }

    #[test]
    fn lines_and_blank_lines_are_kept() {
        assert_eq!(roundtrip("one\n\nthree\n"), "one\n\nthree\n");
        assert_eq!(roundtrip("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn special_characters_are_escaped() {
        assert_eq!(roundtrip(r"f(x) = \alpha"), r"f(x) = \alpha");
        assert_eq!(roundtrip("café"), "café");
        assert_eq!(roundtrip("日本"), "??");
    }

    #[test]
    fn long_text_is_paginated() {
        let text: Vec<String> = (1..=100).map(|i| format!("line {i}")).collect();
        let text = text.join("\n");
        let pdf = render_pdf(&text).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 100usize.div_ceil(LINES_PER_PAGE));
        assert_eq!(extract_text(&pdf).unwrap(), text);
    }

    #[test]
    fn long_lines_wrap_at_spaces() {
        let line = "word ".repeat(40);
        let lines = layout_lines(line.trim_end());
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= WRAP_COLUMNS));
        assert!(lines[0].ends_with(' '));
    }

    #[test]
    fn empty_text_is_one_blank_page() {
        let pdf = render_pdf("").unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(extract_text(&pdf).unwrap(), "");
    }

    #[test]
    fn balanced_parentheses_in_literal_strings() {
        let pdf = pdf_with_content(b"BT /F1 12 Tf 72 700 Td (f(x)) Tj ET");
        assert_eq!(extract_text(&pdf).unwrap(), "f(x)");
    }

    #[test]
    fn reads_tj_arrays_and_hex_strings_from_compressed_streams() {
        let pdf = pdf_with_content(
            b"BT /F1 12 Tf 72 700 Td [(Hel) -20 (lo) -300 (World)] TJ T* <4279650A> Tj ET",
        );
        assert_eq!(extract_text(&pdf).unwrap(), "Hello World\nBye\n");
    }

    #[test]
    fn page_without_text_is_skipped() {
        let pdf = pdf_with_content(b"0 0 m 100 100 l S");
        assert_eq!(extract_text(&pdf).unwrap(), "");
    }

    #[test]
    fn non_pdf_is_a_read_error() {
        let err = extract_text(b"just some text").unwrap_err();
        assert_eq!(err.stage, Stage::Read);
    }

    #[tokio::test]
    async fn empty_source_is_a_read_error() {
        let c = PdfToText::new();
        let ctx = TransformContext::detached(&c, 0);
        let mut src: &[u8] = b"";
        let mut out = Vec::new();
        let err = c.transform(&mut src, &mut out, &ctx).await.unwrap_err();
        assert_eq!(err.stage, Stage::Read);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn text_to_pdf_transform_writes_pdf() {
        let c = TextToPdf::new();
        let ctx = TransformContext::detached(&c, 5);
        let mut src: &[u8] = b"Hello";
        let mut out = Vec::new();
        c.transform(&mut src, &mut out, &ctx).await.unwrap();
        assert!(out.starts_with(b"%PDF-"));
        assert_eq!(c.name(), "TextToPdf");
    }
}
