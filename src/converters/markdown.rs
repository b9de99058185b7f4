//! Markdown → standalone HTML page via `comrak`.

use crate::converter::{read_to_vec, write_all_and_flush, Converter, TransformContext};
use crate::error::TransformError;
use crate::format::{FormatPair, FormatTag};
use async_trait::async_trait;
use comrak::{markdown_to_html, Options};
use tokio::io::{AsyncRead, AsyncWrite};

const STYLE: &str = "body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; \
line-height: 1.6; max-width: 800px; margin: 0 auto; padding: 20px; color: #24292e; }\n\
    pre { background: #f6f8fa; padding: 16px; overflow: auto; }\n\
    code { font-family: Menlo, Consolas, monospace; }\n\
    table { border-collapse: collapse; }\n\
    th, td { border: 1px solid #dfe2e5; padding: 6px 13px; }\n\
    blockquote { color: #6a737d; border-left: 0.25em solid #dfe2e5; margin: 0; padding: 0 1em; }";

/// Renders CommonMark plus the GitHub extensions (tables, strikethrough,
/// task lists, autolinks) and wraps the result in a complete HTML document.
#[derive(Debug, Clone)]
pub struct MarkdownToHtml {
    pair: FormatPair,
}

impl MarkdownToHtml {
    pub fn new() -> Self {
        Self {
            pair: FormatPair::new(FormatTag::known("md"), FormatTag::known("html")),
        }
    }
}

impl Default for MarkdownToHtml {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for MarkdownToHtml {
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
        _ctx: &TransformContext,
    ) -> Result<(), TransformError> {
        let bytes = read_to_vec(source).await?;
        let markdown = String::from_utf8(bytes).map_err(TransformError::read)?;
        let body = render_body(&markdown);

        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"UTF-8\">\n  \
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n  \
             <title>Converted Markdown</title>\n  <style>\n    {STYLE}\n  </style>\n</head>\n\
             <body>\n{body}</body>\n</html>\n"
        );
        write_all_and_flush(target, html.as_bytes()).await
    }
}

fn render_body(markdown: &str) -> String {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options.extension.autolink = true;
    markdown_to_html(markdown, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    async fn render(md: &[u8]) -> Result<String, TransformError> {
        let c = MarkdownToHtml::new();
        let ctx = TransformContext::detached(&c, md.len() as u64);
        let mut src = md;
        let mut out = Vec::new();
        c.transform(&mut src, &mut out, &ctx).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn renders_full_document() {
        let html = render(b"# Title\n\nSome *text*.").await.unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[tokio::test]
    async fn github_tables() {
        let html = render(b"| a | b |\n|---|---|\n| 1 | 2 |\n").await.unwrap();
        assert!(html.contains("<table>"), "{html}");
    }

    #[tokio::test]
    async fn empty_markdown_is_an_empty_page() {
        let html = render(b"").await.unwrap();
        assert!(html.contains("<body>\n</body>"));
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_read_error() {
        let err = render(&[0xff, 0xfe, 0x00]).await.unwrap_err();
        assert_eq!(err.stage, Stage::Read);
    }
}
