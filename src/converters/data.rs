//! JSON → XML.
//!
//! Mapping:
//!
//! * the document is wrapped in a `<root>` element,
//! * object members become child elements named after the key (sanitised
//!   into a valid XML name),
//! * array elements become repeated `<item>` children,
//! * scalars become escaped text content,
//! * `null` becomes an empty element with `nil="true"`.

use crate::converter::{read_to_vec, run_blocking, write_all_and_flush, Converter, TransformContext};
use crate::error::TransformError;
use crate::format::{FormatPair, FormatTag};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use tokio::io::{AsyncRead, AsyncWrite};

const ROOT_ELEMENT: &str = "root";
const ARRAY_ITEM_ELEMENT: &str = "item";

#[derive(Debug, Clone)]
pub struct JsonToXml {
    pair: FormatPair,
}

impl JsonToXml {
    pub fn new() -> Self {
        Self {
            pair: FormatPair::new(FormatTag::known("json"), FormatTag::known("xml")),
        }
    }
}

impl Default for JsonToXml {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for JsonToXml {
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
        let xml = run_blocking(move || {
            let value: Value = serde_json::from_slice(&bytes).map_err(TransformError::read)?;
            Ok(json_to_xml(&value))
        })
        .await?;
        write_all_and_flush(target, xml.as_bytes()).await
    }
}

pub fn json_to_xml(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    write_element(&mut out, ROOT_ELEMENT, value, 0);
    out
}

fn write_element(out: &mut String, name: &str, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    // Writing to a String cannot fail.
    let _ = match value {
        Value::Null => writeln!(out, "{indent}<{name} nil=\"true\" />"),
        Value::Bool(b) => writeln!(out, "{indent}<{name}>{b}</{name}>"),
        Value::Number(n) => writeln!(out, "{indent}<{name}>{n}</{name}>"),
        Value::String(s) => writeln!(out, "{indent}<{name}>{}</{name}>", escape_text(s)),
        Value::Array(items) if items.is_empty() => writeln!(out, "{indent}<{name} />"),
        Value::Object(members) if members.is_empty() => writeln!(out, "{indent}<{name} />"),
        Value::Array(items) => {
            let _ = writeln!(out, "{indent}<{name}>");
            for item in items {
                write_element(out, ARRAY_ITEM_ELEMENT, item, depth + 1);
            }
            writeln!(out, "{indent}</{name}>")
        }
        Value::Object(members) => {
            let _ = writeln!(out, "{indent}<{name}>");
            for (key, member) in members {
                write_element(out, &element_name(key), member, depth + 1);
            }
            writeln!(out, "{indent}</{name}>")
        }
    };
}

/// Make `key` a valid XML element name: invalid characters become `_`, and
/// names not starting with a letter or `_` get an `element_` prefix.
fn element_name(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => cleaned,
        _ => format!("element_{cleaned}"),
    }
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn object_array_and_scalars() {
        let xml = json_to_xml(&json!({
            "name": "Ada & Co",
            "tags": ["a", 2, true],
            "owner": null,
            "empty": {}
        }));
        let expected = [
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            "<root>",
            "  <name>Ada &amp; Co</name>",
            "  <tags>",
            "    <item>a</item>",
            "    <item>2</item>",
            "    <item>true</item>",
            "  </tags>",
            r#"  <owner nil="true" />"#,
            "  <empty />",
            "</root>",
            "",
        ]
        .join("\n");
        assert_eq!(xml, expected);
    }

    #[test]
    fn top_level_scalar() {
        assert!(json_to_xml(&json!(3.5)).ends_with("<root>3.5</root>\n"));
    }

    #[rstest]
    #[case("name", "name")]
    #[case("first name", "first_name")]
    #[case("1st", "element_1st")]
    #[case("", "element_")]
    #[case("_id", "_id")]
    #[case("a<b>", "a_b_")]
    fn element_names(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(element_name(key), expected);
    }

    #[test]
    fn control_characters_are_replaced() {
        assert_eq!(escape_text("a\u{1}b\tc"), "a\u{FFFD}b\tc");
    }

    #[tokio::test]
    async fn invalid_json_is_a_read_error() {
        let c = JsonToXml::new();
        for input in [&b"{ not json"[..], b""] {
            let ctx = TransformContext::detached(&c, input.len() as u64);
            let mut src = input;
            let mut out = Vec::new();
            let err = c.transform(&mut src, &mut out, &ctx).await.unwrap_err();
            assert_eq!(err.stage, Stage::Read);
            assert!(out.is_empty());
        }
    }
}
