//! FB2 cover lookup.
//!
//! FictionBook files embed images as base64 text in `<binary>` elements and
//! point to the cover from `<coverpage><image l:href="#id"/></coverpage>`.
//! Real-world files are often not well-formed XML, so the document is scanned
//! with byte-level patterns instead of being parsed. Working on bytes also
//! keeps non-UTF-8 documents (windows-1251 is common) searchable.

use crate::covers::sniff;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::bytes::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// How a cover was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStrategy {
    /// `<coverpage>` reference through `l:href`.
    LHref,
    /// `<coverpage>` reference through `xlink:href`.
    XlinkHref,
    /// `<coverpage>` reference through a bare `href`.
    Href,
    /// First `<binary>` that sniffs as an image.
    FirstImage,
}

impl CoverStrategy {
    fn for_attr(attr: &str) -> Self {
        match attr {
            "l:href" => Self::LHref,
            "xlink:href" => Self::XlinkHref,
            _ => Self::Href,
        }
    }
}

/// A cover image and the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedCover {
    /// Which lookup matched.
    pub strategy: CoverStrategy,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

/// Finds the cover image inside a book document.
pub trait CoverLocator: Send + Sync {
    /// Locate the cover image, if one can be found.
    fn locate(&self, content: &[u8]) -> Option<LocatedCover>;

    /// Return the raw bytes of the cover image.
    fn find_cover(&self, content: &[u8]) -> Option<Vec<u8>> {
        self.locate(content).map(|cover| cover.data)
    }
}

/// Pattern-based FB2 cover locator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fb2CoverLocator;

/// Href attribute spellings, in lookup order.
const HREF_SYNTAXES: [&str; 3] = ["l:href", "xlink:href", "href"];

static COVERPAGE_PATTERNS: LazyLock<Vec<(CoverStrategy, Regex)>> = LazyLock::new(|| {
    HREF_SYNTAXES
        .iter()
        .filter_map(|&attr| {
            let pattern = format!(
                r#"(?is-u)<coverpage>.*?<image[^>]*{}\s*=\s*["']#([^"']+)["'][^>]*>.*?</coverpage>"#,
                regex::escape(attr)
            );
            Regex::new(&pattern)
                .ok()
                .map(|re| (CoverStrategy::for_attr(attr), re))
        })
        .collect()
});

static ANY_BINARY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is-u)<binary[^>]*>([^<]*)</binary>").ok());

/// Decoder that, like most FB2 readers, ignores missing padding and stray bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

impl CoverLocator for Fb2CoverLocator {
    fn locate(&self, content: &[u8]) -> Option<LocatedCover> {
        if content.is_empty() {
            return None;
        }

        for (strategy, pattern) in COVERPAGE_PATTERNS.iter() {
            let strategy = *strategy;
            let Some(id) = pattern
                .captures(content)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_bytes())
            else {
                continue;
            };

            // The referenced binary is trusted as the cover without sniffing it.
            if let Some(data) = binary_by_id(content, id) {
                tracing::debug!(
                    ?strategy,
                    id = %String::from_utf8_lossy(id),
                    bytes = data.len(),
                    "Resolved coverpage reference"
                );
                return Some(LocatedCover { strategy, data });
            }
        }

        first_image_binary(content).map(|data| LocatedCover {
            strategy: CoverStrategy::FirstImage,
            data,
        })
    }
}

/// Decode the `<binary>` element whose id matches `id`.
fn binary_by_id(content: &[u8], id: &[u8]) -> Option<Vec<u8>> {
    let id = escape_bytes(id);
    let head = format!(r#"(?is-u)<binary[^>]*id\s*=\s*["']{id}["']"#);

    let with_type = Regex::new(&format!(
        r#"{head}[^>]*content-type\s*=\s*["']([^"']+)["'][^>]*>([^<]*)</binary>"#
    ));
    if let Ok(re) = with_type
        && let Some(caps) = re.captures(content)
        && let Some(body) = caps.get(2)
    {
        if let Some(mime) = caps.get(1) {
            tracing::trace!(content_type = %String::from_utf8_lossy(mime.as_bytes()), "Cover binary");
        }
        if let Some(data) = decode_base64(body.as_bytes()) {
            return Some(data);
        }
    }

    let without_type = Regex::new(&format!(r#"{head}[^>]*>([^<]*)</binary>"#));
    if let Ok(re) = without_type
        && let Some(body) = re.captures(content).and_then(|caps| caps.get(1))
    {
        return decode_base64(body.as_bytes());
    }

    None
}

/// Scan every `<binary>` in document order for the first real image.
fn first_image_binary(content: &[u8]) -> Option<Vec<u8>> {
    let re = ANY_BINARY.as_ref()?;

    re.captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| decode_base64(body.as_bytes()))
        .find(|data| sniff::classify(data).is_some())
}

/// Decode a base64 body, skipping whitespace and any non-alphabet bytes.
///
/// Returns `None` on decode errors and on empty output.
fn decode_base64(body: &[u8]) -> Option<Vec<u8>> {
    let cleaned: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();

    match LENIENT_BASE64.decode(&cleaned) {
        Ok(data) if !data.is_empty() => Some(data),
        _ => None,
    }
}

/// Escape arbitrary bytes for a `(?-u)` pattern.
fn escape_bytes(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for &b in raw {
        if b.is_ascii_alphanumeric() {
            out.push(b as char);
        } else {
            out.push_str(&format!(r"\x{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(fill: u8) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.resize(300, fill);
        data
    }

    fn encode(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    fn fb2_with_cover(href_attr: &str, cover: &[u8]) -> String {
        format!(
            r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info>
<book-title>Test</book-title>
<coverpage><image {href_attr}="#cover.jpg"/></coverpage>
</title-info></description>
<body><section><p>Text</p></section></body>
<binary id="other.png" content-type="image/png">{other}</binary>
<binary id="cover.jpg" content-type="image/jpeg">
{cover}
</binary>
</FictionBook>"##,
            other = encode(&fake_jpeg(7)),
            cover = encode(cover),
        )
    }

    #[test]
    fn test_href_syntaxes_resolve_same_cover() {
        let cover = fake_jpeg(1);
        for attr in ["l:href", "xlink:href", "href"] {
            let doc = fb2_with_cover(attr, &cover);
            assert_eq!(
                Fb2CoverLocator.find_cover(doc.as_bytes()),
                Some(cover.clone()),
                "{attr}"
            );
        }
    }

    #[test]
    fn test_strategy_reports_matched_lookup() {
        let cover = fake_jpeg(11);
        for (attr, strategy) in [
            ("l:href", CoverStrategy::LHref),
            ("xlink:href", CoverStrategy::XlinkHref),
            ("href", CoverStrategy::Href),
        ] {
            let doc = fb2_with_cover(attr, &cover);
            let located = Fb2CoverLocator.locate(doc.as_bytes()).unwrap();
            assert_eq!(located.strategy, strategy, "{attr}");
        }

        let doc = format!("<binary id=\"only\">{}</binary>", encode(&cover));
        let located = Fb2CoverLocator.locate(doc.as_bytes()).unwrap();
        assert_eq!(located.strategy, CoverStrategy::FirstImage);
        assert_eq!(located.data, cover);
    }

    #[test]
    fn test_binary_without_content_type() {
        let cover = fake_jpeg(2);
        let doc = format!(
            r##"<FictionBook><description><coverpage><image l:href = '#c1'/></coverpage></description>
<binary id='c1'>{}</binary></FictionBook>"##,
            encode(&cover)
        );
        assert_eq!(Fb2CoverLocator.find_cover(doc.as_bytes()), Some(cover));
    }

    #[test]
    fn test_content_type_before_id() {
        let cover = fake_jpeg(3);
        let doc = format!(
            r##"<coverpage><image l:href="#img"/></coverpage>
<binary content-type="image/jpeg" id="img">{}</binary>"##,
            encode(&cover)
        );
        assert_eq!(Fb2CoverLocator.find_cover(doc.as_bytes()), Some(cover));
    }

    #[test]
    fn test_case_insensitive_tags() {
        let cover = fake_jpeg(4);
        let doc = format!(
            r##"<COVERPAGE><IMAGE L:HREF="#Cover"/></COVERPAGE>
<BINARY ID="Cover" CONTENT-TYPE="image/jpeg">{}</BINARY>"##,
            encode(&cover)
        );
        assert_eq!(Fb2CoverLocator.find_cover(doc.as_bytes()), Some(cover));
    }

    #[test]
    fn test_referenced_binary_is_not_sniffed() {
        let not_an_image = b"plain text payload".to_vec();
        let doc = format!(
            r##"<coverpage><image l:href="#c"/></coverpage>
<binary id="x" content-type="image/jpeg">{}</binary>
<binary id="c" content-type="image/jpeg">{}</binary>"##,
            encode(&fake_jpeg(9)),
            encode(&not_an_image)
        );
        assert_eq!(Fb2CoverLocator.find_cover(doc.as_bytes()), Some(not_an_image));
    }

    #[test]
    fn test_fallback_returns_first_valid_image() {
        let wanted = fake_jpeg(5);
        let mut doc = String::from("<FictionBook><description></description>");
        doc.push_str("<binary id=\"a\">not base64 at all!!</binary>");
        doc.push_str(&format!("<binary id=\"b\">{}</binary>", encode(b"short")));
        doc.push_str(&format!(
            "<binary id=\"c\">{}</binary>",
            encode(&[b'x'; 400])
        ));
        doc.push_str(&format!("<binary id=\"d\">{}</binary>", encode(&wanted)));
        doc.push_str(&format!(
            "<binary id=\"e\">{}</binary>",
            encode(&fake_jpeg(6))
        ));
        doc.push_str("</FictionBook>");

        assert_eq!(Fb2CoverLocator.find_cover(doc.as_bytes()), Some(wanted));
    }

    #[test]
    fn test_dangling_reference_falls_back() {
        let image = fake_jpeg(8);
        let doc = format!(
            r##"<coverpage><image l:href="#missing"/></coverpage>
<binary id="present">{}</binary>"##,
            encode(&image)
        );
        assert_eq!(Fb2CoverLocator.find_cover(doc.as_bytes()), Some(image));
    }

    #[test]
    fn test_non_utf8_document() {
        let cover = fake_jpeg(10);
        let mut doc = b"<?xml version=\"1.0\" encoding=\"windows-1251\"?><book-title>".to_vec();
        doc.extend_from_slice(&[0xCA, 0xED, 0xE8, 0xE3, 0xE0]);
        doc.extend_from_slice(b"</book-title><coverpage><image l:href=\"#c\"/></coverpage>");
        doc.extend_from_slice(format!("<binary id=\"c\">{}</binary>", encode(&cover)).as_bytes());
        assert_eq!(Fb2CoverLocator.find_cover(&doc), Some(cover));
    }

    #[test]
    fn test_no_cover() {
        assert_eq!(Fb2CoverLocator.find_cover(b""), None);
        assert_eq!(
            Fb2CoverLocator.find_cover(b"<FictionBook><body><p>No images</p></body></FictionBook>"),
            None
        );
    }

    #[test]
    fn test_decode_base64_skips_whitespace() {
        assert_eq!(decode_base64(b" aGVs\nbG8=\r\n"), Some(b"hello".to_vec()));
        assert_eq!(decode_base64(b"aGVsbG8"), Some(b"hello".to_vec()));
        assert_eq!(decode_base64(b"   "), None);
    }
}
