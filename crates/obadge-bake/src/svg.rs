//! # SVG Baking
//!
//! The credential is stored base64-encoded inside an
//! `<openbadges:credential verify="...">` element placed just before the
//! root's closing `</svg>` tag. The root gets an
//! `xmlns:openbadges="https://purl.imsglobal.org/ob/v3p0"` declaration if it
//! lacks one. Re-baking replaces the existing element.
//!
//! Edits are splices at byte offsets reported by the streaming parser, so
//! markup outside the inserted element and namespace attribute is left
//! exactly as it was.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::BakeError;

/// OpenBadges 3.0 XML namespace.
pub const OPENBADGES_NS: &str = "https://purl.imsglobal.org/ob/v3p0";

const CREDENTIAL_TAG: &[u8] = b"openbadges:credential";

/// Byte offsets found by one scan of the document.
#[derive(Debug, Default)]
struct Layout {
    /// Start offset and full text of the root `<svg ...>` tag.
    root: Option<(usize, usize)>,
    /// Offset of the root's closing `</svg>`.
    root_close: Option<usize>,
    /// Range of an existing credential element.
    existing: Option<(usize, usize)>,
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn scan(svg: &str) -> Result<Layout, BakeError> {
    let mut reader = Reader::from_str(svg);
    let mut layout = Layout::default();
    let mut depth = 0usize;
    let mut credential_start = None;
    loop {
        let before = position(&reader);
        let event = reader
            .read_event()
            .map_err(|e| BakeError::Svg(format!("at byte {before}: {e}")))?;
        let after = position(&reader);
        match event {
            Event::Start(e) => {
                if depth == 0 && e.local_name().as_ref() == b"svg" {
                    layout.root = Some((before, after));
                }
                if e.name().as_ref() == CREDENTIAL_TAG && credential_start.is_none() {
                    credential_start = Some(before);
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 && e.local_name().as_ref() == b"svg" {
                    return Err(BakeError::NoSvgRoot);
                }
                if e.name().as_ref() == CREDENTIAL_TAG && layout.existing.is_none() {
                    layout.existing = Some((before, after));
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == CREDENTIAL_TAG && layout.existing.is_none() {
                    if let Some(start) = credential_start.take() {
                        layout.existing = Some((start, after));
                    }
                }
                if depth == 0 && e.local_name().as_ref() == b"svg" {
                    layout.root_close = Some(before);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(layout)
}

fn credential_element(document: &[u8], verify_url: &str) -> String {
    format!(
        "<openbadges:credential verify=\"{}\">{}</openbadges:credential>",
        quick_xml::escape::escape(verify_url),
        STANDARD.encode(document)
    )
}

/// Embed `document` in `svg`.
pub fn bake(document: &[u8], svg: &[u8], verify_url: &str) -> Result<Vec<u8>, BakeError> {
    let text = std::str::from_utf8(svg).map_err(|_| BakeError::NotUtf8)?;
    let layout = scan(text)?;
    let (root_start, root_end) = layout.root.ok_or(BakeError::NoSvgRoot)?;
    let root_close = layout.root_close.ok_or(BakeError::NoSvgRoot)?;

    let element = credential_element(document, verify_url);
    let mut out = String::with_capacity(text.len() + element.len() + 128);

    // Splice the element first (it is after the root tag), then add the
    // namespace declaration inside the root tag.
    let (cut_start, cut_end, insert) = match layout.existing {
        Some((s, e)) => (s, e, element),
        None => (root_close, root_close, format!("  {element}\n")),
    };
    let root_tag = &text[root_start..root_end];
    if root_tag.contains("xmlns:openbadges") {
        out.push_str(&text[..cut_start]);
    } else {
        // Skip "<" and the (possibly prefixed) element name.
        let name_len = root_tag[1..]
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(root_tag.len() - 1);
        let ns_at = root_start + 1 + name_len;
        out.push_str(&text[..ns_at]);
        out.push_str(&format!(" xmlns:openbadges=\"{OPENBADGES_NS}\""));
        out.push_str(&text[ns_at..cut_start]);
    }
    out.push_str(&insert);
    out.push_str(&text[cut_end..]);
    tracing::trace!(bytes = document.len(), "credential baked into SVG");
    Ok(out.into_bytes())
}

/// Recover the document baked into `svg`.
///
/// An element with no text yields an empty document; only a missing element
/// is [`BakeError::MissingPayload`].
pub fn extract(svg: &[u8]) -> Result<Vec<u8>, BakeError> {
    let text = std::str::from_utf8(svg).map_err(|_| BakeError::NotUtf8)?;
    let mut reader = Reader::from_str(text);
    let mut found = false;
    let mut inside = false;
    let mut payload = String::new();
    loop {
        match reader
            .read_event()
            .map_err(|e| BakeError::Svg(e.to_string()))?
        {
            Event::Start(e) if e.name().as_ref() == CREDENTIAL_TAG => {
                found = true;
                inside = true;
            }
            Event::Empty(e) if e.name().as_ref() == CREDENTIAL_TAG => {
                found = true;
                break;
            }
            Event::Text(t) if inside => {
                let s = t.unescape().map_err(|e| BakeError::Svg(e.to_string()))?;
                payload.push_str(&s);
            }
            Event::CData(c) if inside => {
                payload.push_str(&String::from_utf8_lossy(&c));
            }
            Event::End(e) if e.name().as_ref() == CREDENTIAL_TAG => break,
            Event::Eof => break,
            _ => {}
        }
    }
    if !found {
        return Err(BakeError::MissingPayload);
    }
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| BakeError::Payload(e.to_string()))
}
