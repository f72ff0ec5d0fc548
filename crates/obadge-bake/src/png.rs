//! # PNG Baking
//!
//! The credential rides in an `iTXt` chunk with keyword `openbadges`,
//! uncompressed, with empty language tag and translated keyword, inserted
//! just before `IEND`. Any earlier `openbadges` text chunk (`tEXt` or
//! `iTXt`) is dropped so an image never carries two payloads. Bytes some
//! tools append after `IEND` are not PNG data; they are ignored on read and
//! carried over unchanged on re-bake.
//!
//! Older badges carry only the hosted credential URL in a `tEXt` chunk;
//! [`bake_url`] writes that form and [`extract_payload`] reads both.
//!
//! ## Security Invariant
//!
//! Every chunk's CRC-32 is checked on read. A corrupted image is rejected
//! rather than partially trusted.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::BakeError;

/// The eight-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

const KEYWORD: &[u8] = b"openbadges";

/// Refuse to inflate compressed payloads beyond this many bytes.
const MAX_PAYLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// What an `openbadges` chunk carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PngPayload {
    /// The full credential document (`iTXt`).
    Document(Vec<u8>),
    /// A hosted credential URL (`tEXt`).
    Url(String),
}

#[derive(Debug, Clone)]
struct Chunk {
    kind: [u8; 4],
    data: Vec<u8>,
}

impl Chunk {
    fn name(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }

    fn crc(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.kind);
        hasher.update(&self.data);
        hasher.finalize()
    }

    fn is_openbadges_text(&self) -> bool {
        matches!(&self.kind, b"tEXt" | b"iTXt")
            && self.data.len() > KEYWORD.len()
            && self.data.starts_with(KEYWORD)
            && self.data[KEYWORD.len()] == 0
    }
}

fn parse(png: &[u8]) -> Result<Vec<Chunk>, BakeError> {
    parse_with_trailer(png).map(|(chunks, _)| chunks)
}

/// Split `png` into its chunks and whatever bytes follow `IEND`.
fn parse_with_trailer(png: &[u8]) -> Result<(Vec<Chunk>, &[u8]), BakeError> {
    if !png.starts_with(&PNG_SIGNATURE) {
        return Err(BakeError::Png("missing PNG signature".into()));
    }
    let mut chunks = Vec::new();
    let mut rest = &png[PNG_SIGNATURE.len()..];
    while !rest.is_empty() {
        if rest.len() < 12 {
            return Err(BakeError::Png("truncated chunk header".into()));
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if rest.len() < 12 + len {
            return Err(BakeError::Png("chunk runs past end of file".into()));
        }
        let kind = [rest[4], rest[5], rest[6], rest[7]];
        let data = rest[8..8 + len].to_vec();
        let stored = u32::from_be_bytes([
            rest[8 + len],
            rest[9 + len],
            rest[10 + len],
            rest[11 + len],
        ]);
        let chunk = Chunk { kind, data };
        if chunk.crc() != stored {
            return Err(BakeError::BadCrc { chunk: chunk.name() });
        }
        rest = &rest[12 + len..];
        let end = &chunk.kind == b"IEND";
        chunks.push(chunk);
        if end {
            break;
        }
    }
    match chunks.first() {
        Some(c) if &c.kind == b"IHDR" => {}
        _ => return Err(BakeError::Png("first chunk is not IHDR".into())),
    }
    match chunks.last() {
        Some(c) if &c.kind == b"IEND" => {}
        _ => return Err(BakeError::Png("missing IEND chunk".into())),
    }
    if !rest.is_empty() {
        tracing::debug!(bytes = rest.len(), "data after IEND");
    }
    Ok((chunks, rest))
}

fn serialize(chunks: &[Chunk]) -> Result<Vec<u8>, BakeError> {
    let total: usize = chunks.iter().map(|c| c.data.len() + 12).sum();
    let mut out = Vec::with_capacity(PNG_SIGNATURE.len() + total);
    out.extend_from_slice(&PNG_SIGNATURE);
    for chunk in chunks {
        let len = u32::try_from(chunk.data.len())
            .map_err(|_| BakeError::Png(format!("{} chunk too large", chunk.name())))?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&chunk.kind);
        out.extend_from_slice(&chunk.data);
        out.extend_from_slice(&chunk.crc().to_be_bytes());
    }
    Ok(out)
}

fn replace_payload(png: &[u8], payload: Chunk) -> Result<Vec<u8>, BakeError> {
    let (mut chunks, trailer) = parse_with_trailer(png)?;
    chunks.retain(|c| !c.is_openbadges_text());
    // IEND is guaranteed to be last.
    let iend = chunks.len() - 1;
    chunks.insert(iend, payload);
    // Bytes after IEND are carried over untouched.
    let mut out = serialize(&chunks)?;
    out.extend_from_slice(trailer);
    Ok(out)
}

/// Embed the full credential `document` in `png`.
pub fn bake(document: &[u8], png: &[u8]) -> Result<Vec<u8>, BakeError> {
    // keyword NUL flag(0) method(0) language NUL translated-keyword NUL text
    let mut data = Vec::with_capacity(KEYWORD.len() + 5 + document.len());
    data.extend_from_slice(KEYWORD);
    data.extend_from_slice(&[0, 0, 0, 0, 0]);
    data.extend_from_slice(document);
    let baked = replace_payload(png, Chunk { kind: *b"iTXt", data })?;
    tracing::trace!(bytes = document.len(), "credential baked into PNG");
    Ok(baked)
}

/// Embed only the hosted credential `url` in `png`.
pub fn bake_url(url: &str, png: &[u8]) -> Result<Vec<u8>, BakeError> {
    if !url.is_ascii() {
        return Err(BakeError::Payload("tEXt payload must be ASCII".into()));
    }
    let mut data = Vec::with_capacity(KEYWORD.len() + 1 + url.len());
    data.extend_from_slice(KEYWORD);
    data.push(0);
    data.extend_from_slice(url.as_bytes());
    replace_payload(png, Chunk { kind: *b"tEXt", data })
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let at = data.iter().position(|b| *b == 0)?;
    Some((&data[..at], &data[at + 1..]))
}

fn decode_itxt(data: &[u8]) -> Result<Vec<u8>, BakeError> {
    let malformed = || BakeError::Payload("malformed iTXt chunk".into());
    let (_, rest) = split_nul(data).ok_or_else(malformed)?;
    if rest.len() < 2 {
        return Err(malformed());
    }
    let (compressed, method) = (rest[0], rest[1]);
    let (_, rest) = split_nul(&rest[2..]).ok_or_else(malformed)?;
    let (_, text) = split_nul(rest).ok_or_else(malformed)?;
    match (compressed, method) {
        (0, _) => Ok(text.to_vec()),
        (1, 0) => {
            let mut out = Vec::new();
            ZlibDecoder::new(text)
                .take(MAX_PAYLOAD_BYTES + 1)
                .read_to_end(&mut out)
                .map_err(|e| BakeError::Payload(format!("zlib: {e}")))?;
            if out.len() as u64 > MAX_PAYLOAD_BYTES {
                return Err(BakeError::Payload("inflated payload too large".into()));
            }
            Ok(out)
        }
        _ => Err(BakeError::Payload(format!(
            "unsupported iTXt compression {compressed}/{method}"
        ))),
    }
}

/// Read the `openbadges` payload from `png`.
pub fn extract_payload(png: &[u8]) -> Result<PngPayload, BakeError> {
    let chunks = parse(png)?;
    let chunk = chunks
        .iter()
        .find(|c| c.is_openbadges_text())
        .ok_or(BakeError::MissingPayload)?;
    match &chunk.kind {
        b"iTXt" => Ok(PngPayload::Document(decode_itxt(&chunk.data)?)),
        _ => {
            let text = &chunk.data[KEYWORD.len() + 1..];
            // tEXt is Latin-1.
            Ok(PngPayload::Url(text.iter().map(|b| char::from(*b)).collect()))
        }
    }
}

/// Read the baked credential document from `png`.
///
/// Fails with [`BakeError::MissingPayload`] when the image carries only a
/// hosted URL.
pub fn extract(png: &[u8]) -> Result<Vec<u8>, BakeError> {
    match extract_payload(png)? {
        PngPayload::Document(doc) => Ok(doc),
        PngPayload::Url(url) => {
            tracing::debug!(%url, "PNG carries a credential URL, not a document");
            Err(BakeError::MissingPayload)
        }
    }
}
