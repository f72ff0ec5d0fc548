//! # obadge-bake: Badge Baking
//!
//! Embeds a signed credential document inside its badge image so the image
//! alone is a portable, verifiable proof of achievement.
//!
//! - SVG: base64 payload in an `<openbadges:credential>` element.
//! - PNG: raw payload in an `openbadges` `iTXt` chunk.
//!
//! Baking is lossless. [`extract`] returns exactly the bytes handed to
//! [`bake`], so the extracted document verifies exactly as the original
//! does.

#![deny(missing_docs)]

pub mod error;
pub mod png;
pub mod svg;

pub use error::BakeError;
pub use png::PngPayload;

/// Badge image formats that can carry a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Scalable Vector Graphics.
    Svg,
    /// Portable Network Graphics.
    Png,
}

impl ImageKind {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    /// Guess the kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// Sniff the image kind from its leading bytes.
pub fn detect(image: &[u8]) -> Option<ImageKind> {
    if image.starts_with(&png::PNG_SIGNATURE) {
        return Some(ImageKind::Png);
    }
    let head = &image[..image.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    let trimmed = head.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('<') && head.contains("<svg") {
        Some(ImageKind::Svg)
    } else {
        None
    }
}

/// Embed `document` in `image`. `verify_url` is advertised on SVG output.
pub fn bake(
    document: &[u8],
    image: &[u8],
    kind: ImageKind,
    verify_url: &str,
) -> Result<Vec<u8>, BakeError> {
    match kind {
        ImageKind::Svg => svg::bake(document, image, verify_url),
        ImageKind::Png => png::bake(document, image),
    }
}

/// Recover the baked document, sniffing the format.
pub fn extract(image: &[u8]) -> Result<Vec<u8>, BakeError> {
    match detect(image).ok_or(BakeError::UnknownFormat)? {
        ImageKind::Svg => svg::extract(image),
        ImageKind::Png => png::extract(image),
    }
}
