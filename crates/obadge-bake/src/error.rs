//! # Baking Error Types

use thiserror::Error;

/// Errors from baking or extracting credential payloads.
#[derive(Error, Debug)]
pub enum BakeError {
    /// The bytes are neither a PNG nor an SVG document.
    #[error("unrecognized image format")]
    UnknownFormat,

    /// SVG input is not UTF-8.
    #[error("SVG is not valid UTF-8")]
    NotUtf8,

    /// SVG input is not well-formed XML.
    #[error("malformed SVG: {0}")]
    Svg(String),

    /// SVG has no `<svg>` root element with a closing tag.
    #[error("SVG has no <svg> root element")]
    NoSvgRoot,

    /// PNG structure is invalid.
    #[error("malformed PNG: {0}")]
    Png(String),

    /// A PNG chunk failed its CRC-32 check.
    #[error("PNG chunk {chunk} has a bad CRC")]
    BadCrc {
        /// Chunk type, e.g. `iTXt`.
        chunk: String,
    },

    /// The image carries no `openbadges` payload.
    #[error("image carries no baked credential")]
    MissingPayload,

    /// The baked payload could not be decoded.
    #[error("baked payload is not decodable: {0}")]
    Payload(String),
}
