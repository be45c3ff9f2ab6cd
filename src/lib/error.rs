//! Error types for building and scaling a program.

use thiserror::Error;

/// A work envelope dimension that can't be fitted to.
#[derive(Error, Debug, PartialEq)]
pub enum EnvelopeError {
    #[error("Envelope {axis} must be a positive number of mm, got {value}")]
    NonPositive { axis: &'static str, value: f64 },
}

/// Errors loading a stroke font.
#[derive(Error, Debug)]
pub enum FontError {
    #[error("Font XML could not be parsed: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Font has no <{0}> element")]
    MissingElement(&'static str),

    #[error("Attribute {attribute} is missing or invalid on <{element}>")]
    BadAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Glyph '{glyph}' has a malformed path near {token:?}")]
    BadPath { glyph: char, token: String },
}
