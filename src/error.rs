//! Error handling.
//!
//! Conversion work touches a lot of things that can go wrong: a missing ICC
//! profile, an engine that is too old, an image whose declared dimensions
//! don't match its buffer. This module collects the taxonomy described in
//! the system's error handling design into a single enum.

use std::fmt;

/// A wrapper type for `pdf-recolor` errors.
pub type Result<T> = core::result::Result<T, Error>;

/// An error produced while converting colors in a PDF document.
#[derive(Debug)]
pub enum Error {
    /// The color engine is older than the minimum version a converter
    /// advertises. Fatal at construction.
    UnsupportedEngineVersion {
        /// The role that rejected the engine (e.g. `"ImageConverter"`).
        converter: &'static str,
        /// The minimum LittleCMS-encoded version required.
        required: u32,
        /// The LittleCMS-encoded version actually reported by the engine.
        found: u32,
    },
    /// A non-Lab color space was used without an embedded ICC profile.
    MissingProfile {
        /// A short description of the conversion job that needed the profile.
        context: String,
    },
    /// Image dimensions, bit depth or channel count are inconsistent with
    /// the supplied buffer length.
    BadInput(String),
    /// The color engine returned a null handle or raised an internal error.
    EngineError(String),
    /// The policy rejected the requested combination of spaces/intents.
    PolicyRejected(String),
    /// A worker exited or returned an error result; not retried.
    WorkerFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedEngineVersion {
                converter,
                required,
                found,
            } => write!(
                f,
                "{converter} requires color engine version >= {required}, found {found}"
            ),
            Error::MissingProfile { context } => {
                write!(f, "missing ICC profile for conversion: {context}")
            }
            Error::BadInput(msg) => write!(f, "bad input: {msg}"),
            Error::EngineError(msg) => write!(f, "color engine error: {msg}"),
            Error::PolicyRejected(msg) => write!(f, "policy rejected conversion: {msg}"),
            Error::WorkerFailed(msg) => write!(f, "worker failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<lcms2::Error> for Error {
    fn from(value: lcms2::Error) -> Self {
        Error::EngineError(value.to_string())
    }
}

/// A non-fatal diagnostic raised while parsing a content stream.
///
/// Unlike [`Error`], a [`ParseWarning`] never aborts the conversion of the
/// stream it was raised in (§7: "skipped, counter incremented, not fatal").
/// It is surfaced through the diagnostics collector and aggregated into
/// `PageResult::warnings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// Byte offset in the source content stream where the warning occurred.
    pub offset: usize,
    /// Human-readable description (e.g. "unrecognized color space /Foo").
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "content stream warning at byte {}: {}",
            self.offset, self.message
        )
    }
}
