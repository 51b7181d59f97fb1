#![forbid(unsafe_code)]

//! Color-conversion orchestration for PDF raster images and content streams.
//!
//! This crate walks a PDF document (through a small consumer-facing object
//! model interface, [`pdf_model`]) and rewrites every raster image and page
//! content stream from its source color space into a chosen destination
//! color space, typically CMYK through an ICC output profile. The actual ICC
//! math is delegated to `lcms2`; this crate is the orchestration layer
//! around it: policy selection, profile/transform caching, a composite-LUT
//! builder for multi-profile pipelines, content-stream parsing/rewriting,
//! worker fan-out, and hierarchical diagnostics.

pub mod cache;
pub mod color;
pub mod config;
pub mod converter;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod error;
pub mod lut;
pub mod page;
pub mod pdf_model;
pub mod policy;
pub mod util;
pub mod worker;

pub use color::{Cmyk, DestinationColorSpace, Gray, Lab, PdfColorSpaceKind, Rgb, Xyz};
pub use config::{ConfigOverride, Configuration};
pub use document::{Document, DocumentConversionTotals, LabColorSpaceCache, PageDescriptor};
pub use error::{Error, ParseWarning, Result};
pub use page::PageConversionTotals;
