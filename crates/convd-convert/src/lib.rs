// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document conversion over the content-addressed cache.
//!
//! This crate owns the typed option set, the [`Converter`] seam to the
//! external office engine, and the [`convert_doc`] façade that consults
//! the cache before converting and registers fresh artifacts afterwards.

#![deny(unsafe_code)]

mod client;
mod convert;
mod error;
mod options;

pub use client::{Client, Converted, convert_doc};
pub use convert::{Conversion, Converter, EngineConverter, Metadata, MockConverter};
pub use error::{ConvertError, OptionsError};
pub use options::{
    DEFAULT_OUT_FMT, DEFAULT_PROCORD, OPT_HOST, OPT_OUT_FMT, OPT_PDF_VERSION, OPT_PORT,
    OPT_PROCORD, OUT_FORMATS, Options, PROCESSORS,
};
