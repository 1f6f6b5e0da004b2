// SPDX-License-Identifier: MIT OR Apache-2.0
//! The recognized option table.
//!
//! Option sets arrive as flat string maps (CLI flags, multipart form
//! fields, XML-RPC structs) and are normalized into a typed [`Options`]
//! value at the frontend boundary. Unknown keys are rejected there, so the
//! cache only ever fingerprints validated option content.

use crate::error::OptionsError;
use convd_cache::{OptionMap, OptionValue};

/// Processor order option.
pub const OPT_PROCORD: &str = "meta-procord";
/// Output format option.
pub const OPT_OUT_FMT: &str = "oocp-out-fmt";
/// PDF/A switch handed to the engine.
pub const OPT_PDF_VERSION: &str = "oocp-pdf-version";
/// Engine host hint.
pub const OPT_HOST: &str = "oocp-host";
/// Engine port hint.
pub const OPT_PORT: &str = "oocp-port";

/// Processors allowed in `meta-procord`.
pub const PROCESSORS: &[&str] = &["unzip", "oocp", "tidy", "html_cleaner", "css_cleaner", "zip"];
/// Output formats accepted by `oocp-out-fmt`.
pub const OUT_FORMATS: &[&str] = &["html", "xhtml", "pdf", "txt"];

/// Default processor order: full cleanup pipeline plus zipping.
pub const DEFAULT_PROCORD: &str = "unzip,oocp,tidy,html_cleaner,css_cleaner,zip";
/// Default output format.
pub const DEFAULT_OUT_FMT: &str = "html";

/// Validated conversion options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Processor stages, in execution order.
    pub procord: Vec<String>,
    /// Target output format.
    pub out_fmt: String,
    /// Whether the engine should produce PDF/A.
    pub pdf_version: bool,
    /// Engine host hint, if any.
    pub host: Option<String>,
    /// Engine port hint, if any.
    pub port: Option<u16>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            procord: DEFAULT_PROCORD.split(',').map(str::to_string).collect(),
            out_fmt: DEFAULT_OUT_FMT.to_string(),
            pdf_version: false,
            host: None,
            port: None,
        }
    }
}

impl Options {
    /// Build options from `(key, value)` pairs using canonical option
    /// names. Later pairs override earlier ones.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            options.set(key.as_ref(), value.as_ref())?;
        }
        Ok(options)
    }

    /// Build options from HTTP form fields.
    ///
    /// Flat aliases (`out_fmt`, `pdf_version`, `procord`) map to their
    /// canonical names; canonical names are accepted as-is. Unknown fields
    /// are rejected.
    pub fn from_form_fields<I, K, V>(fields: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (field, value) in fields {
            let key = match field.as_ref() {
                "out_fmt" => OPT_OUT_FMT,
                "pdf_version" => OPT_PDF_VERSION,
                "procord" => OPT_PROCORD,
                other => other,
            };
            options.set(key, value.as_ref())?;
        }
        Ok(options)
    }

    /// Whether `stage` appears in the processor order.
    pub fn wants(&self, stage: &str) -> bool {
        self.procord.iter().any(|s| s == stage)
    }

    /// Canonical option map fed to the fingerprinter.
    ///
    /// Defaults are included, so two option sets that are effectively
    /// identical fingerprint identically no matter which keys were spelled
    /// out.
    pub fn to_option_map(&self) -> OptionMap {
        let mut map = OptionMap::new();
        map.insert(
            OPT_PROCORD.to_string(),
            OptionValue::from(self.procord.join(",")),
        );
        map.insert(
            OPT_OUT_FMT.to_string(),
            OptionValue::from(self.out_fmt.as_str()),
        );
        map.insert(
            OPT_PDF_VERSION.to_string(),
            OptionValue::from(self.pdf_version),
        );
        if let Some(ref host) = self.host {
            map.insert(OPT_HOST.to_string(), OptionValue::from(host.as_str()));
        }
        if let Some(port) = self.port {
            map.insert(OPT_PORT.to_string(), OptionValue::from(i64::from(port)));
        }
        map
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), OptionsError> {
        match key {
            OPT_PROCORD => {
                let stages: Vec<String> = value
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                for stage in &stages {
                    if !PROCESSORS.contains(&stage.as_str()) {
                        return Err(OptionsError::InvalidValue {
                            option: key.to_string(),
                            value: value.to_string(),
                            expected: format!("comma-separated subset of {PROCESSORS:?}"),
                        });
                    }
                }
                self.procord = stages;
            }
            OPT_OUT_FMT => {
                if !OUT_FORMATS.contains(&value) {
                    return Err(OptionsError::InvalidValue {
                        option: key.to_string(),
                        value: value.to_string(),
                        expected: format!("one of {OUT_FORMATS:?}"),
                    });
                }
                self.out_fmt = value.to_string();
            }
            OPT_PDF_VERSION => {
                self.pdf_version = match value {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => {
                        return Err(OptionsError::InvalidValue {
                            option: key.to_string(),
                            value: value.to_string(),
                            expected: "a boolean".to_string(),
                        });
                    }
                };
            }
            OPT_HOST => self.host = Some(value.to_string()),
            OPT_PORT => {
                let port = value.parse().map_err(|_| OptionsError::InvalidValue {
                    option: key.to_string(),
                    value: value.to_string(),
                    expected: "a port number".to_string(),
                })?;
                self.port = Some(port);
            }
            other => return Err(OptionsError::UnknownOption(other.to_string())),
        }
        Ok(())
    }
}
