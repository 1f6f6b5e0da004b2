// SPDX-License-Identifier: MIT OR Apache-2.0
//! The converter seam.
//!
//! Conversion proper is a black box behind [`Converter`]: given a source
//! document and validated options, produce an artifact in a work
//! directory and report the engine status. The built-in converters
//! implement the `oocp` (engine invocation) and `zip` stages of the
//! processor order; the cleanup stages belong to the engine command
//! configuration.

use crate::error::ConvertError;
use crate::options::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use zip::ZipWriter;
use zip::write::FileOptions;

/// Engine status carried as data, not as an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Whether the conversion failed.
    pub error: bool,
    /// Exit status of the engine invocation (0 on success and cache hits).
    pub oocp_status: i32,
}

impl Metadata {
    /// Successful conversion (also reported for cache hits).
    pub fn ok() -> Self {
        Self {
            error: false,
            oocp_status: 0,
        }
    }

    /// Failed conversion with the engine's exit status.
    pub fn failed(status: i32) -> Self {
        Self {
            error: true,
            oocp_status: status,
        }
    }
}

/// Result of one converter run.
#[derive(Debug)]
pub struct Conversion {
    /// The produced artifact; absent when the engine failed.
    pub artifact: Option<PathBuf>,
    /// Engine status.
    pub metadata: Metadata,
}

/// Black-box conversion function.
///
/// Implementations must leave the source untouched and place the artifact
/// inside `workdir`; callers own the work directory.
pub trait Converter: Send + Sync {
    /// Convert `src` according to `options`, writing into `workdir`.
    fn convert(
        &self,
        src: &Path,
        options: &Options,
        workdir: &Path,
    ) -> Result<Conversion, ConvertError>;
}

/// Converter driving an external headless office engine.
#[derive(Clone, Debug)]
pub struct EngineConverter {
    command: PathBuf,
}

impl Default for EngineConverter {
    fn default() -> Self {
        Self::new("soffice")
    }
}

impl EngineConverter {
    /// Use `command` as the engine binary.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Converter for EngineConverter {
    fn convert(
        &self,
        src: &Path,
        options: &Options,
        workdir: &Path,
    ) -> Result<Conversion, ConvertError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(&options.out_fmt)
            .arg("--outdir")
            .arg(workdir)
            .arg(src);
        if let Some(ref host) = options.host {
            let port = options.port.unwrap_or(2002);
            cmd.arg(format!(
                "--accept=socket,host={host},port={port};urp;StarOffice.ComponentContext"
            ));
        }
        debug!(command = %self.command.display(), src = %src.display(), "invoking engine");
        let status = cmd
            .status()
            .map_err(|e| ConvertError::io("spawn engine", &self.command, e))?;
        let code = status.code().unwrap_or(-1);
        if !status.success() {
            warn!(code, src = %src.display(), "engine conversion failed");
            return Ok(Conversion {
                artifact: None,
                metadata: Metadata::failed(code),
            });
        }

        let artifact = expected_artifact(src, options, workdir)?;
        if !artifact.is_file() {
            return Err(ConvertError::MissingArtifact(artifact));
        }
        let artifact = if options.wants("zip") {
            zip_single(&artifact)?
        } else {
            artifact
        };
        info!(artifact = %artifact.display(), "engine conversion complete");
        Ok(Conversion {
            artifact: Some(artifact),
            metadata: Metadata::ok(),
        })
    }
}

/// Deterministic converter for tests and engine-less local runs.
///
/// Produces `<stem>.<out_fmt>` containing the source bytes, zipped when
/// the processor order asks for it.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockConverter;

impl Converter for MockConverter {
    fn convert(
        &self,
        src: &Path,
        options: &Options,
        workdir: &Path,
    ) -> Result<Conversion, ConvertError> {
        let artifact = expected_artifact(src, options, workdir)?;
        fs::copy(src, &artifact).map_err(|e| ConvertError::io("write artifact", &artifact, e))?;
        let artifact = if options.wants("zip") {
            zip_single(&artifact)?
        } else {
            artifact
        };
        Ok(Conversion {
            artifact: Some(artifact),
            metadata: Metadata::ok(),
        })
    }
}

/// `<workdir>/<stem>.<out_fmt>`, the name the engine gives its output.
fn expected_artifact(
    src: &Path,
    options: &Options,
    workdir: &Path,
) -> Result<PathBuf, ConvertError> {
    let stem = src
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConvertError::MissingArtifact(src.to_path_buf()))?;
    Ok(workdir.join(format!("{stem}.{}", options.out_fmt)))
}

/// Wrap a single artifact file into `<name>.zip` next to it.
fn zip_single(artifact: &Path) -> Result<PathBuf, ConvertError> {
    let name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvertError::MissingArtifact(artifact.to_path_buf()))?
        .to_string();
    let zip_path = artifact.with_file_name(format!("{name}.zip"));

    let file =
        File::create(&zip_path).map_err(|e| ConvertError::io("create zip", &zip_path, e))?;
    let mut writer = ZipWriter::new(file);
    writer
        .start_file(name.as_str(), FileOptions::default())
        .map_err(|source| ConvertError::Zip {
            path: zip_path.clone(),
            source,
        })?;
    let mut input =
        File::open(artifact).map_err(|e| ConvertError::io("read artifact", artifact, e))?;
    io::copy(&mut input, &mut writer).map_err(|e| ConvertError::io("write zip", &zip_path, e))?;
    writer.finish().map_err(|source| ConvertError::Zip {
        path: zip_path.clone(),
        source,
    })?;
    Ok(zip_path)
}
