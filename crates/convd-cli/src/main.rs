// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::Result;
use clap::Parser;
use clap::error::{ContextKind, ErrorKind};
use convd_convert::{
    Converter, EngineConverter, MockConverter, OPT_OUT_FMT, OPT_PDF_VERSION, OPT_PROCORD,
    Options, convert_doc,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors (failed conversions included).
const EXIT_RUNTIME_ERROR: i32 = 1;
/// Exit code for usage / argument errors.
const EXIT_USAGE_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "oooclient",
    version,
    about = "Convert office documents, optionally through the conversion cache"
)]
struct Cli {
    /// Cache directory; converted docs are stored and looked up here.
    #[arg(long = "cachedir")]
    cachedir: Option<PathBuf>,

    /// Processor order, e.g. "unzip,oocp,zip".
    #[arg(long = "meta-procord")]
    meta_procord: Option<String>,

    /// Output format: html, xhtml, pdf or txt.
    #[arg(long = "oocp-out-fmt")]
    oocp_out_fmt: Option<String>,

    /// Produce PDF/A output.
    #[arg(long = "oocp-pdf-version")]
    oocp_pdf_version: bool,

    /// Office engine binary to invoke.
    #[arg(long, default_value = "soffice")]
    engine: String,

    /// Use the deterministic mock converter instead of the office engine.
    #[arg(long)]
    mock: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Source document.
    src: PathBuf,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // The "unrecognized arguments" line is a compatibility
            // contract; everything else keeps clap's rendering.
            if err.kind() == ErrorKind::UnknownArgument {
                let arg = err
                    .get(ContextKind::InvalidArg)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                eprintln!("error: unrecognized arguments: {arg}");
                std::process::exit(EXIT_USAGE_ERROR);
            }
            err.exit();
        }
    };

    let filter = if cli.debug {
        EnvFilter::new("convd_cache=debug,convd_convert=debug")
    } else {
        EnvFilter::new("convd_cache=warn,convd_convert=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = match build_options(&cli) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(EXIT_USAGE_ERROR);
        }
    };

    if let Err(e) = run(cli, &options) {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn build_options(cli: &Cli) -> Result<Options, convd_convert::OptionsError> {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    if let Some(ref procord) = cli.meta_procord {
        pairs.push((OPT_PROCORD, procord.clone()));
    }
    if let Some(ref out_fmt) = cli.oocp_out_fmt {
        pairs.push((OPT_OUT_FMT, out_fmt.clone()));
    }
    if cli.oocp_pdf_version {
        pairs.push((OPT_PDF_VERSION, "true".to_string()));
    }
    Options::from_pairs(pairs)
}

fn run(cli: Cli, options: &Options) -> Result<()> {
    let converter: Box<dyn Converter> = if cli.mock {
        Box::new(MockConverter)
    } else {
        Box::new(EngineConverter::new(&cli.engine))
    };

    let converted = convert_doc(
        converter.as_ref(),
        &cli.src,
        options,
        cli.cachedir.as_deref(),
    )?;

    if converted.metadata.error {
        anyhow::bail!(
            "conversion failed with engine status {}",
            converted.metadata.oocp_status
        );
    }
    let path = converted
        .path
        .ok_or_else(|| anyhow::anyhow!("converter returned no artifact"))?;
    println!("RESULT in {}", path.display());
    Ok(())
}
