//! p7v command line interface
//!
//! Decodes a PKCS#7 / CMS signed package from a file or standard input,
//! writes the encapsulated content to a file or standard output and verifies
//! the signers. The process exit status tells automation what happened.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use miette::Report;
use p7verify::{
    verify_package, CertUsage, ChunkSize, ConfigManager, Diagnostics, ExitStatus, InputSource,
    OutputTarget, P7vError, P7vResult, VerifierConfiguration, VerifyOptions, VerifyRequest,
};

#[derive(Parser)]
#[command(name = "p7v")]
#[command(about = "Extract and verify the content of a PKCS#7 signed package")]
#[command(long_about = "
p7v - PKCS#7 / CMS package verifier

The content is written while the input is decoded; signatures are checked
once the whole package has been read. When verification fails the output
file is deleted again.

EXAMPLES:
    # Extract and verify against the trust store in ./trust
    p7v -d ./trust -o payload.bin package.p7m

    # Read from a pipe and write to stdout, with progress lines
    cat package.p7m | p7v -v -d ./trust > payload.bin

    # Extract without checking signatures
    p7v -n -o payload.bin package.p7m

EXIT STATUS:
    0 success, 1 input, 2 output open, 3 output write, 4 verification,
    5 trust store, 6 decoder start, 7 decoder update, 8 decoder finish,
    9 certificate import, 10 configuration

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    /// Signed package to read (defaults to standard input)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory holding trusted certificates
    #[arg(short = 'd', long = "trust-store", value_name = "DIR")]
    trust_store: Option<PathBuf>,

    /// Output file (defaults to standard output)
    #[arg(short, long, value_name = "OUT")]
    output: Option<PathBuf>,

    /// Skip signature verification
    #[arg(short = 'n', long = "no-verify")]
    no_verify: bool,

    /// Print progress lines on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config location)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Input block size in bytes
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Usage signer certificates must allow
    #[arg(long, value_enum)]
    usage: Option<CertUsage>,

    /// Fail when the package carries no signature at all
    #[arg(long)]
    require_signed: bool,
}

fn load_configuration(cli: &Cli) -> P7vResult<VerifierConfiguration> {
    match &cli.config {
        Some(path) => ConfigManager::with_path(path).load(),
        None => ConfigManager::new().load_or_default(),
    }
}

/// Merge command line flags over file values.
fn build_request(cli: Cli, config: VerifierConfiguration) -> P7vResult<(VerifyRequest, bool)> {
    let usage = cli.usage.unwrap_or(config.certificate_usage);
    let chunk_size = match cli.chunk_size {
        Some(size) => ChunkSize::new(size)?,
        None => config.chunk_size()?,
    };
    let verbose = cli.verbose || config.verbose;

    let request = VerifyRequest {
        input: cli.input.map_or(InputSource::Stdin, InputSource::File),
        output: cli.output.map_or(OutputTarget::Stdout, OutputTarget::File),
        trust_store_dir: cli.trust_store.or(config.trust_store_dir),
        options: VerifyOptions {
            skip_verification: cli.no_verify,
            require_signed: cli.require_signed || config.require_signed,
            usage,
            chunk_size,
        },
    };
    Ok((request, verbose))
}

fn report(error: P7vError) {
    eprintln!("{:?}", Report::new(error));
}

/// Help and version requests succeed; every other argument error is a
/// configuration problem, kept apart from the I/O categories.
fn argument_error_status(kind: ErrorKind) -> ExitStatus {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
        _ => ExitStatus::ConfigurationInvalid,
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let status = argument_error_status(e.kind());
            if status.is_success() {
                let _ = e.print();
            } else {
                report(P7vError::ConfigurationError(e.to_string()));
            }
            return ExitCode::from(status.code());
        }
    };

    let prepared = load_configuration(&cli).and_then(|config| build_request(cli, config));
    let (request, verbose) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            let status = e.exit_status();
            report(e);
            return ExitCode::from(status.code());
        }
    };

    let diagnostics = Diagnostics::stderr(verbose);
    let outcome = verify_package(request, &diagnostics);
    if let Some(error) = outcome.error {
        report(error);
    }
    ExitCode::from(outcome.status.code())
}
