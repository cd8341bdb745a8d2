//! Output sinks and the delete-on-failure rollback.
//!
//! Content is written before the signature is known to be good, so a file
//! artifact produced by a failed run is removed again. Standard output can
//! not be taken back and is left alone.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

use crate::domain::types::ExitStatus;
use crate::infra::diagnostics::Diagnostics;
use crate::infra::error::{P7vError, P7vResult};

/// Where decoded content goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputTarget::Stdout => None,
            OutputTarget::File(path) => Some(path),
        }
    }
}

/// Opened output stream.
pub enum OutputSink {
    Stdout(Stdout),
    File(BufWriter<File>),
}

impl OutputSink {
    /// Open `target` for writing, truncating an existing file.
    pub fn open(target: &OutputTarget) -> P7vResult<Self> {
        match target {
            OutputTarget::Stdout => Ok(OutputSink::Stdout(io::stdout())),
            OutputTarget::File(path) => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| {
                        P7vError::OutputOpenFailed(format!("'{}': {e}", path.display()))
                    })?;
                Ok(OutputSink::File(BufWriter::new(file)))
            }
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(out) => out.write(buf),
            OutputSink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(out) => out.flush(),
            OutputSink::File(file) => file.flush(),
        }
    }
}

/// What happened to the output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Standard output; nothing to keep or delete.
    Stream,
    Retained(PathBuf),
    Deleted(PathBuf),
    /// Deletion was attempted and failed; the artifact may remain.
    DeleteFailed(PathBuf),
    /// No artifact was created by this run.
    NotCreated,
}

pub struct RollbackController<'a> {
    target: &'a OutputTarget,
    created: bool,
}

impl<'a> RollbackController<'a> {
    /// `created` tells whether this run opened (and so owns) the artifact.
    #[must_use]
    pub fn new(target: &'a OutputTarget, created: bool) -> Self {
        Self { target, created }
    }

    /// Disposition the artifact should get for `status`, without acting.
    #[must_use]
    pub fn disposition(&self, status: ExitStatus) -> Disposition {
        match self.target {
            OutputTarget::Stdout => Disposition::Stream,
            OutputTarget::File(_) if !self.created => Disposition::NotCreated,
            OutputTarget::File(path) if status.is_success() => Disposition::Retained(path.clone()),
            OutputTarget::File(path) => Disposition::Deleted(path.clone()),
        }
    }

    /// Keep or delete the artifact. Deletion failures are reported and
    /// never change the run status.
    pub fn settle(&self, status: ExitStatus, diagnostics: &Diagnostics) -> Disposition {
        match self.disposition(status) {
            Disposition::Deleted(path) => match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("removed untrusted output '{}'", path.display());
                    Disposition::Deleted(path)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Disposition::Deleted(path),
                Err(e) => {
                    log::error!("cannot remove output '{}': {e}", path.display());
                    diagnostics.always(format!(
                        "failed to remove output file '{}': {e}",
                        path.display()
                    ));
                    Disposition::DeleteFailed(path)
                }
            },
            other => other,
        }
    }
}
