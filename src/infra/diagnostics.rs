//! Diagnostic side channel.
//!
//! Human-readable progress and failure lines go to stderr (or a test
//! writer), never to the output stream. Verbose lines are dropped unless
//! verbose mode is on; the `log` facade is independent of this channel.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone)]
pub struct Diagnostics {
    verbose: bool,
    writer: Option<SharedWriter>,
}

impl Diagnostics {
    /// Diagnostics written to standard error.
    #[must_use]
    pub fn stderr(verbose: bool) -> Self {
        Self::with_writer(verbose, io::stderr())
    }

    pub fn with_writer(verbose: bool, writer: impl Write + Send + 'static) -> Self {
        Self {
            verbose,
            writer: Some(Arc::new(Mutex::new(Box::new(writer)))),
        }
    }

    /// Diagnostics that discard everything.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            verbose: false,
            writer: None,
        }
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Emit `message` in verbose mode only.
    pub fn info(&self, message: impl AsRef<str>) {
        if self.verbose {
            self.always(message);
        }
    }

    /// Emit `message` regardless of verbosity.
    pub fn always(&self, message: impl AsRef<str>) {
        let Some(writer) = &self.writer else {
            return;
        };
        // A poisoned lock only means another writer panicked mid-line.
        let mut guard = match writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(guard, "{}", message.as_ref()).and_then(|()| guard.flush()) {
            log::warn!("cannot write diagnostic line: {e}");
        }
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("verbose", &self.verbose)
            .field("silent", &self.writer.is_none())
            .finish()
    }
}
