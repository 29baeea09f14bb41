//! Output sinks: where delivered items and per-feed diagnostics end up.
//!
//! The engine only talks to the [`OutputSink`] trait. Two implementations ship
//! with the crate: [`DirectorySink`] keeps one append-only file per named
//! buffer, [`StdioSink`] writes items to stdout and diagnostics to stderr.
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::feed::Item;
use crate::util::sanitize_line;

/// Buffer that receives every delivered item.
pub const MAIN_BUFFER: &str = "main";

/// Buffer (file name) that receives diagnostics in a [`DirectorySink`].
pub const ERROR_BUFFER: &str = "errors";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Output to buffer '{buffer}' failed: {source}")]
    Io {
        buffer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid buffer name: {0:?}")]
    InvalidBufferName(String),
}

/// Destination for delivered items and diagnostics.
///
/// Shared between the poller task and the command handler, hence `&self`
/// methods and the `Send + Sync` bound.
pub trait OutputSink: Send + Sync {
    /// Writes one line to `buffer`, flushing and closing it before returning.
    fn write_line(&self, buffer: &str, line: &str) -> Result<(), SinkError>;

    /// Appends one line to the persistent diagnostic stream.
    fn diagnostic(&self, line: &str) -> Result<(), SinkError>;

    /// Deletes a named buffer.
    fn close_buffer(&self, name: &str) -> Result<(), SinkError>;
}

/// Renders an item as the single line `[<title>](<link>)`.
pub fn render_item(item: &Item) -> String {
    let link = item.link.as_deref().unwrap_or_default();
    format!("[{}]({})", sanitize_line(&item.title), sanitize_line(link))
}

/// One file per buffer under a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates the directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            buffer: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn buffer_path(&self, name: &str) -> Result<PathBuf, SinkError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control());
        if !valid {
            return Err(SinkError::InvalidBufferName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    fn append(&self, buffer: &str, line: &str) -> Result<(), SinkError> {
        let path = self.buffer_path(buffer)?;
        let io_err = |source| SinkError::Io {
            buffer: buffer.to_string(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        writeln!(file, "{}", line).map_err(io_err)?;
        file.flush().map_err(io_err)
    }
}

impl OutputSink for DirectorySink {
    fn write_line(&self, buffer: &str, line: &str) -> Result<(), SinkError> {
        self.append(buffer, line)
    }

    fn diagnostic(&self, line: &str) -> Result<(), SinkError> {
        self.append(ERROR_BUFFER, line)
    }

    fn close_buffer(&self, name: &str) -> Result<(), SinkError> {
        let path = self.buffer_path(name)?;
        std::fs::remove_file(&path).map_err(|source| SinkError::Io {
            buffer: name.to_string(),
            source,
        })?;
        tracing::debug!(buffer = %name, "Closed buffer");
        Ok(())
    }
}

/// Items to stdout, diagnostics to stderr. Buffers other than
/// [`MAIN_BUFFER`] are prefixed with their name.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl OutputSink for StdioSink {
    fn write_line(&self, buffer: &str, line: &str) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        let result = if buffer == MAIN_BUFFER {
            writeln!(out, "{}", line)
        } else {
            writeln!(out, "{}: {}", buffer, line)
        };
        result.and_then(|_| out.flush()).map_err(|source| SinkError::Io {
            buffer: buffer.to_string(),
            source,
        })
    }

    fn diagnostic(&self, line: &str) -> Result<(), SinkError> {
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", line)
            .and_then(|_| err.flush())
            .map_err(|source| SinkError::Io {
                buffer: ERROR_BUFFER.to_string(),
                source,
            })
    }

    fn close_buffer(&self, name: &str) -> Result<(), SinkError> {
        // Nothing to delete on a terminal stream.
        tracing::debug!(buffer = %name, "Ignoring close on stdio sink");
        Ok(())
    }
}

/// True when a sink operation failed because the buffer does not exist.
pub fn is_missing_buffer(err: &SinkError) -> bool {
    matches!(err, SinkError::Io { source, .. } if source.kind() == ErrorKind::NotFound)
}
