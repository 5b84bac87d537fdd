use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Everything that can go wrong writing or reading a table.
///
/// Absence is not in here: a missing key is `Ok(None)` from
/// [`get`](crate::SSTableReader::get), and an exhausted scan is the
/// iterator's `None`.
#[derive(Debug, Error)]
pub enum Error {
    /// The writer was handed a key equal to the previous one.
    #[error("the same key cannot be written more than once")]
    DuplicateKey,

    /// The writer was handed a key ordered before the previous one.
    #[error("non-ascending key cannot be written")]
    OutOfOrderKey,

    /// A value's bytes no longer hash to the checksum its index entry
    /// recorded at write time.
    #[error(
        "value checksum mismatch at data offset {offset}: expected {expected:#018x}, got {actual:#018x}"
    )]
    ChecksumMismatch {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// The table was written by a newer version of this library.
    #[error("unsupported table version {found} (this reader supports <= {max})")]
    UnsupportedVersion { found: u32, max: u32 },

    /// Missing or nonsensical configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The table's files are damaged or were never finalized.
    #[error("corrupt table: {0}")]
    CorruptTable(String),

    /// A recordio-level failure in the data or index file.
    #[error(transparent)]
    Record(#[from] recordio::Error),

    /// An underlying filesystem failure, with the path it happened on.
    #[error("io error on '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    /// Several independent failures from a multi-step close path.
    #[error("{0}")]
    Multiple(ErrorChain),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for the variants that indicate on-disk damage (as opposed to
    /// caller mistakes or plain I/O failures). Tables reporting these should
    /// be quarantined.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::ChecksumMismatch { .. } | Error::CorruptTable(_) => true,
            Error::Record(recordio::Error::CorruptFormat(_))
            | Error::Record(recordio::Error::CorruptRecord { .. }) => true,
            Error::Multiple(chain) => chain.0.iter().any(Error::is_corruption),
            _ => false,
        }
    }
}

/// Joins the accumulated failures of a multi-step operation: `Ok(())` for
/// none, the error itself for one, [`Error::Multiple`] otherwise.
pub(crate) fn join(errors: Vec<Error>) -> Result<()> {
    let mut errors = errors;
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(Error::Multiple(ErrorChain(errors))),
    }
}

/// A list of independent errors, displayed in order.
#[derive(Debug)]
pub struct ErrorChain(pub Vec<Error>);

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors: ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "[{err}]")?;
        }
        Ok(())
    }
}
