use std::fmt;
use std::io;

pub(crate) type TramaResult<T> = Result<T, Error>;

/// Errors that can occur while building or running a language parser
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file, a source file
    /// or a cache entry if the `cache` feature is enabled
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// A regex inside the grammar failed to compile.
    /// Detected at construction time, before any parsing happens.
    #[allow(missing_docs)]
    Regex { pattern: String, message: String },

    /// A `#name` include could not be resolved against the language repository.
    /// Only happens at construction time.
    IncludedParserNotFound(String),

    /// A captures map references a group the regex does not produce,
    /// or mixes the whole-match key `0` with numbered groups.
    #[allow(missing_docs)]
    RegexGroupsMismatch { pattern: String, group: usize },

    /// `parse_file` was called on a file whose extension is not listed
    /// in the grammar's `fileTypes`.
    #[allow(missing_docs)]
    IncompatibleFileType { extensions: Vec<String> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::Regex { pattern, message } => {
                write!(f, "invalid regex pattern '{}': {}", pattern, message)
            }
            Error::IncludedParserNotFound(name) => {
                write!(f, "included parser '#{}' not found in repository", name)
            }
            Error::RegexGroupsMismatch { pattern, group } => {
                write!(
                    f,
                    "captures reference group {} which '{}' does not produce",
                    group, pattern
                )
            }
            Error::IncompatibleFileType { extensions } => {
                write!(f, "incompatible file type, expected one of {:?}", extensions)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Regex { .. }
            | Error::IncludedParserNotFound(_)
            | Error::RegexGroupsMismatch { .. }
            | Error::IncompatibleFileType { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
