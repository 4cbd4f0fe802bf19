use std::{error::Error as StdError, fmt, io};

/// Failure raised by a registered ingestion listener. Carried through
/// untouched by [`Error::Listener`].
pub type ListenerError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug)]
pub enum Error {
    /// Cannot turn a request without content type into multipart.
    ContentTypeMissing,
    /// The content type carries no usable `boundary` parameter.
    MissingBoundary,
    /// Cannot decode a non multipart content type as multipart.
    NotMultipart,
    InvalidMimeType(mime::FromStrError),
    MalformedMultipart(String),
    /// A file part arrived before any form field while leading fields are required.
    MissingStartingField,
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },
    FileSizeExceeded {
        actual: u64,
        permitted: u64,
    },
    TotalSizeExceeded {
        actual: u64,
        permitted: u64,
    },
    /// The byte source ended before the multipart framing was complete.
    UnexpectedEof,
    /// The byte source reported a timed out read.
    ReadTimeout,
    Io(io::Error),
    Listener(ListenerError),
}

/// The closed set of failure classes callers dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    FileSizeExceeded,
    TotalSizeExceeded,
    UnexpectedEof,
    Io,
    Listener,
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedMultipart(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::ContentTypeMissing
            | Error::MissingBoundary
            | Error::NotMultipart
            | Error::InvalidMimeType(_)
            | Error::MalformedMultipart(_)
            | Error::MissingStartingField
            | Error::IndexOutOfBounds { .. } => ErrorKind::Structural,
            Error::FileSizeExceeded { .. } => ErrorKind::FileSizeExceeded,
            Error::TotalSizeExceeded { .. } => ErrorKind::TotalSizeExceeded,
            Error::UnexpectedEof | Error::ReadTimeout => ErrorKind::UnexpectedEof,
            Error::Io(_) => ErrorKind::Io,
            Error::Listener(_) => ErrorKind::Listener,
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UnexpectedEof
    }

    /// `(actual, permitted)` byte counts for quota violations.
    pub fn sizes(&self) -> Option<(u64, u64)> {
        match *self {
            Error::FileSizeExceeded { actual, permitted }
            | Error::TotalSizeExceeded { actual, permitted } => Some((actual, permitted)),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ContentTypeMissing => write!(f, "Content Type header missing from request"),
            Error::MissingBoundary => write!(f, "Content-Type has no boundary parameter"),
            Error::NotMultipart => {
                write!(f, "Cannot handle a non multipart content type as multipart.")
            }
            Error::InvalidMimeType(ref e) => write!(f, "Content-Type value invalid: {}", e),
            Error::MalformedMultipart(ref msg) => write!(f, "Malformed Multipart: {}", msg),
            Error::MissingStartingField => {
                write!(f, "Malformed Multipart: file data arrived before any form field")
            }
            Error::IndexOutOfBounds { index, len } => {
                write!(f, "Part index {} out of range, multipart has {} parts", index, len)
            }
            Error::FileSizeExceeded { actual, permitted } => write!(
                f,
                "File size {} exceeds the permitted maximum of {}",
                actual, permitted
            ),
            Error::TotalSizeExceeded { actual, permitted } => write!(
                f,
                "Total upload size {} exceeds the permitted maximum of {}",
                actual, permitted
            ),
            Error::UnexpectedEof => write!(f, "Stream ended before multipart was complete"),
            Error::ReadTimeout => write!(f, "Timed out reading multipart stream"),
            Error::Io(ref e) => write!(f, "I/O: {}", e),
            Error::Listener(ref e) => write!(f, "{}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::InvalidMimeType(ref e) => Some(e),
            Error::Io(ref e) => Some(e),
            Error::Listener(ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        crate::translate::translate_io(inner)
    }
}

impl From<mime::FromStrError> for Error {
    fn from(inner: mime::FromStrError) -> Self {
        Error::InvalidMimeType(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_expose_sizes() {
        let e = Error::FileSizeExceeded {
            actual: 11,
            permitted: 10,
        };
        assert_eq!(Some((11, 10)), e.sizes());
        assert_eq!(ErrorKind::FileSizeExceeded, e.kind());
        assert!(!e.is_retryable());
    }

    #[test]
    fn listener_errors_keep_their_message() {
        let e = Error::Listener("virus scanner rejected upload".into());
        assert_eq!("virus scanner rejected upload", e.to_string());
        assert_eq!(ErrorKind::Listener, e.kind());
        assert!(e.source().is_some());
    }

    #[test]
    fn eof_is_retryable() {
        assert!(Error::UnexpectedEof.is_retryable());
        assert!(Error::ReadTimeout.is_retryable());
        assert!(!Error::MissingBoundary.is_retryable());
    }
}
