//! Mapping of low level failures into [`Error`] and rendering of user facing
//! messages from the structured fields an error carries.

use std::io;

use crate::Error;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Maps an I/O failure from a byte source or sink into the error taxonomy.
///
/// End-of-stream and timeout conditions reported by the source keep their
/// identity, everything else is an [`Error::Io`] with the cause attached.
pub fn translate_io(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
        io::ErrorKind::TimedOut => Error::ReadTimeout,
        _ => {
            // Errors raised by our own readers travel through io::Error.
            if e.get_ref().map_or(false, |inner| inner.is::<Error>()) {
                if let Some(inner) = e.into_inner() {
                    if let Ok(err) = inner.downcast::<Error>() {
                        return *err;
                    }
                }
                return Error::malformed("unreadable inner error");
            }
            Error::Io(e)
        }
    }
}

/// Carries an [`Error`] through an `io::Read` implementation.
/// [`translate_io`] recovers it on the other side.
pub(crate) fn into_io(e: Error) -> io::Error {
    match e {
        Error::Io(inner) => inner,
        Error::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, Error::UnexpectedEof),
        Error::ReadTimeout => io::Error::new(io::ErrorKind::TimedOut, Error::ReadTimeout),
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// Human readable byte size using binary multiples, e.g. `10 MB` or `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} {}", bytes, UNITS[0]);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if (value - value.round()).abs() < 0.05 {
        format!("{} {}", value.round() as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// A message suitable for showing to the person who sent the request.
pub fn describe(e: &Error) -> String {
    match *e {
        Error::FileSizeExceeded { permitted, .. } => format!(
            "The file exceeds the maximum file size of {}",
            format_size(permitted)
        ),
        Error::TotalSizeExceeded { permitted, .. } => format!(
            "The upload exceeds the maximum size of {}",
            format_size(permitted)
        ),
        Error::UnexpectedEof | Error::ReadTimeout => {
            "The upload was interrupted, please try again".to_string()
        }
        Error::MissingStartingField => "The request is missing its leading form data".to_string(),
        Error::Listener(ref inner) => inner.to_string(),
        Error::Io(_) => "The upload could not be stored".to_string(),
        _ => "The request is not a valid multipart request".to_string(),
    }
}
