//! Multipart decoding for mail bodies held in memory and for uploads read
//! from a live stream.
//!
//! [`BufferedMultipartDecoder`] slices a complete body into [`Part`]s,
//! recovering from the usual breakage of real world senders.
//! [`StreamingMultipartReader`] walks a body as it arrives, and
//! [`Ingestion`] drives one to completion under size quotas, storing file
//! parts and reporting to [`IngestionListener`]s.

mod error;
pub use error::{Error, ErrorKind, ListenerError};

pub mod translate;

pub mod matcher;

mod boundary;
pub use boundary::Boundary;

mod part;
pub use part::{ByteSource, ContentDisposition, DispositionKind, Part, PartContent, PartHeader};

pub mod buffered;
pub use buffered::{decode, BufferedMultipartDecoder, DecodePositions};

pub mod streaming;
pub use streaming::{
    FileInfo, FilePart, FormField, FormFields, Item, ReaderOptions, StreamingMultipartReader,
};

mod chunks;
pub use chunks::ChunkReader;

mod resolver;
pub use resolver::{ExtensionTable, MimeResolver};

mod quota;
pub use quota::{QuotaConfig, QuotaGuard};

pub mod sink;
pub use sink::{PartSink, SinkFactory, SinkPolicy, TempFile};

mod session;
pub use session::{PendingPart, UploadSession, UploadedFile};

mod ingest;
pub use ingest::{Ingestion, IngestionListener, IngestionState};

mod config;
pub use config::IngestConfig;

mod header_map;
pub use header_map::HeaderMap;

#[cfg(test)]
mod test_support;

use std::io::Read;

/// Creates a streaming reader for a request body from the request headers.
///
/// The `Content-Type` must be `multipart/*` with a boundary; a
/// `Content-Length` is recorded as the declared size of the body.
pub fn from_headers<R: Read>(
    headers: impl HeaderMap,
    body: R,
) -> Result<StreamingMultipartReader<R>, Error> {
    let content_type = headers.content_type().ok_or(Error::ContentTypeMissing)?;
    let reader = StreamingMultipartReader::from_content_type(body, content_type)?;
    Ok(reader.declared_length(headers.content_length()))
}
