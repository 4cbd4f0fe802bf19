//! Adapters turning sequences of byte chunks, such as a body stream handed
//! out by an HTTP server, into a blocking [`Read`].

use futures::executor::{block_on_stream, BlockingStream};
use futures::Stream;
use std::error::Error as StdError;
use std::io::{self, Read};

/// Reads through a sequence of chunks, one at a time.
///
/// Errors produced by the sequence become I/O errors; an `io::Error` keeps
/// its kind so a timed out or truncated source stays recognisable.
pub struct ChunkReader<I, B> {
    chunks: I,
    current: Option<B>,
    offset: usize,
}

impl<I, B, E> ChunkReader<I, B>
where
    I: Iterator<Item = Result<B, E>>,
{
    pub fn new(chunks: I) -> Self {
        Self {
            chunks,
            current: None,
            offset: 0,
        }
    }
}

impl<S, B, E> ChunkReader<BlockingStream<S>, B>
where
    S: Stream<Item = Result<B, E>> + Unpin,
{
    /// Blocks the calling thread on `stream` for every chunk.
    pub fn from_stream(stream: S) -> Self {
        Self::new(block_on_stream(stream))
    }
}

impl<I, B, E> Read for ChunkReader<I, B>
where
    I: Iterator<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(chunk) = &self.current {
                let rest = &chunk.as_ref()[self.offset..];
                if !rest.is_empty() {
                    let n = rest.len().min(buf.len());
                    buf[..n].copy_from_slice(&rest[..n]);
                    self.offset += n;
                    return Ok(n);
                }
            }

            match self.chunks.next() {
                Some(Ok(chunk)) => {
                    self.current = Some(chunk);
                    self.offset = 0;
                }
                Some(Err(e)) => return Err(to_io(e.into())),
                None => {
                    self.current = None;
                    return Ok(0);
                }
            }
        }
    }
}

fn to_io(e: Box<dyn StdError + Send + Sync>) -> io::Error {
    match e.downcast::<io::Error>() {
        Ok(inner) => *inner,
        Err(other) => {
            log::debug!("Chunk source failed: {}", other);
            io::Error::new(io::ErrorKind::Other, other)
        }
    }
}
