//! Decoding of multipart bodies that are already fully in memory, such as
//! fetched mail bodies.
//!
//! Boundary offsets are computed once, on first access, after which any part
//! is extracted by slicing the shared buffer between two known offsets.
//!
//! Real world mail is frequently broken, and the decoder recovers instead of
//! failing:
//!
//!  * A body without its terminal `--boundary--` ends at the end of the buffer.
//!  * A body labelled multipart but containing no boundary at all is decoded as
//!    one part spanning the whole buffer.
//!  * A boundary immediately followed by the terminal boundary yields no part.

use bytes::Bytes;
use std::cell::OnceCell;
use std::ops::Range;

use crate::matcher::Matcher;
use crate::{Boundary, Error, Part, PartContent, PartHeader};

/// Charset assumed for undeclared 8-bit text.
pub const DEFAULT_CHARSET: &str = "iso-8859-1";

/// Nested multiparts below this depth are kept as opaque leaves.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Boundary layout of one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodePositions {
    offsets: Vec<usize>,
    spans: Vec<Range<usize>>,
    complete: bool,
}

impl DecodePositions {
    /// Start offsets of every boundary, followed by the end offset: the
    /// terminal boundary or, when that is missing, the buffer length.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The byte range of each part, boundary lines stripped.
    pub fn spans(&self) -> &[Range<usize>] {
        &self.spans
    }

    /// Whether a terminal boundary was found.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[derive(Debug)]
pub struct BufferedMultipartDecoder {
    data: Bytes,
    boundary: Boundary,
    matcher: Matcher,
    default_charset: String,
    depth: usize,
    positions: OnceCell<DecodePositions>,
}

impl BufferedMultipartDecoder {
    /// A decoder for `data` labelled with `content_type`, which must carry a
    /// `boundary` parameter.
    pub fn new<B: Into<Bytes>>(data: B, content_type: &str) -> Result<Self, Error> {
        let boundary = Boundary::from_content_type(content_type)?;
        Ok(Self::with_boundary(data, boundary))
    }

    pub fn with_boundary<B: Into<Bytes>>(data: B, boundary: Boundary) -> Self {
        let matcher = Matcher::new(boundary.as_bytes());
        Self {
            data: data.into(),
            boundary,
            matcher,
            default_charset: DEFAULT_CHARSET.to_string(),
            depth: 0,
            positions: OnceCell::new(),
        }
    }

    /// Charset reported for undeclared text that is neither ASCII nor UTF-8.
    #[must_use]
    pub fn default_charset<S: Into<String>>(mut self, charset: S) -> Self {
        self.default_charset = charset.into();
        self
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn positions(&self) -> &DecodePositions {
        self.positions.get_or_init(|| self.scan())
    }

    pub fn count(&self) -> usize {
        self.positions().len()
    }

    pub fn is_complete(&self) -> bool {
        self.positions().is_complete()
    }

    /// The undecoded bytes of part `index`, headers included.
    pub fn raw_part(&self, index: usize) -> Result<Bytes, Error> {
        let spans = self.positions().spans();
        match spans.get(index) {
            Some(span) => Ok(self.data.slice(span.clone())),
            None => Err(Error::IndexOutOfBounds {
                index,
                len: spans.len(),
            }),
        }
    }

    pub fn part(&self, index: usize) -> Result<Part, Error> {
        let raw = self.raw_part(index)?;
        Ok(self.build_part(raw))
    }

    pub fn parts(&self) -> impl Iterator<Item = Part> + '_ {
        self.positions()
            .spans()
            .iter()
            .map(move |span| self.build_part(self.data.slice(span.clone())))
    }

    fn scan(&self) -> DecodePositions {
        let data = &self.data[..];
        let pattern_len = self.matcher.len();

        let mut offsets = Vec::new();
        let mut starts = Vec::new();
        let mut terminal = None;
        let mut pos = 0;

        while let Some(i) = self.matcher.find(data, pos) {
            let after = i + pattern_len;

            if data[after..].starts_with(b"--") {
                let rest = skip_padding(data, after + 2);
                if rest == data.len() || line_break_len(data, rest).is_some() {
                    log::debug!("Found stop sentinel at index: {}", i);
                    terminal = Some(i);
                    break;
                }
            }

            let line_end = skip_padding(data, after);
            match line_break_len(data, line_end) {
                Some(n) => {
                    offsets.push(i);
                    starts.push(line_end + n);
                    pos = line_end + n;
                }
                None => {
                    log::trace!("Ignoring boundary-like content at index: {}", i);
                    pos = i + 1;
                }
            }
        }

        if offsets.is_empty() {
            if terminal.is_none() && !data.is_empty() {
                log::debug!("No boundary found, decoding whole body as a single part");
                return DecodePositions {
                    offsets: vec![data.len()],
                    spans: vec![0..data.len()],
                    complete: false,
                };
            }

            return DecodePositions {
                offsets: terminal.into_iter().collect(),
                spans: Vec::new(),
                complete: terminal.is_some(),
            };
        }

        let complete = terminal.is_some();
        match terminal {
            Some(t) => offsets.push(t),
            None => {
                log::debug!("Missing terminal boundary, part ends at end of body");
                offsets.push(data.len());
            }
        }

        let mut spans = Vec::with_capacity(starts.len());
        for (k, &start) in starts.iter().enumerate() {
            let next = offsets[k + 1];
            let end = if next == data.len() && !complete {
                next
            } else {
                strip_line_break(data, next)
            };

            if end > start {
                spans.push(start..end);
            }
        }

        DecodePositions {
            offsets,
            spans,
            complete,
        }
    }

    fn build_part(&self, raw: Bytes) -> Part {
        let (header, body) = match header_split(&raw) {
            Some((header_end, body_start)) => {
                (PartHeader::parse(&raw[..header_end]), raw.slice(body_start..))
            }
            None => return Part::text(PartHeader::new(), raw, &self.default_charset),
        };

        if let Some(nested) = self.nested_decoder(&header, &body) {
            let parts = nested.parts().collect();
            return Part::new(header, PartContent::Nested(parts));
        }

        let is_text = header
            .content_type()
            .map_or(true, |ct| ct.type_() == mime::TEXT);
        if is_text {
            Part::text(header, body, &self.default_charset)
        } else {
            Part::new(header, PartContent::Leaf(crate::ByteSource::Memory(body)))
        }
    }

    fn nested_decoder(&self, header: &PartHeader, body: &Bytes) -> Option<Self> {
        let ct = header.get("content-type")?;
        let boundary = match Boundary::from_content_type(ct) {
            Ok(b) => b,
            Err(_) => return None,
        };

        if self.depth + 1 >= MAX_NESTING_DEPTH {
            log::warn!("Multipart nested deeper than {}, keeping as leaf", MAX_NESTING_DEPTH);
            return None;
        }

        let mut nested = Self::with_boundary(body.clone(), boundary)
            .default_charset(self.default_charset.clone());
        nested.depth = self.depth + 1;
        Some(nested)
    }
}

/// Decodes every part of `data` at once.
pub fn decode<B: Into<Bytes>>(data: B, content_type: &str) -> Result<Vec<Part>, Error> {
    let decoder = BufferedMultipartDecoder::new(data, content_type)?;
    Ok(decoder.parts().collect())
}

/// Transport padding tolerated between a boundary and its line break. A
/// longer run of blanks makes the boundary text part of the content.
pub(crate) const MAX_TRANSPORT_PADDING: usize = 256;

/// Skips transport padding, stopping after `MAX_TRANSPORT_PADDING` blanks.
fn skip_padding(data: &[u8], mut i: usize) -> usize {
    let limit = (i + MAX_TRANSPORT_PADDING).min(data.len());
    while i < limit && (data[i] == b' ' || data[i] == b'\t') {
        i += 1;
    }
    i
}

fn line_break_len(data: &[u8], i: usize) -> Option<usize> {
    match data.get(i..).unwrap_or(&[]) {
        [b'\r', b'\n', ..] => Some(2),
        [b'\n', ..] => Some(1),
        _ => None,
    }
}

/// The line break before a boundary belongs to the boundary.
fn strip_line_break(data: &[u8], end: usize) -> usize {
    if end >= 2 && &data[end - 2..end] == b"\r\n" {
        end - 2
    } else if end >= 1 && data[end - 1] == b'\n' {
        end - 1
    } else {
        end
    }
}

/// Locates the blank line ending a header block, returning the end of the
/// header block and the start of the body.
pub(crate) fn header_split(raw: &[u8]) -> Option<(usize, usize)> {
    if let Some(n) = line_break_len(raw, 0) {
        return Some((0, n));
    }

    let lf = twoway::find_bytes(raw, b"\n\n").map(|p| (p, p + 2));
    let crlf = twoway::find_bytes(raw, b"\n\r\n").map(|p| (p, p + 3));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
