//! Pull based multipart reading over a live byte source.
//!
//! Only a window of the request is held in memory: enough to recognise a
//! delimiter split across reads and one part header block. Form fields are
//! read eagerly, file parts hand out a [`FilePart`] that reads straight from
//! the source.

use bytes::{Buf, BytesMut};
use indexmap::IndexMap;
use std::io::{self, Read};

use crate::buffered::MAX_TRANSPORT_PADDING;
use crate::matcher::Matcher;
use crate::resolver::{ExtensionTable, MimeResolver};
use crate::translate::{into_io, translate_io};
use crate::{Boundary, Error, PartHeader};

/// Upper bound for one part header block.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Upper bound for one form field value.
pub const DEFAULT_MAX_FIELD_SIZE: usize = 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;


#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Reject a file part arriving before any form field.
    pub require_starting_form_field: bool,
    /// Part header whose value, when a valid `type/subtype`, overrides the
    /// content type of a file part.
    pub content_type_override: Option<String>,
    pub max_header_size: usize,
    pub max_field_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            require_starting_form_field: false,
            content_type_override: None,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
        }
    }
}

/// What is known about a file part before its body is read.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub field_name: String,
    pub filename: String,
    pub content_type: mime::Mime,
    /// The part's own `Content-Length`, when the client sent one.
    pub declared_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub header: PartHeader,
}

/// Simple form fields in the order they arrived.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    inner: IndexMap<String, String>,
}

impl FormFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A repeated name keeps its first position and takes the latest value.
    pub(crate) fn insert(&mut self, name: String, value: String) {
        self.inner.insert(name, value);
    }
}

pub enum Item<'a, R> {
    Field(FormField),
    File(FilePart<'a, R>),
}

/// The open body of a file part. Reading past its end returns `Ok(0)`.
pub struct FilePart<'a, R> {
    reader: &'a mut StreamingMultipartReader<R>,
    info: FileInfo,
    header: PartHeader,
    read: u64,
}

impl<'a, R: Read> FilePart<'a, R> {
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn header(&self) -> &PartHeader {
        &self.header
    }

    /// Body bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Like `Read::read` but keeps the error typed.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let n = self.reader.read_body(buf)?;
        self.read += n as u64;
        Ok(n)
    }

    /// Discards the rest of the body, returning how many bytes were skipped.
    pub fn discard(mut self) -> Result<u64, Error> {
        let mut scratch = [0u8; READ_CHUNK];
        let mut skipped = 0;
        loop {
            match self.read_chunk(&mut scratch)? {
                0 => return Ok(skipped),
                n => skipped += n as u64,
            }
        }
    }
}

impl<'a, R: Read> Read for FilePart<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(into_io)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Headers,
    Body,
    Done,
}

/// What follows a delimiter match in the buffer.
#[derive(Debug, PartialEq, Eq)]
enum Delimiter {
    /// A part boundary; the value is the buffer offset where headers begin.
    Next(usize),
    Terminal,
    NotBoundary,
    NeedMore,
}

pub struct StreamingMultipartReader<R> {
    source: R,
    buffer: BytesMut,
    boundary: Boundary,
    delimiter: Matcher,
    state: State,
    eof: bool,
    resolver: Box<dyn MimeResolver>,
    options: ReaderOptions,
    fields: FormFields,
    seen_field: bool,
    bytes_read: u64,
    declared_length: Option<u64>,
}

impl<R: Read> StreamingMultipartReader<R> {
    pub fn new(source: R, boundary: Boundary) -> Self {
        let mut pattern = Vec::with_capacity(boundary.len() + 1);
        pattern.push(b'\n');
        pattern.extend_from_slice(boundary.as_bytes());

        log::debug!("Creating streaming reader for boundary {:?}", boundary);

        // A virtual line break lets the first boundary match like any other.
        let mut buffer = BytesMut::with_capacity(READ_CHUNK * 2);
        buffer.extend_from_slice(b"\r\n");

        Self {
            source,
            buffer,
            boundary,
            delimiter: Matcher::new(pattern),
            state: State::Preamble,
            eof: false,
            resolver: Box::new(ExtensionTable::default()),
            options: ReaderOptions::default(),
            fields: FormFields::default(),
            seen_field: false,
            bytes_read: 0,
            declared_length: None,
        }
    }

    pub fn from_content_type(source: R, content_type: &str) -> Result<Self, Error> {
        Ok(Self::new(source, Boundary::from_content_type(content_type)?))
    }

    #[must_use]
    pub fn options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn resolver<M: MimeResolver + 'static>(mut self, resolver: M) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Records the request's announced length, when known.
    #[must_use]
    pub fn declared_length(mut self, length: Option<u64>) -> Self {
        self.declared_length = length;
        self
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn content_length(&self) -> Option<u64> {
        self.declared_length
    }

    /// Form fields seen so far, available as soon as each is yielded.
    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    /// Raw bytes pulled from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Advances to the next item in wire order.
    ///
    /// A file part from the previous call that was not read to its end is
    /// drained first. After an error the sequence is over.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<Item<'_, R>, Error>> {
        let header = match self.advance() {
            Ok(Some(header)) => header,
            Ok(None) => return None,
            Err(e) => {
                self.state = State::Done;
                return Some(Err(e));
            }
        };

        let disposition = header.content_disposition();
        let name = disposition
            .as_ref()
            .and_then(|d| d.name.clone())
            .unwrap_or_default();
        let filename = disposition.and_then(|d| d.filename);

        match filename {
            Some(filename) => {
                if self.options.require_starting_form_field && !self.seen_field {
                    self.state = State::Done;
                    return Some(Err(Error::MissingStartingField));
                }

                let info = FileInfo {
                    content_type: self.resolve_content_type(&header, &filename),
                    declared_size: header.content_length(),
                    field_name: name,
                    filename,
                };
                log::debug!("Yielding file part {:?}", info);

                Some(Ok(Item::File(FilePart {
                    reader: self,
                    info,
                    header,
                    read: 0,
                })))
            }
            None => match self.read_field() {
                Ok(value) => {
                    log::debug!("Yielding field {:?} ({} bytes)", name, value.len());
                    self.seen_field = true;
                    self.fields.insert(name.clone(), value.clone());
                    Some(Ok(Item::Field(FormField {
                        name,
                        value,
                        header,
                    })))
                }
                Err(e) => {
                    self.state = State::Done;
                    Some(Err(e))
                }
            },
        }
    }

    /// Positions the reader at the start of the next part body and returns
    /// the part's headers, or `None` once the terminal boundary is passed.
    fn advance(&mut self) -> Result<Option<PartHeader>, Error> {
        loop {
            match self.state {
                State::Preamble => self.skip_preamble()?,
                State::Body => {
                    let mut scratch = [0u8; READ_CHUNK];
                    let mut drained = 0;
                    loop {
                        match self.read_body(&mut scratch)? {
                            0 => break,
                            n => drained += n,
                        }
                    }
                    if drained > 0 {
                        log::debug!("Skipped {} unread body bytes", drained);
                    }
                }
                State::Headers => return self.read_headers().map(Some),
                State::Done => return Ok(None),
            }
        }
    }

    fn skip_preamble(&mut self) -> Result<(), Error> {
        loop {
            match self.delimiter.find(&self.buffer, 0) {
                Some(p) => match self.classify(p + self.delimiter.len()) {
                    Delimiter::Next(start) => {
                        self.buffer.advance(start);
                        self.state = State::Headers;
                        return Ok(());
                    }
                    Delimiter::Terminal => {
                        log::debug!("Terminal boundary before any part");
                        self.finish();
                        return Ok(());
                    }
                    Delimiter::NotBoundary => self.buffer.advance(p + 1),
                    // Once the source is exhausted classify never asks for more.
                    Delimiter::NeedMore => {
                        self.fill()?;
                    }
                },
                None => {
                    let keep = self.delimiter.len();
                    if self.buffer.len() > keep {
                        let skip = self.buffer.len() - keep;
                        self.buffer.advance(skip);
                    }
                    if !self.fill()? {
                        if self.bytes_read == 0 {
                            log::debug!("Empty multipart stream");
                            self.finish();
                            return Ok(());
                        }
                        return Err(Error::UnexpectedEof);
                    }
                }
            }
        }
    }

    fn read_headers(&mut self) -> Result<PartHeader, Error> {
        loop {
            if let Some((end, body_start)) = crate::buffered::header_split(&self.buffer) {
                if end > self.options.max_header_size {
                    return Err(Error::malformed("part header block too large"));
                }
                let header = PartHeader::parse(&self.buffer[..end]);
                self.buffer.advance(body_start);
                self.state = State::Body;
                return Ok(header);
            }

            if self.buffer.len() > self.options.max_header_size {
                return Err(Error::malformed("part header block too large"));
            }
            if !self.fill()? {
                return Err(Error::UnexpectedEof);
            }
        }
    }

    fn read_field(&mut self) -> Result<String, Error> {
        let mut value = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.read_body(&mut chunk)?;
            if n == 0 {
                break;
            }
            if value.len() + n > self.options.max_field_size {
                return Err(Error::malformed(format!(
                    "form field exceeds {} bytes",
                    self.options.max_field_size
                )));
            }
            value.extend_from_slice(&chunk[..n]);
        }

        Ok(match String::from_utf8(value) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Copies body bytes of the current part into `out`. Returns `Ok(0)` once
    /// the delimiter ending the part has been consumed.
    fn read_body(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if self.state != State::Body {
                return Ok(0);
            }

            match self.delimiter.find(&self.buffer, 0) {
                Some(p) => {
                    let data_end = if p > 0 && self.buffer[p - 1] == b'\r' {
                        p - 1
                    } else {
                        p
                    };
                    if data_end > 0 {
                        return Ok(self.emit(data_end, out));
                    }

                    match self.classify(p + self.delimiter.len()) {
                        Delimiter::Next(start) => {
                            self.buffer.advance(start);
                            self.state = State::Headers;
                            return Ok(0);
                        }
                        Delimiter::Terminal => {
                            log::debug!("Found terminal boundary");
                            self.finish();
                            return Ok(0);
                        }
                        // Boundary text inside the content, line break included.
                        Delimiter::NotBoundary => return Ok(self.emit(p + 1, out)),
                        Delimiter::NeedMore => {
                            self.fill()?;
                        }
                    }
                }
                None => {
                    // The tail may hold the start of a delimiter.
                    let keep = self.delimiter.len();
                    if self.buffer.len() > keep {
                        return Ok(self.emit(self.buffer.len() - keep, out));
                    }
                    if !self.fill()? {
                        return Err(Error::UnexpectedEof);
                    }
                }
            }
        }
    }

    fn emit(&mut self, available: usize, out: &mut [u8]) -> usize {
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        n
    }

    /// Decides what the bytes at `after`, right behind a delimiter, mean.
    fn classify(&self, after: usize) -> Delimiter {
        let rest = &self.buffer[after..];

        let (terminal, rest) = match rest {
            [b'-', b'-', tail @ ..] => (true, tail),
            [] | [b'-'] if !self.eof => return Delimiter::NeedMore,
            _ => (false, rest),
        };

        let padding = rest
            .iter()
            .take_while(|&&b| b == b' ' || b == b'\t')
            .count();
        if padding > MAX_TRANSPORT_PADDING {
            return Delimiter::NotBoundary;
        }

        match &rest[padding..] {
            [] | [b'\r'] if !self.eof => Delimiter::NeedMore,
            [] | [b'\r'] if terminal => Delimiter::Terminal,
            [b'\n', ..] | [b'\r', b'\n', ..] if terminal => Delimiter::Terminal,
            [b'\n', ..] => Delimiter::Next(after + padding + 1),
            [b'\r', b'\n', ..] => Delimiter::Next(after + padding + 2),
            _ => Delimiter::NotBoundary,
        }
    }

    /// Pulls the next chunk from the source. `Ok(false)` at end of stream.
    fn fill(&mut self) -> Result<bool, Error> {
        if self.eof {
            return Ok(false);
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.source.read(&mut chunk) {
                Ok(0) => {
                    log::trace!("Source exhausted after {} bytes", self.bytes_read);
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    self.bytes_read += n as u64;
                    return Ok(true);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(translate_io(e)),
            }
        }
    }

    /// Everything after the terminal boundary is epilogue.
    fn finish(&mut self) {
        self.state = State::Done;
        self.buffer.clear();
    }

    fn resolve_content_type(&self, header: &PartHeader, filename: &str) -> mime::Mime {
        let overridden = self
            .options
            .content_type_override
            .as_deref()
            .and_then(|name| header.get(name))
            .and_then(|value| value.trim().parse::<mime::Mime>().ok())
            .filter(|m| m.type_() != mime::STAR && m.subtype() != mime::STAR);
        if let Some(m) = overridden {
            return m;
        }

        if let Some(m) = self.resolver.resolve(filename) {
            return m;
        }

        match header.content_type() {
            Some(ct) if !(ct.type_() == mime::MULTIPART && ct.subtype() == mime::FORM_DATA) => ct,
            _ => mime::APPLICATION_OCTET_STREAM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{encode, TestPart, Trickle};

    const BOUNDARY: &str = "AaB03x";

    fn reader(data: &[u8], chunk: usize) -> StreamingMultipartReader<Trickle<'_>> {
        StreamingMultipartReader::new(Trickle::new(data, chunk), Boundary::new(BOUNDARY).unwrap())
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Field(String, String),
        File(String, String, String, Vec<u8>),
    }

    fn collect<R: Read>(mut reader: StreamingMultipartReader<R>) -> Result<Vec<Seen>, Error> {
        let mut seen = Vec::new();
        while let Some(item) = reader.next() {
            match item? {
                Item::Field(f) => seen.push(Seen::Field(f.name, f.value)),
                Item::File(mut file) => {
                    let mut body = Vec::new();
                    file.read_to_end(&mut body).map_err(translate_io)?;
                    let info = file.info().clone();
                    seen.push(Seen::File(
                        info.field_name,
                        info.filename,
                        info.content_type.to_string(),
                        body,
                    ));
                }
            }
        }
        Ok(seen)
    }

    fn form() -> Vec<u8> {
        encode(
            BOUNDARY,
            &[
                TestPart::field("a", "1"),
                TestPart::field("b", "2"),
                TestPart::file("f", "notes.txt", "text/plain", b"line one\r\nline two"),
            ],
        )
    }

    #[test]
    fn items_are_yielded_in_wire_order() {
        let data = form();
        for chunk in &[1, 3, 7, 64, 8192] {
            let seen = collect(reader(&data, *chunk)).unwrap();
            assert_eq!(
                vec![
                    Seen::Field("a".into(), "1".into()),
                    Seen::Field("b".into(), "2".into()),
                    Seen::File(
                        "f".into(),
                        "notes.txt".into(),
                        "text/plain".into(),
                        b"line one\r\nline two".to_vec()
                    ),
                ],
                seen,
                "chunk size {}",
                chunk
            );
        }
    }

    #[test]
    fn fields_are_available_as_they_arrive() {
        let data = form();
        let mut reader = reader(&data, 5);

        assert!(matches!(reader.next(), Some(Ok(Item::Field(_)))));
        assert_eq!(Some("1"), reader.fields().get("a"));
        assert_eq!(None, reader.fields().get("b"));

        assert!(matches!(reader.next(), Some(Ok(Item::Field(_)))));
        assert_eq!(
            vec![("a", "1"), ("b", "2")],
            reader.fields().iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn unread_file_bodies_are_skipped() {
        let big = vec![b'x'; 50_000];
        let data = encode(
            BOUNDARY,
            &[
                TestPart::file("one", "a.bin", "application/x-thing", &big),
                TestPart::file("two", "b.bin", "application/x-thing", b"second"),
                TestPart::field("after", "yes"),
            ],
        );

        let mut reader = reader(&data, 1000);
        match reader.next() {
            Some(Ok(Item::File(mut file))) => {
                let mut head = [0u8; 10];
                file.read_exact(&mut head).unwrap();
                assert_eq!(b"xxxxxxxxxx", &head);
            }
            _ => panic!("expected first file"),
        }

        match reader.next() {
            Some(Ok(Item::File(mut file))) => {
                assert_eq!("b.bin", file.info().filename);
                let mut body = Vec::new();
                file.read_to_end(&mut body).unwrap();
                assert_eq!(b"second".to_vec(), body);
            }
            _ => panic!("expected second file"),
        }

        assert!(matches!(reader.next(), Some(Ok(Item::Field(f))) if f.value == "yes"));
        assert!(reader.next().is_none());
        assert!(reader.is_done());
    }

    #[test]
    fn delimiter_lookalikes_stay_in_the_body() {
        let body = b"head\r\n--AaB03xtrailing\r\n--AaB03 \n--Aa";
        let data = encode(
            BOUNDARY,
            &[TestPart::file("f", "x.dat", "application/x-thing", body)],
        );

        for chunk in &[1, 2, 13] {
            let seen = collect(reader(&data, *chunk)).unwrap();
            match &seen[..] {
                [Seen::File(_, _, _, got)] => assert_eq!(&body[..], &got[..]),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn preamble_padding_and_bare_line_feeds() {
        let data = b"ignored preamble\n--AaB03x  \nContent-Disposition: form-data; name=\"k\"\n\nv\n--AaB03x--\nepilogue";
        let seen = collect(reader(data, 4)).unwrap();
        assert_eq!(vec![Seen::Field("k".into(), "v".into())], seen);
    }

    #[test]
    fn missing_terminal_boundary_is_unexpected_eof() {
        let data = b"--AaB03x\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nvalue";
        let mut reader = reader(data, 3);
        match reader.next() {
            Some(Err(Error::UnexpectedEof)) => {}
            other => panic!("unexpected {:?}", other.map(|r| r.is_ok())),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn body_may_end_right_after_the_terminal_boundary() {
        let data = b"--AaB03x\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nv\r\n--AaB03x--";
        for chunk in 1..=data.len() {
            assert_eq!(
                vec![Seen::Field("k".into(), "v".into())],
                collect(reader(data, chunk)).unwrap(),
                "chunk size {}",
                chunk
            );
        }

        let mut with_cr = data.to_vec();
        with_cr.push(b'\r');
        assert_eq!(1, collect(reader(&with_cr, 4)).unwrap().len());

        for chunk in &[1, 3, 64] {
            assert!(collect(reader(b"--AaB03x--", *chunk)).unwrap().is_empty());
            assert!(collect(reader(b"--AaB03x--\r", *chunk)).unwrap().is_empty());
        }
    }

    #[test]
    fn transport_padding_is_bounded() {
        let body = |padding: usize| {
            format!(
                "--AaB03x\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nfirst\r\n\
                 --AaB03x{}\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\nsecond\r\n\
                 --AaB03x--\r\n",
                " ".repeat(padding)
            )
        };

        for chunk in &[7, 512] {
            let within = body(MAX_TRANSPORT_PADDING);
            assert_eq!(
                vec![
                    Seen::Field("a".into(), "first".into()),
                    Seen::Field("b".into(), "second".into()),
                ],
                collect(reader(within.as_bytes(), *chunk)).unwrap()
            );

            let beyond = body(MAX_TRANSPORT_PADDING + 1);
            let start = beyond.find("first").unwrap();
            let end = beyond.rfind("\r\n--AaB03x--").unwrap();
            assert_eq!(
                vec![Seen::Field("a".into(), beyond[start..end].to_string())],
                collect(reader(beyond.as_bytes(), *chunk)).unwrap()
            );
        }
    }

    #[test]
    fn empty_stream_has_no_items() {
        assert!(collect(reader(b"", 1)).unwrap().is_empty());
    }

    #[test]
    fn stream_without_boundary_is_unexpected_eof() {
        assert!(matches!(
            collect(reader(b"just some bytes", 4)),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn starting_form_field_can_be_required() {
        let data = encode(
            BOUNDARY,
            &[
                TestPart::file("f", "a.txt", "text/plain", b"data"),
                TestPart::field("action", "upload"),
            ],
        );
        let options = ReaderOptions {
            require_starting_form_field: true,
            ..ReaderOptions::default()
        };

        let mut strict = reader(&data, 16).options(options.clone());
        assert!(matches!(strict.next(), Some(Err(Error::MissingStartingField))));
        assert!(strict.next().is_none());

        let data = form();
        assert_eq!(3, collect(reader(&data, 16).options(options)).unwrap().len());
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let data = encode(BOUNDARY, &[TestPart::field("big", "0123456789")]);
        let options = ReaderOptions {
            max_field_size: 9,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            collect(reader(&data, 3).options(options)),
            Err(Error::MalformedMultipart(_))
        ));
    }

    #[test]
    fn oversized_header_blocks_are_rejected() {
        let long = "x".repeat(200);
        let data = encode(
            BOUNDARY,
            &[TestPart::new(&[("X-Long", long.as_str())], b"")],
        );
        let options = ReaderOptions {
            max_header_size: 64,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            collect(reader(&data, 8).options(options)),
            Err(Error::MalformedMultipart(_))
        ));
    }

    fn resolved(headers: Vec<(&str, &str)>, filename: &str, options: ReaderOptions) -> String {
        let disposition = format!("form-data; name=\"f\"; filename=\"{}\"", filename);
        let mut all = vec![("Content-Disposition", disposition.as_str())];
        all.extend(headers);
        let data = encode(BOUNDARY, &[TestPart::new(&all, b"x")]);

        let mut reader = reader(&data, 64).options(options);
        match reader.next() {
            Some(Ok(Item::File(file))) => file.info().content_type.to_string(),
            _ => panic!("expected a file part"),
        }
    }

    #[test]
    fn file_content_type_resolution_order() {
        let with_override = ReaderOptions {
            content_type_override: Some("X-Content-Type".into()),
            ..ReaderOptions::default()
        };

        assert_eq!(
            "image/gif",
            resolved(
                vec![("X-Content-Type", "image/gif"), ("Content-Type", "text/plain")],
                "a.png",
                with_override.clone()
            )
        );
        assert_eq!(
            "image/png",
            resolved(vec![("X-Content-Type", "not a type")], "a.png", with_override)
        );
        assert_eq!(
            "application/x-custom",
            resolved(
                vec![("Content-Type", "application/x-custom")],
                "a.unknownext",
                ReaderOptions::default()
            )
        );
        assert_eq!(
            "application/octet-stream",
            resolved(
                vec![("Content-Type", "multipart/form-data")],
                "a.unknownext",
                ReaderOptions::default()
            )
        );
        assert_eq!(
            "application/octet-stream",
            resolved(vec![], "noext", ReaderOptions::default())
        );
    }

    #[test]
    fn custom_resolver_is_consulted() {
        let data = encode(
            BOUNDARY,
            &[TestPart::file("f", "scan.dcm", "application/x-thing", b"x")],
        );
        let resolver = |name: &str| {
            if name.ends_with(".dcm") {
                "application/dicom".parse::<mime::Mime>().ok()
            } else {
                None
            }
        };

        let mut reader = reader(&data, 64).resolver(resolver);
        match reader.next() {
            Some(Ok(Item::File(file))) => {
                assert_eq!("application/dicom", file.info().content_type.to_string())
            }
            _ => panic!("expected a file part"),
        }
    }

    #[test]
    fn declared_part_length_is_exposed() {
        let data = encode(
            BOUNDARY,
            &[TestPart::new(
                &[
                    ("Content-Disposition", "form-data; name=\"f\"; filename=\"a.bin\""),
                    ("Content-Length", "4"),
                ],
                b"abcd",
            )],
        );
        let mut reader = reader(&data, 64);
        match reader.next() {
            Some(Ok(Item::File(file))) => {
                assert_eq!(Some(4), file.info().declared_size);
                assert_eq!(4, file.discard().unwrap());
            }
            _ => panic!("expected a file part"),
        };
    }
}
