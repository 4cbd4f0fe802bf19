use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::io::{self, Cursor, Read};

use crate::boundary::param;
use crate::sink::TempFile;

/// The headers of a single part, in wire order. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    entries: Vec<(String, String)>,
}

impl PartHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a header block. Folded lines are joined onto the previous
    /// header and lines without a `:` are skipped.
    pub fn parse(data: &[u8]) -> Self {
        let mut header = Self::new();
        let text = String::from_utf8_lossy(data);

        for line in text.split('\n') {
            // trim of the last \r
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = header.entries.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() {
                    header.append(name, value.trim());
                }
            }
        }

        header
    }

    pub fn append<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    /// The first value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The declared content type. Unparseable parameters are dropped rather
    /// than discarding the media type.
    pub fn content_type(&self) -> Option<mime::Mime> {
        let raw = self.get("content-type")?;
        raw.parse::<mime::Mime>().ok().or_else(|| {
            raw.split(';')
                .next()
                .and_then(|essence| essence.trim().parse::<mime::Mime>().ok())
        })
    }

    /// The `charset` parameter of the content type, if declared.
    pub fn charset(&self) -> Option<String> {
        self.get("content-type")
            .and_then(|ct| param(ct, "charset"))
            .filter(|cs| !cs.is_empty())
            .map(|cs| cs.to_ascii_lowercase())
    }

    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.get("content-disposition").map(ContentDisposition::parse)
    }

    /// The content id with its angle brackets removed.
    pub fn content_id(&self) -> Option<&str> {
        self.get("content-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
    }

    /// Declared body length from a `Content-Length` header.
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// The attachment filename, from the disposition or, as older mail
    /// clients send it, the content type's `name` parameter.
    pub fn filename(&self) -> Option<String> {
        self.content_disposition()
            .and_then(|cd| cd.filename)
            .or_else(|| {
                self.get("content-type")
                    .and_then(|ct| param(ct, "name"))
                    .map(str::to_string)
            })
    }

    /// Converts into a `http` header map, skipping headers `http` considers invalid.
    pub fn to_header_map(&self) -> HeaderMap<HeaderValue> {
        let mut res = HeaderMap::new();

        self.iter()
            .filter_map(|(name, value)| parse_header(name, value))
            .for_each(|(name, value)| {
                res.append(name, value);
            });

        res
    }
}

fn parse_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.trim().as_bytes());
    let header_value = HeaderValue::from_str(value.trim());

    match (header_name, header_value) {
        (Ok(name), Ok(value)) => Some((name, value)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionKind {
    Inline,
    Attachment,
    FormData,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    pub kind: DispositionKind,
    pub name: Option<String>,
    pub filename: Option<String>,
}

impl ContentDisposition {
    pub fn parse(value: &str) -> Self {
        let kind = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        let kind = match kind.as_str() {
            "inline" => DispositionKind::Inline,
            "attachment" => DispositionKind::Attachment,
            "form-data" => DispositionKind::FormData,
            _ => DispositionKind::Other(kind),
        };

        Self {
            kind,
            name: param(value, "name").map(str::to_string),
            filename: param(value, "filename").map(strip_path),
        }
    }
}

/// Some browsers send the full client side path as the filename.
fn strip_path(filename: &str) -> String {
    filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .to_string()
}

/// Where the bytes of a part body currently live.
#[derive(Debug)]
pub enum ByteSource {
    Memory(Bytes),
    TempFile(TempFile),
    /// The bytes were passed through to another consumer, only their count remains.
    Counted(u64),
}

impl ByteSource {
    pub fn len(&self) -> u64 {
        match self {
            ByteSource::Memory(bs) => bs.len() as u64,
            ByteSource::TempFile(file) => file.len(),
            ByteSource::Counted(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens the body for reading from the start.
    pub fn reader(&self) -> io::Result<Box<dyn Read + '_>> {
        match self {
            ByteSource::Memory(bs) => Ok(Box::new(Cursor::new(&bs[..]))),
            ByteSource::TempFile(file) => Ok(Box::new(file.open()?)),
            ByteSource::Counted(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                "part body was passed through and can not be read again",
            )),
        }
    }

    pub fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            ByteSource::Memory(bs) => Ok(bs),
            other => {
                let mut buf = Vec::with_capacity(other.len() as usize);
                other.reader()?.read_to_end(&mut buf)?;
                Ok(buf.into())
            }
        }
    }

    /// An in-memory copy, safe to hand across process boundaries.
    pub fn snapshot(&self) -> io::Result<ByteSource> {
        match self {
            ByteSource::Memory(bs) => Ok(ByteSource::Memory(bs.clone())),
            other => {
                let mut buf = Vec::with_capacity(other.len() as usize);
                other.reader()?.read_to_end(&mut buf)?;
                Ok(ByteSource::Memory(buf.into()))
            }
        }
    }
}

#[derive(Debug)]
pub enum PartContent {
    Leaf(ByteSource),
    Nested(Vec<Part>),
}

#[derive(Debug)]
pub struct Part {
    header: PartHeader,
    content: PartContent,
    declared_size: Option<u64>,
    charset: Option<String>,
}

impl Part {
    pub fn new(header: PartHeader, content: PartContent) -> Self {
        let declared_size = header.content_length();
        let charset = header.charset();
        Self {
            header,
            content,
            declared_size,
            charset,
        }
    }

    /// A leaf whose charset is guessed from its bytes when the header declares none.
    pub(crate) fn text(header: PartHeader, body: Bytes, default_charset: &str) -> Self {
        let mut part = Self::new(header, PartContent::Leaf(ByteSource::Memory(Bytes::new())));
        if part.charset.is_none() {
            part.charset = Some(detect_charset(&body, default_charset).to_string());
        }
        part.content = PartContent::Leaf(ByteSource::Memory(body));
        part
    }

    pub fn header(&self) -> &PartHeader {
        &self.header
    }

    pub fn content(&self) -> &PartContent {
        &self.content
    }

    pub fn into_content(self) -> PartContent {
        self.content
    }

    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// Declared charset, or the detected one for headerless text.
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.content, PartContent::Nested(_))
    }

    pub fn body(&self) -> Option<&ByteSource> {
        match &self.content {
            PartContent::Leaf(source) => Some(source),
            PartContent::Nested(_) => None,
        }
    }

    pub fn nested(&self) -> Option<&[Part]> {
        match &self.content {
            PartContent::Nested(parts) => Some(parts),
            PartContent::Leaf(_) => None,
        }
    }
}

/// Best effort charset of undeclared text.
pub(crate) fn detect_charset<'a>(body: &[u8], default_charset: &'a str) -> &'a str {
    if body.is_ascii() {
        "us-ascii"
    } else if std::str::from_utf8(body).is_ok() {
        "utf-8"
    } else {
        default_charset
    }
}
