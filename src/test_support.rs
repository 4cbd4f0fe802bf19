//! Builders for multipart bodies used across the unit tests.

pub(crate) struct TestPart<'a> {
    pub headers: Vec<(String, String)>,
    pub body: &'a [u8],
}

impl<'a> TestPart<'a> {
    pub fn new(headers: &[(&str, &str)], body: &'a [u8]) -> TestPart<'a> {
        TestPart {
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body,
        }
    }

    pub fn field(name: &str, value: &'a str) -> TestPart<'a> {
        let disposition = format!("form-data; name=\"{}\"", name);
        TestPart::new(&[("Content-Disposition", disposition.as_str())], value.as_bytes())
    }

    pub fn file(name: &str, filename: &str, content_type: &str, body: &'a [u8]) -> TestPart<'a> {
        let disposition = format!("form-data; name=\"{}\"; filename=\"{}\"", name, filename);
        TestPart::new(
            &[("Content-Disposition", disposition.as_str()), ("Content-Type", content_type)],
            body,
        )
    }

    pub fn header_pairs(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }
}

/// Encodes `parts` with CRLF line endings and a terminal boundary.
pub(crate) fn encode(boundary: &str, parts: &[TestPart]) -> Vec<u8> {
    let mut out = Vec::new();

    for part in parts {
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        for (name, value) in &part.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(part.body);
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    out
}

/// A reader handing out at most `chunk` bytes per read, like a slow socket.
pub(crate) struct Trickle<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl<'a> Trickle<'a> {
    pub fn new(data: &'a [u8], chunk: usize) -> Self {
        Self { data, chunk }
    }
}

impl<'a> std::io::Read for Trickle<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}
