use crate::PartHeader;

/// A header source, implemented for http::HeaderMap and for part headers.
/// Other frameworks plug in by implementing it for their own map type.
pub trait HeaderMap {
    fn get_value<K>(&self, header_key: K) -> Option<&str>
    where
        K: AsRef<str>;

    fn content_type(&self) -> Option<&str> {
        self.get_value("content-type")
    }

    fn content_length(&self) -> Option<u64> {
        self.get_value("content-length")
            .and_then(|v| v.trim().parse().ok())
    }
}

impl HeaderMap for http::header::HeaderMap {
    fn get_value<K>(&self, header_key: K) -> Option<&str>
    where
        K: AsRef<str>,
    {
        self.get(header_key.as_ref())
            .and_then(|hv| hv.to_str().ok())
    }
}

impl HeaderMap for PartHeader {
    fn get_value<K>(&self, header_key: K) -> Option<&str>
    where
        K: AsRef<str>,
    {
        self.get(header_key.as_ref())
    }
}

impl<'a, H: HeaderMap> HeaderMap for &'a H {
    fn get_value<K>(&self, header_key: K) -> Option<&str>
    where
        K: AsRef<str>,
    {
        (**self).get_value(header_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_headers_are_readable() {
        let mut headers = http::header::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            "multipart/form-data; boundary=xyz".parse().unwrap(),
        );
        headers.insert(http::header::CONTENT_LENGTH, "1234".parse().unwrap());

        assert_eq!(Some("multipart/form-data; boundary=xyz"), headers.content_type());
        assert_eq!(Some(1234), HeaderMap::content_length(&headers));
        assert_eq!(None, headers.get_value("x-missing"));
    }

    #[test]
    fn part_headers_are_readable() {
        let header = PartHeader::parse(b"Content-Type: text/plain\r\nContent-Length: 7\r\n");
        assert_eq!(Some("text/plain"), HeaderMap::content_type(&header));
        assert_eq!(Some(7), HeaderMap::content_length(&header));
    }
}
