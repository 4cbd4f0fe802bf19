use bytes::Bytes;

use crate::Error;

/// The delimiter separating the sections of a multipart body, stored with
/// its leading `--`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    delimiter: Bytes,
}

impl Boundary {
    pub fn new<S: AsRef<str>>(token: S) -> Result<Self, Error> {
        let token = token.as_ref();
        if token.is_empty() {
            return Err(Error::MissingBoundary);
        }

        let delimiter = format!("--{}", token);
        log::debug!("Creating with boundary: {:?}", delimiter);

        Ok(Self {
            delimiter: Bytes::from(delimiter),
        })
    }

    /// Extracts the boundary of a `multipart/*` content type value.
    pub fn from_content_type(content_type: &str) -> Result<Self, Error> {
        match content_type.parse::<mime::Mime>() {
            Ok(ct) => {
                if ct.type_() != mime::MULTIPART {
                    return Err(Error::NotMultipart);
                }

                match ct.get_param(mime::BOUNDARY) {
                    Some(boundary) => Self::new(boundary.as_str().trim_matches('"')),
                    None => Err(Error::MissingBoundary),
                }
            }

            // Mail clients produce boundaries `mime` refuses to parse, fall
            // back to a plain parameter scan.
            Err(e) => {
                let essence = content_type.split(';').next().unwrap_or("").trim();
                if !is_multipart_essence(essence) {
                    return Err(Error::InvalidMimeType(e));
                }

                match param(content_type, "boundary") {
                    Some(boundary) => {
                        log::debug!("Lenient boundary parse of {:?}", content_type);
                        Self::new(boundary)
                    }
                    None => Err(Error::MissingBoundary),
                }
            }
        }
    }

    /// The declared token, without the leading `--`.
    pub fn token(&self) -> &[u8] {
        &self.delimiter[2..]
    }

    /// The delimiter as it appears on the wire, `--` followed by the token.
    pub fn as_bytes(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn len(&self) -> usize {
        self.delimiter.len()
    }
}

fn is_multipart_essence(essence: &str) -> bool {
    essence
        .split('/')
        .next()
        .map_or(false, |t| t.trim().eq_ignore_ascii_case("multipart"))
}

/// Looks up a `;` separated parameter, unquoting its value. Quoted values
/// may contain `;`.
pub(crate) fn param<'a>(value: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = value.split_once(';')?.1;

    loop {
        let (key, after_eq) = rest.split_once('=')?;
        let key = key.trim();
        let after_eq = after_eq.trim_start();

        let (val, next) = if let Some(quoted) = after_eq.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    let tail = &quoted[end + 1..];
                    let next = tail.split_once(';').map(|(_, n)| n);
                    (&quoted[..end], next)
                }
                None => (quoted, None),
            }
        } else {
            match after_eq.split_once(';') {
                Some((v, n)) => (v.trim(), Some(n)),
                None => (after_eq.trim(), None),
            }
        };

        if key.eq_ignore_ascii_case(name) {
            return Some(val);
        }

        rest = next?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_from_form_data() {
        let b = Boundary::from_content_type(
            "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW",
        )
        .expect("boundary");

        assert_eq!(b"------WebKitFormBoundary7MA4YWxkTrZu0gW", b.as_bytes());
        assert_eq!(b"----WebKitFormBoundary7MA4YWxkTrZu0gW", b.token());
    }

    #[test]
    fn quoted_boundary_with_spaces() {
        let b = Boundary::from_content_type("multipart/mixed; boundary=\"simple boundary\"")
            .expect("boundary");
        assert_eq!(b"--simple boundary", b.as_bytes());
    }

    #[test]
    fn lenient_boundary_parse() {
        let b = Boundary::from_content_type("Multipart/Mixed; boundary=\"=_a;b?c\"; charset=x")
            .expect("boundary");
        assert_eq!(b"=_a;b?c", b.token());
    }

    #[test]
    fn missing_boundary_is_an_error() {
        assert!(matches!(
            Boundary::from_content_type("multipart/mixed"),
            Err(Error::MissingBoundary)
        ));
        assert!(matches!(
            Boundary::from_content_type("multipart/mixed; boundary=\"\""),
            Err(Error::MissingBoundary)
        ));
    }

    #[test]
    fn non_multipart_is_rejected() {
        assert!(matches!(
            Boundary::from_content_type("text/plain; boundary=x"),
            Err(Error::NotMultipart)
        ));
    }

    #[test]
    fn param_lookup() {
        let v = "attachment; filename=\"a; b.txt\"; size=10";
        assert_eq!(Some("a; b.txt"), param(v, "filename"));
        assert_eq!(Some("10"), param(v, "SIZE"));
        assert_eq!(None, param(v, "name"));
    }
}
