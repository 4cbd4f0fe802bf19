use std::collections::HashMap;

/// Maps a filename to the MIME type its extension implies.
pub trait MimeResolver {
    fn resolve(&self, filename: &str) -> Option<mime::Mime>;
}

/// Extension lookup backed by a case-insensitive table.
#[derive(Debug, Clone)]
pub struct ExtensionTable {
    types: HashMap<String, mime::Mime>,
}

impl ExtensionTable {
    /// A table with no mappings.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    pub fn insert<S: AsRef<str>>(&mut self, extension: S, mime_type: mime::Mime) {
        let ext = extension.as_ref().trim_start_matches('.').to_ascii_lowercase();
        self.types.insert(ext, mime_type);
    }

    #[must_use]
    pub fn with<S: AsRef<str>>(mut self, extension: S, mime_type: mime::Mime) -> Self {
        self.insert(extension, mime_type);
        self
    }
}

impl Default for ExtensionTable {
    fn default() -> Self {
        let known = [
            ("txt", mime::TEXT_PLAIN),
            ("csv", mime::TEXT_CSV),
            ("htm", mime::TEXT_HTML),
            ("html", mime::TEXT_HTML),
            ("css", mime::TEXT_CSS),
            ("js", mime::APPLICATION_JAVASCRIPT),
            ("json", mime::APPLICATION_JSON),
            ("xml", mime::TEXT_XML),
            ("pdf", mime::APPLICATION_PDF),
            ("png", mime::IMAGE_PNG),
            ("jpg", mime::IMAGE_JPEG),
            ("jpeg", mime::IMAGE_JPEG),
            ("gif", mime::IMAGE_GIF),
            ("bmp", mime::IMAGE_BMP),
            ("svg", mime::IMAGE_SVG),
            ("woff", mime::FONT_WOFF),
            ("woff2", mime::FONT_WOFF2),
        ];

        let mut table = Self::empty();
        for (ext, mime_type) in known.iter() {
            table.insert(ext, mime_type.clone());
        }

        let extra = [
            ("eml", "message/rfc822"),
            ("ics", "text/calendar"),
            ("vcf", "text/vcard"),
            ("zip", "application/zip"),
            ("gz", "application/gzip"),
            ("mp3", "audio/mpeg"),
            ("mp4", "video/mp4"),
            ("webp", "image/webp"),
            ("doc", "application/msword"),
            (
                "docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ),
            ("xls", "application/vnd.ms-excel"),
            (
                "xlsx",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
        ];
        for (ext, raw) in extra.iter() {
            if let Ok(mime_type) = raw.parse() {
                table.insert(ext, mime_type);
            }
        }

        table
    }
}

impl MimeResolver for ExtensionTable {
    fn resolve(&self, filename: &str) -> Option<mime::Mime> {
        let (_, ext) = filename.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        self.types.get(&ext.to_ascii_lowercase()).cloned()
    }
}

impl<F> MimeResolver for F
where
    F: Fn(&str) -> Option<mime::Mime>,
{
    fn resolve(&self, filename: &str) -> Option<mime::Mime> {
        self(filename)
    }
}
