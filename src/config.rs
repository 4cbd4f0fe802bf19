use bytes::Bytes;
use std::path::PathBuf;

use crate::buffered::{BufferedMultipartDecoder, DEFAULT_CHARSET};
use crate::quota::QuotaConfig;
use crate::sink::{SinkPolicy, DEFAULT_MEMORY_THRESHOLD};
use crate::streaming::{ReaderOptions, DEFAULT_MAX_FIELD_SIZE, DEFAULT_MAX_HEADER_SIZE};
use crate::Error;

/// Settings for ingesting uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub quota: QuotaConfig,
    /// File bodies up to this size stay in memory, larger ones spill to disk.
    pub memory_threshold: u64,
    pub temp_dir: PathBuf,
    pub require_starting_form_field: bool,
    pub content_type_override: Option<String>,
    pub max_header_size: usize,
    pub max_field_size: usize,
    pub default_charset: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            quota: QuotaConfig::unlimited(),
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            temp_dir: std::env::temp_dir(),
            require_starting_form_field: false,
            content_type_override: None,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            default_charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl IngestConfig {
    /// Reads `MULTIPART_*` variables on top of the defaults. Unset or
    /// unparsable values keep their default; negative sizes are unlimited.
    ///
    /// | variable                        | field                         |
    /// |---------------------------------|-------------------------------|
    /// | `MULTIPART_MAX_FILE_SIZE`       | `quota.max_file_size`         |
    /// | `MULTIPART_MAX_TOTAL_SIZE`      | `quota.max_total_size`        |
    /// | `MULTIPART_MEMORY_THRESHOLD`    | `memory_threshold`            |
    /// | `MULTIPART_TEMP_DIR`            | `temp_dir`                    |
    /// | `MULTIPART_REQUIRE_FIRST_FIELD` | `require_starting_form_field` |
    /// | `MULTIPART_CONTENT_TYPE_HEADER` | `content_type_override`       |
    /// | `MULTIPART_MAX_HEADER_SIZE`     | `max_header_size`             |
    /// | `MULTIPART_MAX_FIELD_SIZE`      | `max_field_size`              |
    /// | `MULTIPART_DEFAULT_CHARSET`     | `default_charset`             |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let quota = QuotaConfig::from_limits(
            i64::from_env("MULTIPART_MAX_FILE_SIZE", -1),
            i64::from_env("MULTIPART_MAX_TOTAL_SIZE", -1),
        );

        let config = Self {
            quota,
            memory_threshold: u64::from_env("MULTIPART_MEMORY_THRESHOLD", defaults.memory_threshold),
            temp_dir: PathBuf::from(String::from_env(
                "MULTIPART_TEMP_DIR",
                defaults.temp_dir.to_string_lossy().into_owned(),
            )),
            require_starting_form_field: bool::from_env(
                "MULTIPART_REQUIRE_FIRST_FIELD",
                defaults.require_starting_form_field,
            ),
            content_type_override: Some(String::from_env("MULTIPART_CONTENT_TYPE_HEADER", String::new()))
                .filter(|name| !name.is_empty()),
            max_header_size: usize::from_env("MULTIPART_MAX_HEADER_SIZE", defaults.max_header_size),
            max_field_size: usize::from_env("MULTIPART_MAX_FIELD_SIZE", defaults.max_field_size),
            default_charset: String::from_env("MULTIPART_DEFAULT_CHARSET", defaults.default_charset),
        };

        log::debug!("Ingest config from environment: {:?}", config);
        config
    }

    #[must_use]
    pub fn quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    #[must_use]
    pub fn max_file_size(mut self, max: Option<u64>) -> Self {
        self.quota.max_file_size = max;
        self
    }

    #[must_use]
    pub fn max_total_size(mut self, max: Option<u64>) -> Self {
        self.quota.max_total_size = max;
        self
    }

    #[must_use]
    pub fn memory_threshold(mut self, threshold: u64) -> Self {
        self.memory_threshold = threshold;
        self
    }

    #[must_use]
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub fn require_starting_form_field(mut self, required: bool) -> Self {
        self.require_starting_form_field = required;
        self
    }

    #[must_use]
    pub fn content_type_override<S: Into<String>>(mut self, header: S) -> Self {
        self.content_type_override = Some(header.into());
        self
    }

    #[must_use]
    pub fn max_header_size(mut self, max: usize) -> Self {
        self.max_header_size = max;
        self
    }

    #[must_use]
    pub fn max_field_size(mut self, max: usize) -> Self {
        self.max_field_size = max;
        self
    }

    #[must_use]
    pub fn default_charset<S: Into<String>>(mut self, charset: S) -> Self {
        self.default_charset = charset.into();
        self
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            require_starting_form_field: self.require_starting_form_field,
            content_type_override: self.content_type_override.clone(),
            max_header_size: self.max_header_size,
            max_field_size: self.max_field_size,
        }
    }

    /// A decoder for an in-memory body that uses the configured charset.
    pub fn buffered_decoder<B: Into<Bytes>>(
        &self,
        data: B,
        content_type: &str,
    ) -> Result<BufferedMultipartDecoder, Error> {
        Ok(BufferedMultipartDecoder::new(data, content_type)?
            .default_charset(self.default_charset.clone()))
    }

    pub fn sink_policy(&self) -> SinkPolicy {
        SinkPolicy::Spill {
            threshold: self.memory_threshold,
            dir: self.temp_dir.clone(),
        }
    }
}

/// A value read from an environment variable, falling back to a default.
trait FromEnv: Sized {
    fn from_env(key: &str, default: Self) -> Self;
}

impl FromEnv for bool {
    fn from_env(key: &str, default: bool) -> bool {
        match std::env::var(key) {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => default,
            },
            Err(_) => default,
        }
    }
}

impl FromEnv for String {
    fn from_env(key: &str, default: String) -> String {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }
}

macro_rules! impl_from_env_num {
    ($($ty:ty)*) => {
        $(
            impl FromEnv for $ty {
                fn from_env(key: &str, default: $ty) -> $ty {
                    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
                }
            }
        )*
    };
}

impl_from_env_num!(i64 u64 usize);
