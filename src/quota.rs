use crate::Error;

/// Size ceilings for one ingestion. `None` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaConfig {
    pub max_file_size: Option<u64>,
    pub max_total_size: Option<u64>,
}

impl QuotaConfig {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn new(max_file_size: Option<u64>, max_total_size: Option<u64>) -> Self {
        Self {
            max_file_size,
            max_total_size,
        }
    }

    /// Builds from signed limits where any negative value means unlimited.
    pub fn from_limits(max_file_size: i64, max_total_size: i64) -> Self {
        Self {
            max_file_size: limit(max_file_size),
            max_total_size: limit(max_total_size),
        }
    }
}

fn limit(value: i64) -> Option<u64> {
    if value < 0 {
        None
    } else {
        Some(value as u64)
    }
}

/// Running byte counters checked against a [`QuotaConfig`] as bytes arrive.
///
/// Once a ceiling is crossed the guard stays tripped; the caller keeps
/// reporting drained bytes through [`QuotaGuard::drained`] so the error can
/// carry the real size, then takes it with [`QuotaGuard::overflow`].
#[derive(Debug)]
pub struct QuotaGuard {
    config: QuotaConfig,
    file_bytes: u64,
    total_bytes: u64,
    tripped: Option<Trip>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trip {
    File,
    Total,
}

impl QuotaGuard {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            file_bytes: 0,
            total_bytes: 0,
            tripped: None,
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn file_bytes(&self) -> u64 {
        self.file_bytes
    }

    pub fn begin_file(&mut self) {
        self.file_bytes = 0;
    }

    /// Accounts for `n` bytes of the current file part.
    ///
    /// Returns `false` the moment either ceiling is exceeded.
    pub fn consume_file(&mut self, n: u64) -> bool {
        self.file_bytes += n;
        self.total_bytes += n;

        if self.tripped.is_none() {
            if exceeds(self.file_bytes, self.config.max_file_size) {
                log::debug!(
                    "File quota exceeded: {} > {:?}",
                    self.file_bytes,
                    self.config.max_file_size
                );
                self.tripped = Some(Trip::File);
            } else if exceeds(self.total_bytes, self.config.max_total_size) {
                log::debug!(
                    "Total quota exceeded: {} > {:?}",
                    self.total_bytes,
                    self.config.max_total_size
                );
                self.tripped = Some(Trip::Total);
            }
        }

        self.tripped.is_none()
    }

    /// Accounts for bytes read past the ceiling only to keep the stream framed.
    pub fn drained(&mut self, n: u64) {
        self.file_bytes += n;
        self.total_bytes += n;
    }

    /// Accounts for a form field value, which only counts towards the total.
    pub fn consume_field(&mut self, n: u64) -> Result<(), Error> {
        self.total_bytes += n;
        self.check_total()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.is_some()
    }

    /// The error for a tripped guard, sized with everything seen so far.
    pub fn overflow(&self) -> Option<Error> {
        match self.tripped? {
            Trip::File => Some(Error::FileSizeExceeded {
                actual: self.file_bytes,
                permitted: self.config.max_file_size.unwrap_or(u64::MAX),
            }),
            Trip::Total => Some(Error::TotalSizeExceeded {
                actual: self.total_bytes,
                permitted: self.config.max_total_size.unwrap_or(u64::MAX),
            }),
        }
    }

    /// The final total check once every item has been consumed.
    pub fn finish(&self) -> Result<(), Error> {
        if let Some(e) = self.overflow() {
            return Err(e);
        }
        self.check_total()
    }

    fn check_total(&self) -> Result<(), Error> {
        match self.config.max_total_size {
            Some(max) if self.total_bytes > max => Err(Error::TotalSizeExceeded {
                actual: self.total_bytes,
                permitted: max,
            }),
            _ => Ok(()),
        }
    }
}

fn exceeds(count: u64, ceiling: Option<u64>) -> bool {
    ceiling.map_or(false, |max| count > max)
}
