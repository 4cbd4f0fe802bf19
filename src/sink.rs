//! Materialization of file part bodies.
//!
//! Every sink owns its backing resource. Dropping an unfinished sink, or the
//! [`ByteSource`] a finished one produced, releases that resource; temp files
//! are removed at most once no matter how many paths try.

use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{ByteSource, FileInfo};

/// Bodies at or below this size stay in memory under [`SinkPolicy::default`].
pub const DEFAULT_MEMORY_THRESHOLD: u64 = 1024 * 1024;

/// A temporary file deleted when dropped.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    len: u64,
    removed: bool,
}

impl TempFile {
    pub(crate) fn create(dir: &Path) -> io::Result<(Self, File)> {
        let path = dir.join(format!("multipart-ingest-{}.tmp", uuid::Uuid::new_v4()));
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;

        log::trace!("Created temp file {}", path.display());

        Ok((
            Self {
                path,
                len: 0,
                removed: false,
            },
            file,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    /// Deletes the file. Calling this again, or dropping afterwards, is a no-op.
    pub fn remove(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }
        self.removed = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                log::trace!("Removed temp file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Moves the file to `target`, after which it is no longer deleted on drop.
    pub fn persist<P: AsRef<Path>>(mut self, target: P) -> io::Result<()> {
        std::fs::rename(&self.path, target.as_ref())?;
        self.removed = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::warn!("Failed to remove temp file {}: {}", self.path.display(), e);
        }
    }
}

/// Destination of a file part body.
pub trait PartSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Bytes accepted so far.
    fn written(&self) -> u64;

    fn finish(self: Box<Self>) -> io::Result<ByteSource>;
}

#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: BytesMut,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartSink for MemorySink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn finish(self: Box<Self>) -> io::Result<ByteSource> {
        Ok(ByteSource::Memory(self.buffer.freeze()))
    }
}

#[derive(Debug)]
pub struct TempFileSink {
    temp: TempFile,
    writer: BufWriter<File>,
}

impl TempFileSink {
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let (temp, file) = TempFile::create(dir.as_ref())?;
        Ok(Self {
            temp,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}

impl PartSink for TempFileSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)?;
        self.temp.len += chunk.len() as u64;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.temp.len
    }

    fn finish(self: Box<Self>) -> io::Result<ByteSource> {
        let TempFileSink { temp, mut writer } = *self;
        writer.flush()?;
        Ok(ByteSource::TempFile(temp))
    }
}

/// Buffers in memory and moves to a temp file once `threshold` is exceeded.
#[derive(Debug)]
pub struct SpillSink {
    threshold: u64,
    dir: PathBuf,
    memory: MemorySink,
    file: Option<TempFileSink>,
}

impl SpillSink {
    pub fn new<P: Into<PathBuf>>(threshold: u64, dir: P) -> Self {
        Self {
            threshold,
            dir: dir.into(),
            memory: MemorySink::new(),
            file: None,
        }
    }

    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }
}

impl PartSink for SpillSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            return file.write_chunk(chunk);
        }

        if self.memory.written() + chunk.len() as u64 <= self.threshold {
            return self.memory.write_chunk(chunk);
        }

        let mut file = TempFileSink::create(&self.dir)?;
        log::debug!(
            "Spilling part to {} after {} bytes",
            file.path().display(),
            self.memory.written()
        );
        file.write_chunk(&self.memory.buffer)?;
        file.write_chunk(chunk)?;
        self.memory = MemorySink::new();
        self.file = Some(file);
        Ok(())
    }

    fn written(&self) -> u64 {
        match self.file {
            Some(ref file) => file.written(),
            None => self.memory.written(),
        }
    }

    fn finish(self: Box<Self>) -> io::Result<ByteSource> {
        let SpillSink { memory, file, .. } = *self;
        match file {
            Some(file) => Box::new(file).finish(),
            None => Box::new(memory).finish(),
        }
    }
}

/// Discards the bytes, keeping their count.
#[derive(Debug, Default)]
pub struct CountingSink {
    count: u64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PartSink for CountingSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.count += chunk.len() as u64;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.count
    }

    fn finish(self: Box<Self>) -> io::Result<ByteSource> {
        Ok(ByteSource::Counted(self.count))
    }
}

/// Chooses the sink for each file part as it arrives.
pub trait SinkFactory {
    fn open(&mut self, info: &FileInfo) -> io::Result<Box<dyn PartSink>>;
}

impl<F> SinkFactory for F
where
    F: FnMut(&FileInfo) -> io::Result<Box<dyn PartSink>>,
{
    fn open(&mut self, info: &FileInfo) -> io::Result<Box<dyn PartSink>> {
        self(info)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkPolicy {
    Memory,
    TempFile { dir: PathBuf },
    /// Memory up to `threshold` bytes, a temp file beyond.
    Spill { threshold: u64, dir: PathBuf },
    Count,
}

impl Default for SinkPolicy {
    fn default() -> Self {
        SinkPolicy::Spill {
            threshold: DEFAULT_MEMORY_THRESHOLD,
            dir: std::env::temp_dir(),
        }
    }
}

impl SinkFactory for SinkPolicy {
    fn open(&mut self, info: &FileInfo) -> io::Result<Box<dyn PartSink>> {
        match self {
            SinkPolicy::Memory => Ok(Box::new(MemorySink::new())),
            SinkPolicy::TempFile { dir } => Ok(Box::new(TempFileSink::create(&*dir)?)),
            SinkPolicy::Spill { threshold, dir } => match info.declared_size {
                // Skip the memory stage when the client announced a large body.
                Some(size) if size > *threshold => Ok(Box::new(TempFileSink::create(&*dir)?)),
                _ => Ok(Box::new(SpillSink::new(*threshold, dir.clone()))),
            },
            SinkPolicy::Count => Ok(Box::new(CountingSink::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_all(source: &ByteSource) -> Vec<u8> {
        let mut out = Vec::new();
        source
            .reader()
            .expect("open source")
            .read_to_end(&mut out)
            .expect("read source");
        out
    }

    #[test]
    fn spill_sink_stays_in_memory_below_threshold() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut sink = Box::new(SpillSink::new(8, dir.path()));
        sink.write_chunk(b"1234").expect("write");
        sink.write_chunk(b"5678").expect("write");
        assert!(!sink.is_spilled());

        let source = sink.finish().expect("finish");
        assert!(matches!(source, ByteSource::Memory(_)));
        assert_eq!(b"12345678".to_vec(), read_all(&source));
    }

    #[test]
    fn spill_sink_moves_to_temp_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut sink = Box::new(SpillSink::new(4, dir.path()));
        sink.write_chunk(b"1234").expect("write");
        sink.write_chunk(b"5").expect("write");
        assert!(sink.is_spilled());
        sink.write_chunk(b"678").expect("write");
        assert_eq!(8, sink.written());

        let source = sink.finish().expect("finish");
        let path = match source {
            ByteSource::TempFile(ref temp) => temp.path().to_path_buf(),
            ref other => panic!("expected temp file, got {:?}", other),
        };
        assert_eq!(b"12345678".to_vec(), read_all(&source));
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));

        drop(source);
        assert!(!path.exists());
    }

    #[test]
    fn abandoned_temp_sink_removes_its_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut sink = TempFileSink::create(dir.path()).expect("create");
        sink.write_chunk(b"partial").expect("write");
        let path = sink.path().to_path_buf();
        assert!(path.exists());

        drop(sink);
        assert!(!path.exists());
    }

    #[test]
    fn temp_file_remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (mut temp, _file) = TempFile::create(dir.path()).expect("create");
        temp.remove().expect("first remove");
        assert!(temp.is_removed());
        temp.remove().expect("second remove");
        assert!(!temp.path().exists());
    }

    #[test]
    fn persisted_temp_file_survives_drop() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (temp, _file) = TempFile::create(dir.path()).expect("create");
        let target = dir.path().join("persisted.bin");

        temp.persist(&target).expect("persist");
        assert!(target.exists());
    }

    #[test]
    fn counting_sink_keeps_only_the_count() {
        let mut sink = Box::new(CountingSink::new());
        sink.write_chunk(&[0; 100]).expect("write");
        let source = sink.finish().expect("finish");
        assert_eq!(100, source.len());
        assert!(matches!(source, ByteSource::Counted(100)));
    }
}
