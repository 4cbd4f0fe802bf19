use std::fmt;
use std::io;
use uuid::Uuid;

use crate::sink::PartSink;
use crate::streaming::FormFields;
use crate::{ByteSource, FileInfo};

/// A file part that has been fully materialized.
#[derive(Debug)]
pub struct UploadedFile {
    info: FileInfo,
    content: ByteSource,
}

impl UploadedFile {
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn content(&self) -> &ByteSource {
        &self.content
    }

    pub fn len(&self) -> u64 {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_parts(self) -> (FileInfo, ByteSource) {
        (self.info, self.content)
    }
}

/// The file part whose body is currently being written.
pub struct PendingPart {
    info: FileInfo,
    sink: Box<dyn PartSink>,
}

impl PendingPart {
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn written(&self) -> u64 {
        self.sink.written()
    }
}

impl fmt::Debug for PendingPart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PendingPart")
            .field("info", &self.info)
            .field("written", &self.sink.written())
            .finish()
    }
}

/// Everything one ingestion has produced so far.
///
/// Owns the temp files behind its uploaded files: dropping the session, or
/// calling [`UploadSession::cleanup`], deletes them. Take the files out with
/// [`UploadSession::into_files`] to keep them.
#[derive(Debug)]
pub struct UploadSession {
    id: Uuid,
    fields: FormFields,
    files: Vec<UploadedFile>,
    current: Option<PendingPart>,
    total_bytes_seen: u64,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            fields: FormFields::default(),
            files: Vec::new(),
            current: None,
            total_bytes_seen: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn current_file_part(&self) -> Option<&PendingPart> {
        self.current.as_ref()
    }

    /// Field and file body bytes seen, including bytes drained past a quota.
    pub fn total_bytes_seen(&self) -> u64 {
        self.total_bytes_seen
    }

    pub fn into_files(mut self) -> Vec<UploadedFile> {
        std::mem::take(&mut self.files)
    }

    pub(crate) fn add_field(&mut self, name: String, value: String) {
        self.total_bytes_seen += value.len() as u64;
        self.fields.insert(name, value);
    }

    pub(crate) fn begin_file(&mut self, info: FileInfo, sink: Box<dyn PartSink>) {
        // An unfinished part left behind by a failure is released here.
        self.current = Some(PendingPart { info, sink });
    }

    pub(crate) fn count(&mut self, n: u64) {
        self.total_bytes_seen += n;
    }

    pub(crate) fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.current {
            Some(ref mut pending) => pending.sink.write_chunk(chunk),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "no file part in progress",
            )),
        }
    }

    pub(crate) fn finish_file(&mut self) -> io::Result<&UploadedFile> {
        let pending = self.current.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "no file part in progress")
        })?;

        let content = pending.sink.finish()?;
        log::debug!(
            "Session {}: stored {:?} ({} bytes)",
            self.id,
            pending.info.filename,
            content.len()
        );

        self.files.push(UploadedFile {
            info: pending.info,
            content,
        });

        // Just pushed.
        let last = self.files.len() - 1;
        Ok(&self.files[last])
    }

    /// Releases every temp resource held by the session. Safe to call any
    /// number of times.
    pub fn cleanup(&mut self) {
        if let Some(pending) = self.current.take() {
            log::debug!(
                "Session {}: discarding unfinished {:?}",
                self.id,
                pending.info.filename
            );
        }

        for file in self.files.iter_mut() {
            if let ByteSource::TempFile(ref mut temp) = file.content {
                if let Err(e) = temp.remove() {
                    log::warn!("Failed to remove {}: {}", temp.path().display(), e);
                }
            }
        }
        self.files.clear();
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}
