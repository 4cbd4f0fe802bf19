//! Driving a [`StreamingMultipartReader`] to completion for an upload.
//!
//! The ingestion enforces quotas while bytes arrive, hands file bodies to the
//! sink chosen for them and tells registered listeners what happens. It ends
//! either `Completed` or `Aborted`, never both, and cleans up exactly once.

use std::io::{self, Read};

use crate::config::IngestConfig;
use crate::quota::{QuotaConfig, QuotaGuard};
use crate::session::{UploadSession, UploadedFile};
use crate::sink::{SinkFactory, SinkPolicy};
use crate::streaming::{FilePart, Item, StreamingMultipartReader};
use crate::{Error, FileInfo, ListenerError};

const COPY_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionState {
    Idle,
    ReadingFields,
    ReadingFilePart,
    Completed,
    Aborted,
}

impl IngestionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestionState::Completed | IngestionState::Aborted)
    }
}

/// Lifecycle callbacks. The first listener returning an error stops the
/// remaining listeners from hearing about that event, and the error reaches
/// the caller as [`Error::Listener`].
pub trait IngestionListener {
    /// Before any body byte of a file part is processed.
    fn before_file(&mut self, _info: &FileInfo) -> Result<(), ListenerError> {
        Ok(())
    }

    fn after_file(&mut self, _file: &UploadedFile) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_success(&mut self, _session: &UploadSession) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_failure(&mut self, _error: &Error) -> Result<(), ListenerError> {
        Ok(())
    }
}

pub struct Ingestion<R> {
    reader: StreamingMultipartReader<R>,
    quota: QuotaGuard,
    sinks: Box<dyn SinkFactory>,
    listeners: Vec<Box<dyn IngestionListener>>,
    session: UploadSession,
    state: IngestionState,
}

impl<R: Read> Ingestion<R> {
    pub fn new(reader: StreamingMultipartReader<R>, quota: QuotaConfig) -> Self {
        Self {
            reader,
            quota: QuotaGuard::new(quota),
            sinks: Box::new(SinkPolicy::default()),
            listeners: Vec::new(),
            session: UploadSession::new(),
            state: IngestionState::Idle,
        }
    }

    /// Reads a request body of the given content type as configured.
    pub fn from_config(source: R, content_type: &str, config: &IngestConfig) -> Result<Self, Error> {
        let reader = StreamingMultipartReader::from_content_type(source, content_type)?
            .options(config.reader_options());
        Ok(Self::new(reader, config.quota).sinks(config.sink_policy()))
    }

    #[must_use]
    pub fn sinks<F: SinkFactory + 'static>(mut self, sinks: F) -> Self {
        self.sinks = Box::new(sinks);
        self
    }

    /// Listeners are called in registration order.
    #[must_use]
    pub fn with_listener<L: IngestionListener + 'static>(mut self, listener: L) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Processes the next item. Returns `Ok(false)` once the ingestion has
    /// ended; after an error it is `Aborted` and every further call returns
    /// `Ok(false)`.
    pub fn step(&mut self) -> Result<bool, Error> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        if self.state == IngestionState::Idle {
            self.transition(IngestionState::ReadingFields);
        }

        match self.advance() {
            Ok(true) => Ok(true),
            Ok(false) => self.complete().map(|_| false),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Consumes the whole request, returning the populated session.
    pub fn run(mut self) -> Result<UploadSession, Error> {
        while self.step()? {}
        Ok(std::mem::take(&mut self.session))
    }

    fn advance(&mut self) -> Result<bool, Error> {
        let item = match self.reader.next() {
            Some(item) => item?,
            None => return Ok(false),
        };

        match item {
            Item::Field(field) => {
                self.quota.consume_field(field.value.len() as u64)?;
                self.session.add_field(field.name, field.value);
            }
            Item::File(part) => {
                log::debug!("Ingestion state ReadingFields -> ReadingFilePart");
                self.state = IngestionState::ReadingFilePart;
                ingest_file(
                    part,
                    &mut self.quota,
                    self.sinks.as_mut(),
                    &mut self.listeners,
                    &mut self.session,
                )?;
                self.transition(IngestionState::ReadingFields);
            }
        }

        Ok(true)
    }

    fn complete(&mut self) -> Result<(), Error> {
        if let Err(e) = self.quota.finish() {
            return Err(self.fail(e));
        }

        self.transition(IngestionState::Completed);
        for listener in self.listeners.iter_mut() {
            listener.on_success(&self.session).map_err(Error::Listener)?;
        }
        Ok(())
    }
}

impl<R> Ingestion<R> {
    pub fn state(&self) -> IngestionState {
        self.state
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Stops the ingestion, deleting everything it stored. Calling this on an
    /// ingestion that already ended does nothing.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let e = self.fail(Error::Io(io::Error::new(
            io::ErrorKind::Interrupted,
            "ingestion aborted",
        )));
        log::debug!("Ingestion aborted by caller: {}", e);
    }

    fn transition(&mut self, next: IngestionState) {
        log::debug!("Ingestion state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Moves to `Aborted`, cleans up and tells the listeners, returning the
    /// error the caller should see.
    fn fail(&mut self, error: Error) -> Error {
        self.transition(IngestionState::Aborted);
        self.session.cleanup();

        // A failing listener already short-circuited its event.
        if let Error::Listener(_) = error {
            return error;
        }

        for listener in self.listeners.iter_mut() {
            if let Err(le) = listener.on_failure(&error) {
                log::debug!("Failure listener failed while handling: {}", error);
                return Error::Listener(le);
            }
        }
        error
    }
}

impl<R> Drop for Ingestion<R> {
    fn drop(&mut self) {
        self.abort();
    }
}

fn ingest_file<R: Read>(
    mut part: FilePart<'_, R>,
    quota: &mut QuotaGuard,
    sinks: &mut dyn SinkFactory,
    listeners: &mut [Box<dyn IngestionListener>],
    session: &mut UploadSession,
) -> Result<(), Error> {
    let info = part.info().clone();
    for listener in listeners.iter_mut() {
        listener.before_file(&info).map_err(Error::Listener)?;
    }

    quota.begin_file();
    session.begin_file(info, sinks.open(part.info())?);

    let mut buf = [0u8; COPY_CHUNK];
    loop {
        let n = part.read_chunk(&mut buf)?;
        if n == 0 {
            break;
        }
        session.count(n as u64);

        if !quota.consume_file(n as u64) {
            // Keep the stream framed so the error reflects the real size.
            let drained = part.discard()?;
            session.count(drained);
            quota.drained(drained);
            return Err(quota
                .overflow()
                .unwrap_or_else(|| Error::malformed("quota tripped without a limit")));
        }
        session.write(&buf[..n])?;
    }

    let file = session.finish_file()?;
    for listener in listeners.iter_mut() {
        listener.after_file(file).map_err(Error::Listener)?;
    }
    Ok(())
}
