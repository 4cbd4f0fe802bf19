use log::{debug, error, info};
use multipart_ingest::{
    translate, BufferedMultipartDecoder, Error, FileInfo, IngestConfig, Ingestion,
    IngestionListener, ListenerError, Part, PartContent, UploadSession, UploadedFile,
};
use std::fs::File;

struct Printer;

impl IngestionListener for Printer {
    fn before_file(&mut self, file: &FileInfo) -> Result<(), ListenerError> {
        debug!("Receiving {:?} as {}", file.filename, file.content_type);
        Ok(())
    }

    fn after_file(&mut self, file: &UploadedFile) -> Result<(), ListenerError> {
        info!(
            "Stored {:?} ({})",
            file.info().filename,
            translate::format_size(file.len())
        );
        Ok(())
    }

    fn on_success(&mut self, session: &UploadSession) -> Result<(), ListenerError> {
        info!(
            "Upload {} complete: {} fields, {} files",
            session.id(),
            session.fields().len(),
            session.files().len()
        );
        Ok(())
    }

    fn on_failure(&mut self, e: &Error) -> Result<(), ListenerError> {
        error!("Upload failed: {}", translate::describe(e));
        Ok(())
    }
}

fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let path = std::env::var("UPLOAD_FILE").expect("UPLOAD_FILE must be set");
    let content_type =
        std::env::var("UPLOAD_CONTENT_TYPE").expect("UPLOAD_CONTENT_TYPE must be set");
    let config = IngestConfig::from_env();

    if content_type.trim_start().starts_with("multipart/form-data") {
        let body = File::open(&path).expect("Failed to open upload");
        let result = Ingestion::from_config(body, &content_type, &config)
            .map(|ingestion| ingestion.with_listener(Printer))
            .and_then(|ingestion| ingestion.run());

        match result {
            Ok(session) => {
                for (name, value) in session.fields().iter() {
                    debug!("Field {} = {:?}", name, value);
                }
            }
            Err(e) => error!("Error: {}", e),
        }
    } else {
        let data = std::fs::read(&path).expect("Failed to read message");
        let decoder: BufferedMultipartDecoder = config
            .buffered_decoder(data, &content_type)
            .expect("Not a multipart message");

        debug!("Boundaries at {:?}", decoder.positions().offsets());
        for part in decoder.parts() {
            print_part(&part, 0);
        }
    }
}

fn print_part(part: &Part, depth: usize) {
    let indent = "  ".repeat(depth);
    info!("{}==========================================", indent);
    for (name, value) in part.header().iter() {
        info!("{}Header: {}: {}", indent, name, value);
    }

    match part.content() {
        PartContent::Leaf(body) => info!(
            "{}Body: {} (charset {:?})",
            indent,
            translate::format_size(body.len()),
            part.charset()
        ),
        PartContent::Nested(parts) => {
            for nested in parts {
                print_part(nested, depth + 1);
            }
        }
    }
}
