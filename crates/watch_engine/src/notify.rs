use std::path::PathBuf;

use chrono::Utc;
use engine_logging::engine_info;
use thiserror::Error;

use crate::persist::{write_atomic, PersistError};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("could not write digest: {0}")]
    Persist(#[from] PersistError),
}

/// Delivers a scan digest to the operator.
pub trait Notifier: Send + Sync {
    fn send(&self, subject: &str, html_body: &str) -> Result<(), NotifyError>;
}

/// Writes digests to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, subject: &str, html_body: &str) -> Result<(), NotifyError> {
        engine_info!("{subject}\n{html_body}");
        Ok(())
    }
}

/// Drops each digest as a standalone HTML file into a directory.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, subject: &str, html_body: &str) -> Result<(), NotifyError> {
        let filename = format!("{}--digest.html", Utc::now().format("%Y%m%dT%H%M%S%.3f"));
        let path = self.dir.join(filename);
        let document = format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{}</body>\n</html>\n",
            escape_text(subject),
            escape_text(subject),
            html_body
        );
        write_atomic(&path, document.as_bytes())?;
        engine_info!("Digest written to {:?}", path);
        Ok(())
    }
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
