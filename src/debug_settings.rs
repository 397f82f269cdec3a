use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::APP_DIR_NAME;

const DEBUG_LOG_FILENAME: &str = "costboard-debug.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static DEBUG_LOG_FILE: Lazy<Option<Arc<Mutex<std::fs::File>>>> = Lazy::new(|| {
    let file = open_debug_log_file()
        .or_else(|_| open_fallback_log_file())
        .ok()?;
    Some(Arc::new(Mutex::new(file)))
});

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

pub fn debug_log_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(DEBUG_LOG_FILENAME))
}

pub fn file_writer() -> DebugFileWriter {
    DebugFileWriter {
        file: DEBUG_LOG_FILE.clone(),
    }
}

fn open_debug_log_file() -> io::Result<std::fs::File> {
    let log_path = debug_log_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    if let Some(log_dir) = log_path.parent() {
        std::fs::create_dir_all(log_dir)?;
    }
    OpenOptions::new().create(true).append(true).open(log_path)
}

fn open_fallback_log_file() -> io::Result<std::fs::File> {
    let path = std::env::temp_dir().join(DEBUG_LOG_FILENAME);
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer handed to the file fmt layer; drops output while file logging is off.
#[derive(Clone)]
pub struct DebugFileWriter {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl<'a> MakeWriter<'a> for DebugFileWriter {
    type Writer = DebugFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        DebugFileWriterGuard {
            file: self.file.clone(),
        }
    }
}

pub struct DebugFileWriterGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl Write for DebugFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !FILE_LOGGING_ENABLED.load(Ordering::Relaxed) {
            return Ok(buf.len());
        }

        match self.file.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.write(buf),
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !FILE_LOGGING_ENABLED.load(Ordering::Relaxed) {
            return Ok(());
        }
        match self.file.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_writer_swallows_output() {
        set_file_logging(false);
        let mut guard = DebugFileWriterGuard { file: None };
        assert_eq!(guard.write(b"dropped").unwrap(), 7);
        assert!(guard.flush().is_ok());
        assert!(!file_logging_enabled());
    }

    #[test]
    fn debug_log_lives_under_app_dir() {
        if let Some(path) = debug_log_path() {
            assert!(path.ends_with(format!("{APP_DIR_NAME}/{DEBUG_LOG_FILENAME}")));
        }
    }
}
