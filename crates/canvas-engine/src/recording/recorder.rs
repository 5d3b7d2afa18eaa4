use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tessera_protocol::Message;
use tracing::{debug, info};

use super::{RECORDING_EXTENSION, RECORDING_MAGIC, RECORDING_VERSION};
use crate::acl::AclState;
use crate::canvas::CanvasState;

#[derive(Debug, thiserror::Error)]
pub enum RecordStartError {
    #[error("Unknown recording format: {0} (expected .tsrec)")]
    UnknownFormat(PathBuf),
    #[error("Unable to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Unable to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Appends messages to a recording file.
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    writer: BufWriter<File>,
    buf: Vec<u8>,
    message_count: u64,
}

impl Recorder {
    /// Create a recording that starts from `canvas` and `acl`.
    pub fn start(path: &Path, canvas: &CanvasState, acl: &AclState) -> Result<Self, RecordStartError> {
        let is_recording = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(RECORDING_EXTENSION));
        if !is_recording {
            return Err(RecordStartError::UnknownFormat(path.to_path_buf()));
        }

        let file = File::create(path).map_err(|source| RecordStartError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut recorder = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            buf: Vec::new(),
            message_count: 0,
        };

        let write_err = |source| RecordStartError::Write {
            path: path.to_path_buf(),
            source,
        };
        recorder.write_header().map_err(write_err)?;
        let initial = canvas.to_reset_image(0).into_iter().chain(acl.to_reset_messages());
        for msg in initial {
            recorder.record(&msg).map_err(write_err)?;
        }
        recorder.writer.flush().map_err(write_err)?;

        info!(
            "Recording to {} ({} initial messages)",
            path.display(),
            recorder.message_count
        );
        Ok(recorder)
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.writer.write_all(RECORDING_MAGIC)?;
        self.writer.write_all(&RECORDING_VERSION.to_be_bytes())
    }

    /// Append one message.
    pub fn record(&mut self, msg: &Message) -> io::Result<()> {
        self.buf.clear();
        msg.encode_record(&mut self.buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(&self.buf)?;
        self.message_count += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flush and close the file.
    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()?;
        debug!("Closed recording {} after {} messages", self.path.display(), self.message_count);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }
}
