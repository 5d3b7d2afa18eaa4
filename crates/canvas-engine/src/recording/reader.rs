use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use tessera_protocol::{DecodeError, Message, RecordHeader, HEADER_LEN};

use super::{RECORDING_HEADER_LEN, RECORDING_MAGIC, RECORDING_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Unable to read recording: {0}")]
    Io(#[from] io::Error),
    #[error("Not a recording file (bad header)")]
    BadHeader,
    #[error("Unsupported recording version {0}")]
    UnsupportedVersion(u16),
    #[error("Corrupt record at offset {offset}: {source}")]
    Corrupt { offset: u64, source: DecodeError },
    #[error("No recording is open")]
    NotOpen,
}

/// Sequential reader over the records of a recording.
///
/// Tracks the byte offset of the next record and the number of messages
/// read so far. A failed read leaves both at the last good record.
#[derive(Debug)]
pub struct RecordingReader<R> {
    inner: R,
    offset: u64,
    position: u64,
    buf: Vec<u8>,
}

/// Open a recording file for reading.
pub fn open_recording(path: &Path) -> Result<RecordingReader<BufReader<File>>, PlaybackError> {
    RecordingReader::new(BufReader::new(File::open(path)?))
}

impl<R: Read + Seek> RecordingReader<R> {
    /// Check the header and position at the first record.
    pub fn new(mut inner: R) -> Result<Self, PlaybackError> {
        inner.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; RECORDING_HEADER_LEN as usize];
        if read_fully(&mut inner, &mut header)? < header.len() || &header[..8] != RECORDING_MAGIC {
            return Err(PlaybackError::BadHeader);
        }
        let version = u16::from_be_bytes([header[8], header[9]]);
        if version != RECORDING_VERSION {
            return Err(PlaybackError::UnsupportedVersion(version));
        }
        Ok(Self {
            inner,
            offset: RECORDING_HEADER_LEN,
            position: 0,
            buf: Vec::new(),
        })
    }

    /// Byte offset of the next record.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Messages read so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next message. `Ok(None)` at a clean end of file.
    pub fn read_next(&mut self) -> Result<Option<Message>, PlaybackError> {
        match self.try_read() {
            Ok(Some(msg)) => {
                self.offset += (HEADER_LEN + msg.payload_len()) as u64;
                self.position += 1;
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.inner.seek(SeekFrom::Start(self.offset))?;
                Err(e)
            }
        }
    }

    fn try_read(&mut self) -> Result<Option<Message>, PlaybackError> {
        let corrupt = |offset, source| PlaybackError::Corrupt { offset, source };

        let mut header = [0u8; HEADER_LEN];
        let got = read_fully(&mut self.inner, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        let header = RecordHeader::parse(&header[..got]).map_err(|e| corrupt(self.offset, e))?;

        self.buf.resize(header.payload_len, 0);
        let got = read_fully(&mut self.inner, &mut self.buf)?;
        if got < header.payload_len {
            return Err(corrupt(
                self.offset,
                DecodeError::Truncated {
                    needed: header.record_len(),
                    available: HEADER_LEN + got,
                },
            ));
        }

        Message::deserialize(header.message_type, header.context_id, &self.buf)
            .map(Some)
            .map_err(|e| corrupt(self.offset, e))
    }

    /// Continue reading from a known record boundary.
    pub fn seek_to(&mut self, offset: u64, position: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        self.position = position;
        Ok(())
    }

    /// Back to the first record.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek_to(RECORDING_HEADER_LEN, 0)
    }
}

/// Read until `buf` is full or the input ends. Returns the bytes read.
fn read_fully(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tessera_protocol::{MessageBody, MessageType};

    fn recording(msgs: &[Message]) -> Vec<u8> {
        let mut out = RECORDING_MAGIC.to_vec();
        out.extend_from_slice(&RECORDING_VERSION.to_be_bytes());
        out.extend(Message::encode_all(msgs).unwrap());
        out
    }

    #[test]
    fn test_reads_until_eof() {
        let bytes = recording(&[Message::new(1, MessageBody::UndoPoint), Message::new(2, MessageBody::Leave)]);
        let mut r = RecordingReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(r.read_next().unwrap().unwrap().message_type(), MessageType::UndoPoint);
        assert_eq!(r.read_next().unwrap().unwrap().context_id(), 2);
        assert!(r.read_next().unwrap().is_none());
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn test_truncated_record_is_corrupt_and_keeps_offset() {
        let mut bytes = recording(&[Message::new(1, MessageBody::UndoPoint), Message::new(1, MessageBody::SessionLock(true))]);
        bytes.pop();
        let mut r = RecordingReader::new(Cursor::new(bytes)).unwrap();
        r.read_next().unwrap();
        let good = r.offset();
        assert!(matches!(r.read_next(), Err(PlaybackError::Corrupt { offset, .. }) if offset == good));
        assert_eq!(r.offset(), good);
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(
            RecordingReader::new(Cursor::new(b"TESSDOC\0\0\x01".to_vec())),
            Err(PlaybackError::BadHeader)
        ));
    }

    #[test]
    fn test_seek_back() {
        let bytes = recording(&[Message::new(1, MessageBody::UndoPoint), Message::new(3, MessageBody::UndoPoint)]);
        let mut r = RecordingReader::new(Cursor::new(bytes)).unwrap();
        let (offset, position) = (r.offset(), r.position());
        r.read_next().unwrap();
        r.seek_to(offset, position).unwrap();
        assert_eq!(r.read_next().unwrap().unwrap().context_id(), 1);
        r.rewind().unwrap();
        assert_eq!(r.position(), 0);
    }
}
