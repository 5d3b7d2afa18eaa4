//! Big-endian payload writer.

/// Appends big-endian fields to a payload buffer.
#[derive(Debug)]
pub struct PayloadWriter<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> PayloadWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        Self { buf, start }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn u16s(&mut self, v: &[u16]) -> &mut Self {
        for id in v {
            self.u16(*id);
        }
        self
    }

    /// Number of bytes written through this writer.
    pub fn written(&self) -> usize {
        self.buf.len() - self.start
    }
}
