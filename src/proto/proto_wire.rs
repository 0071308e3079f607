use std::fmt;

/// Errors raised while reading a wire envelope. These always indicate a
/// corrupted or truncated message and are funneled into the terminal
/// transport failure path by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended before the announced field did.
    Truncated,

    /// A string field did not hold valid UTF-8.
    InvalidUtf8,

    /// A sequence announced more elements than the encoding allows here.
    OversizedSequence { len: usize, max: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated => write!(f, "message truncated"),
            WireError::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
            WireError::OversizedSequence { len, max } => {
                write!(f, "sequence of {} elements exceeds maximum of {}", len, max)
            }
        }
    }
}

impl std::error::Error for WireError {}

/// Little-endian writer over a caller-owned buffer.
pub struct WireWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend(&v.to_le_bytes());
    }

    /// Length-prefixed UTF-8 string (u32 length, then the bytes).
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend(s.as_bytes());
    }

    pub fn write_string_seq<S: AsRef<str>>(&mut self, seq: &[S]) {
        self.write_u32(seq.len() as u32);
        for s in seq {
            self.write_string(s.as_ref());
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
    }
}

/// Little-endian cursor over a received envelope.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() - self.pos < n {
            return Err(WireError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    /// The unread remainder of the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitives() {
        let mut buf = Vec::new();
        let mut w = WireWriter::new(&mut buf);
        w.write_u8(7);
        w.write_u32(0xDEAD_BEEF);
        w.write_string("op");
        w.write_string_seq(&["facet"]);

        let mut r = WireReader::new(&buf);
        assert_eq!(r.read_u8(), Ok(7));
        assert_eq!(r.read_u32(), Ok(0xDEAD_BEEF));
        assert_eq!(r.read_string().as_deref(), Ok("op"));
        assert_eq!(r.read_u32(), Ok(1));
        assert_eq!(r.read_string().as_deref(), Ok("facet"));
        assert!(r.is_exhausted());
    }

    #[test]
    fn truncated_string_is_an_error() {
        let mut buf = Vec::new();
        WireWriter::new(&mut buf).write_u32(10);
        buf.extend(b"abc"); // promised 10 bytes, delivered 3

        let mut r = WireReader::new(&buf);
        assert_eq!(r.read_string(), Err(WireError::Truncated));
    }
}
