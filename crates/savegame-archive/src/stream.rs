//! Seekable in-memory byte stream.
//!
//! All multi-byte integers are big-endian. Strings are an `i32` byte length
//! followed by UTF-8 bytes.

use crate::error::{ArchiveError, ArchiveResult};

/// Direction of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    Saving,
    Loading,
}

/// Growable, seekable byte buffer that is either written or read.
#[derive(Clone, Debug)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
    mode: StreamMode,
}

macro_rules! primitive {
    ($write:ident, $read:ident, $ty:ty) => {
        pub fn $write(&mut self, value: $ty) {
            self.write_bytes(&value.to_be_bytes());
        }

        pub fn $read(&mut self) -> ArchiveResult<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            buf.copy_from_slice(self.read_bytes(std::mem::size_of::<$ty>())?);
            Ok(<$ty>::from_be_bytes(buf))
        }
    };
}

impl MemoryStream {
    /// An empty stream for saving.
    pub fn writer() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            mode: StreamMode::Saving,
        }
    }

    /// A stream that reads `data` from the start.
    pub fn reader(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            mode: StreamMode::Loading,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_loading(&self) -> bool {
        self.mode == StreamMode::Loading
    }

    pub fn tell(&self) -> u64 {
        self.pos as u64
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> u64 {
        (self.data.len() - self.pos) as u64
    }

    /// Move the cursor. Seeking to exactly the end is allowed.
    pub fn seek(&mut self, position: u64) -> ArchiveResult<()> {
        if position > self.len() {
            return Err(ArchiveError::SeekOutOfRange {
                position,
                len: self.len(),
            });
        }
        self.pos = position as usize;
        Ok(())
    }

    /// Write at the cursor, overwriting existing bytes and growing as needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn read_bytes(&mut self, len: usize) -> ArchiveResult<&[u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(ArchiveError::UnexpectedEof {
                offset: self.tell(),
                needed: len - (self.data.len() - self.pos),
            });
        };
        let start = self.pos;
        self.pos = end;
        Ok(&self.data[start..end])
    }

    primitive!(write_u8, read_u8, u8);
    primitive!(write_u32, read_u32, u32);
    primitive!(write_i32, read_i32, i32);
    primitive!(write_u64, read_u64, u64);
    primitive!(write_i64, read_i64, i64);
    primitive!(write_f32, read_f32, f32);
    primitive!(write_f64, read_f64, f64);

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn read_bool(&mut self) -> ArchiveResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read an `i32` element count, rejecting negative values.
    pub fn read_count(&mut self) -> ArchiveResult<usize> {
        let offset = self.tell();
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| ArchiveError::InvalidLength {
            offset,
            length: i64::from(count),
        })
    }

    pub fn write_count(&mut self, count: usize) {
        self.write_i32(count as i32);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_count(value.len());
        self.write_bytes(value.as_bytes());
    }

    pub fn read_string(&mut self) -> ArchiveResult<String> {
        let offset = self.tell();
        let len = self.read_count()?;
        let bytes = self.read_bytes(len)?.to_vec();
        String::from_utf8(bytes).map_err(|_| ArchiveError::InvalidUtf8 { offset })
    }

    pub fn write_array16(&mut self, bytes: &[u8; 16]) {
        self.write_bytes(bytes);
    }

    pub fn read_array16(&mut self) -> ArchiveResult<[u8; 16]> {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(self.read_bytes(16)?);
        Ok(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// A `u64` slot reserved in the stream and filled in later.
///
/// Used for sizes and offsets that are only known after the data they
/// describe has been written.
#[derive(Debug)]
#[must_use = "a reserved slot stays zero until it is filled"]
pub struct Placeholder {
    position: u64,
}

impl Placeholder {
    pub fn reserve(stream: &mut MemoryStream) -> Self {
        let position = stream.tell();
        stream.write_u64(0);
        Self { position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write `value` into the slot. The cursor is restored afterwards.
    pub fn fill(self, stream: &mut MemoryStream, value: u64) -> ArchiveResult<()> {
        let resume = stream.tell();
        stream.seek(self.position)?;
        stream.write_u64(value);
        stream.seek(resume)
    }
}
