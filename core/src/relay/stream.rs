//! relay/stream.rs
//! `Read`/`Write` adapters over a shared [`ByteRelayBuffer`].

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::relay::ByteRelayBuffer;

/// Consumer end. Dropping it closes the buffer so producers stop forwarding.
pub struct RelayReader {
    buffer: Arc<ByteRelayBuffer>,
}

impl RelayReader {
    pub fn new(buffer: Arc<ByteRelayBuffer>) -> Self {
        Self { buffer }
    }
}

impl Read for RelayReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.buffer.read(buf))
    }
}

impl Drop for RelayReader {
    fn drop(&mut self) {
        self.buffer.close();
    }
}

/// Producer end. Closing (or dropping) it is the end-of-data signal.
pub struct RelayWriter {
    buffer: Arc<ByteRelayBuffer>,
}

impl RelayWriter {
    pub fn new(buffer: Arc<ByteRelayBuffer>) -> Self {
        Self { buffer }
    }

    pub fn close(&self) {
        self.buffer.close();
    }
}

impl Write for RelayWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RelayWriter {
    fn drop(&mut self) {
        self.buffer.close();
    }
}
