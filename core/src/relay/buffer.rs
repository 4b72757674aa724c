//! relay/buffer.rs
//! Bounded, blocking byte ring shared by one producer and one consumer.

use std::sync::{Condvar, Mutex};

use crate::relay::RelayError;
use crate::utils::{lock_unpoisoned, wait_unpoisoned};

struct Ring {
    data: Box<[u8]>,
    read: usize,
    write: usize,
    len: usize,
    closed: bool,
}

impl Ring {
    fn free(&self) -> usize {
        self.data.len() - self.len
    }

    fn push(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        let cap = self.data.len();
        let first = n.min(cap - self.write);
        self.data[self.write..self.write + first].copy_from_slice(&bytes[..first]);
        self.data[..n - first].copy_from_slice(&bytes[first..n]);
        self.write = (self.write + n) % cap;
        self.len += n;
        n
    }

    fn pop(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let cap = self.data.len();
        let first = n.min(cap - self.read);
        out[..first].copy_from_slice(&self.data[self.read..self.read + first]);
        out[first..n].copy_from_slice(&self.data[..n - first]);
        self.read = (self.read + n) % cap;
        self.len -= n;
        n
    }
}

/// Fixed-capacity byte ring with an explicit end-of-data signal.
///
/// - `write` blocks while full and fails once the buffer is closed.
/// - `read` blocks while empty and open; it returns 0 once closed and drained.
/// - `close` is idempotent and wakes every blocked caller.
pub struct ByteRelayBuffer {
    ring: Mutex<Ring>,
    readable: Condvar,
    writable: Condvar,
}

impl ByteRelayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                data: vec![0u8; capacity.max(1)].into_boxed_slice(),
                read: 0,
                write: 0,
                len: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        lock_unpoisoned(&self.ring).data.len()
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.ring).len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.ring).closed
    }

    /// Append every byte, blocking while the ring is full.
    pub fn write(&self, bytes: &[u8]) -> Result<(), RelayError> {
        let mut written = 0;
        let mut ring = lock_unpoisoned(&self.ring);
        while written < bytes.len() {
            while ring.free() == 0 && !ring.closed {
                ring = wait_unpoisoned(&self.writable, ring);
            }
            if ring.closed {
                return Err(RelayError::Closed {
                    written,
                    requested: bytes.len(),
                });
            }
            written += ring.push(&bytes[written..]);
            self.readable.notify_all();
        }
        Ok(())
    }

    /// Read up to `out.len()` bytes. Returns 0 only at end of data.
    pub fn read(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let mut ring = lock_unpoisoned(&self.ring);
        while ring.len == 0 && !ring.closed {
            ring = wait_unpoisoned(&self.readable, ring);
        }
        let n = ring.pop(out);
        if n > 0 {
            self.writable.notify_all();
        }
        n
    }

    pub fn close(&self) {
        let mut ring = lock_unpoisoned(&self.ring);
        ring.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_around_the_end() {
        let buf = ByteRelayBuffer::new(8);
        let mut out = [0u8; 8];
        buf.write(b"abcdef").expect("write");
        assert_eq!(buf.read(&mut out[..4]), 4);
        buf.write(b"ghijk").expect("write");
        assert_eq!(buf.len(), 7);
        let n = buf.read(&mut out);
        assert_eq!(&out[..n], b"efghijk");
    }

    #[test]
    fn closed_buffer_drains_then_reports_eof() {
        let buf = ByteRelayBuffer::new(4);
        buf.write(b"xy").expect("write");
        buf.close();
        buf.close();
        let mut out = [0u8; 4];
        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(buf.read(&mut out), 0);
        assert!(matches!(buf.write(b"z"), Err(RelayError::Closed { written: 0, .. })));
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        assert_eq!(ByteRelayBuffer::new(0).capacity(), 1);
    }
}
