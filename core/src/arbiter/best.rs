//! arbiter/best.rs
//! The per-job "smallest verified candidate so far" slot.

use std::sync::Mutex;

use bytes::Bytes;

use crate::utils::lock_unpoisoned;

/// A candidate blob and the label of the runner that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub bytes: Bytes,
    pub source: String,
}

impl Candidate {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Compare-and-set-if-smaller cell.
///
/// Invariant: the size of the held candidate never grows.
#[derive(Debug, Default)]
pub struct BestSlot {
    inner: Mutex<Option<Candidate>>,
}

impl BestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Option<usize> {
        lock_unpoisoned(&self.inner).as_ref().map(Candidate::len)
    }

    pub fn snapshot(&self) -> Option<Candidate> {
        lock_unpoisoned(&self.inner).clone()
    }

    /// True if a candidate of `size` bytes could still win.
    pub fn is_promising(&self, size: usize) -> bool {
        self.size().map_or(true, |best| best > size)
    }

    /// Install `bytes` if the slot is empty or it is strictly smaller.
    pub fn offer(&self, bytes: &Bytes, source: &str) -> bool {
        let mut slot = lock_unpoisoned(&self.inner);
        if slot.as_ref().is_some_and(|best| best.len() <= bytes.len()) {
            return false;
        }
        *slot = Some(Candidate {
            bytes: bytes.clone(),
            source: source.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_strictly_smaller_candidates_replace() {
        let slot = BestSlot::new();
        assert!(slot.is_promising(usize::MAX));
        assert!(slot.offer(&Bytes::from(vec![1u8; 10]), "a"));
        assert!(!slot.offer(&Bytes::from(vec![2u8; 10]), "b"));
        assert!(!slot.offer(&Bytes::from(vec![3u8; 11]), "c"));
        assert!(slot.offer(&Bytes::from(vec![4u8; 9]), "d"));

        let best = slot.snapshot().unwrap();
        assert_eq!(best.len(), 9);
        assert_eq!(best.source, "d");
        assert!(slot.is_promising(8));
        assert!(!slot.is_promising(9));
    }
}
