use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Incomplete transfers older than this are discarded.
pub const FRAGMENT_EXPIRY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("fragment {ordinal} out of range for a transfer of {total}")]
pub struct FragmentError {
    pub ordinal: usize,
    pub total: usize,
}

#[derive(Debug)]
struct FragmentBuffer {
    slots: Vec<Option<Vec<u8>>>,
    filled: usize,
    touched: Instant,
}

impl FragmentBuffer {
    fn new(total: usize, now: Instant) -> Self {
        Self {
            slots: vec![None; total],
            filled: 0,
            touched: now,
        }
    }

    fn assemble(self) -> Vec<u8> {
        self.slots.into_iter().flatten().flatten().collect()
    }
}

/// Reassembly buffers keyed by a transfer key.
///
/// A key identifies at most one transfer at a time. A fragment announcing a
/// different total for a live key restarts that transfer.
#[derive(Debug)]
pub struct FragmentPool<K> {
    buffers: HashMap<K, FragmentBuffer>,
    expiry: Duration,
}

impl<K: Eq + Hash + Copy + Debug> Default for FragmentPool<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Copy + Debug> FragmentPool<K> {
    pub fn new() -> Self {
        Self::with_expiry(FRAGMENT_EXPIRY)
    }

    pub fn with_expiry(expiry: Duration) -> Self {
        Self {
            buffers: HashMap::new(),
            expiry,
        }
    }

    /// Stores fragment `ordinal` (zero-based) of a `total`-fragment transfer.
    ///
    /// Returns the concatenated payload once every slot is filled; the
    /// buffer is released at that point.
    pub fn insert(
        &mut self,
        key: K,
        total: usize,
        ordinal: usize,
        data: Vec<u8>,
        now: Instant,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        if total == 0 || ordinal >= total {
            return Err(FragmentError { ordinal, total });
        }

        let buffer = self
            .buffers
            .entry(key)
            .or_insert_with(|| FragmentBuffer::new(total, now));

        if buffer.slots.len() != total {
            log::debug!("Transfer {:?} restarted with {} fragments", key, total);
            *buffer = FragmentBuffer::new(total, now);
        }

        buffer.touched = now;
        if buffer.slots[ordinal].is_none() {
            buffer.filled += 1;
        }
        buffer.slots[ordinal] = Some(data);

        if buffer.filled < total {
            return Ok(None);
        }

        Ok(self.buffers.remove(&key).map(FragmentBuffer::assemble))
    }

    /// Drops transfers that have not progressed within the expiry window.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.buffers.len();
        let expiry = self.expiry;
        self.buffers
            .retain(|_, buffer| now.saturating_duration_since(buffer.touched) < expiry);
        let expired = before - self.buffers.len();
        if expired > 0 {
            log::debug!("Expired {} incomplete transfers", expired);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassembles_out_of_order() {
        let now = Instant::now();
        let mut pool = FragmentPool::new();

        assert_eq!(pool.insert(7u32, 3, 2, vec![5, 6], now).unwrap(), None);
        assert_eq!(pool.insert(7, 3, 0, vec![1, 2], now).unwrap(), None);
        assert_eq!(pool.len(), 1);

        let done = pool.insert(7, 3, 1, vec![3, 4], now).unwrap();
        assert_eq!(done, Some(vec![1, 2, 3, 4, 5, 6]));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicate_fragment_does_not_complete_early() {
        let now = Instant::now();
        let mut pool = FragmentPool::new();

        assert_eq!(pool.insert(1u32, 2, 0, vec![1], now).unwrap(), None);
        assert_eq!(pool.insert(1, 2, 0, vec![1], now).unwrap(), None);
        assert_eq!(pool.insert(1, 2, 1, vec![2], now).unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn test_rejects_out_of_range_ordinal() {
        let mut pool = FragmentPool::new();
        let err = pool.insert(1u32, 2, 2, vec![], Instant::now()).unwrap_err();
        assert_eq!(err, FragmentError { ordinal: 2, total: 2 });
        assert!(pool.insert(1u32, 0, 0, vec![], Instant::now()).is_err());
    }

    #[test]
    fn test_expiry_releases_stalled_transfers() {
        let start = Instant::now();
        let mut pool = FragmentPool::with_expiry(Duration::from_secs(1));
        pool.insert(1u32, 2, 0, vec![1], start).unwrap();

        assert_eq!(pool.expire(start + Duration::from_millis(500)), 0);
        assert_eq!(pool.expire(start + Duration::from_secs(2)), 1);
        assert!(pool.is_empty());
    }
}
