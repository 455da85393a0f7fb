/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory message store.
//!
//! Messages live in a `BTreeMap` for cheap range reads during resend
//! servicing. Nothing survives the process; sessions that need durable
//! recovery plug in a persistent implementation of the same trait.

use crate::traits::MessageStore;
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::UtcTimestamp;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Volatile message store backed by a `BTreeMap`.
#[derive(Debug)]
pub struct MemoryStore {
    messages: Mutex<BTreeMap<u64, Bytes>>,
    next_sender_seq: AtomicU64,
    next_target_seq: AtomicU64,
    creation_time: Mutex<UtcTimestamp>,
}

impl MemoryStore {
    /// Creates an empty store with both sequence numbers at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(BTreeMap::new()),
            next_sender_seq: AtomicU64::new(1),
            next_target_seq: AtomicU64::new(1),
            creation_time: Mutex::new(UtcTimestamp::now()),
        }
    }

    /// Creates a store with explicit starting sequence numbers.
    #[must_use]
    pub fn with_seqs(sender: u64, target: u64) -> Self {
        let store = Self::new();
        store.next_sender_seq.store(sender, Ordering::SeqCst);
        store.next_target_seq.store(target, Ordering::SeqCst);
        store
    }

    /// Returns the number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    fn next_sender_seq(&self) -> u64 {
        self.next_sender_seq.load(Ordering::SeqCst)
    }

    fn next_target_seq(&self) -> u64 {
        self.next_target_seq.load(Ordering::SeqCst)
    }

    fn set_next_sender_seq(&self, seq: u64) {
        self.next_sender_seq.store(seq, Ordering::SeqCst);
    }

    fn set_next_target_seq(&self, seq: u64) {
        self.next_target_seq.store(seq, Ordering::SeqCst);
    }

    async fn set(&self, seq_num: u64, raw: &[u8]) -> Result<(), StoreError> {
        self.messages
            .lock()
            .insert(seq_num, Bytes::copy_from_slice(raw));
        Ok(())
    }

    async fn get(&self, begin: u64, end: u64) -> Result<Vec<(u64, Bytes)>, StoreError> {
        let end = if end == 0 { u64::MAX } else { end };
        let messages = self.messages.lock();
        Ok(messages
            .range(begin..=end)
            .map(|(seq, raw)| (*seq, raw.clone()))
            .collect())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.messages.lock().clear();
        self.next_sender_seq.store(1, Ordering::SeqCst);
        self.next_target_seq.store(1, Ordering::SeqCst);
        *self.creation_time.lock() = UtcTimestamp::now();
        Ok(())
    }

    fn creation_time(&self) -> UtcTimestamp {
        *self.creation_time.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sender_seq(), 1);
        assert_eq!(store.next_target_seq(), 1);
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get_range() {
        let store = MemoryStore::new();
        for seq in [1u64, 2, 3, 5] {
            store.set(seq, format!("msg{seq}").as_bytes()).await.unwrap();
        }

        let range = store.get(2, 5).await.unwrap();
        assert_eq!(
            range.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            vec![2, 3, 5]
        );
        assert_eq!(&range[0].1[..], b"msg2");
    }

    #[tokio::test]
    async fn test_get_with_zero_end_means_infinity() {
        let store = MemoryStore::new();
        store.set(7, b"seven").await.unwrap();
        store.set(9, b"nine").await.unwrap();

        let range = store.get(8, 0).await.unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].0, 9);
    }

    #[tokio::test]
    async fn test_seq_setters_and_incr() {
        let store = MemoryStore::with_seqs(10, 20);
        store.incr_next_sender_seq();
        store.incr_next_target_seq();
        assert_eq!(store.next_sender_seq(), 11);
        assert_eq!(store.next_target_seq(), 21);
    }

    #[tokio::test]
    async fn test_reset_clears_and_restamps() {
        let store = MemoryStore::with_seqs(10, 20);
        store.set(1, b"m").await.unwrap();
        let before = store.creation_time();

        store.reset().await.unwrap();

        assert_eq!(store.message_count(), 0);
        assert_eq!(store.next_sender_seq(), 1);
        assert_eq!(store.next_target_seq(), 1);
        assert!(store.creation_time().millis_since(before) >= 0);
    }
}
