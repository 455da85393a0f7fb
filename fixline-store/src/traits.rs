/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message store trait definition.
//!
//! The session engine persists every outbound message and both sequence
//! numbers through this interface so a resend request can be serviced
//! after a reconnect. A store instance belongs to exactly one session and
//! serializes its own mutations.

use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::UtcTimestamp;

/// Abstract interface for per-session message and sequence persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns the next outbound sequence number.
    fn next_sender_seq(&self) -> u64;

    /// Returns the next expected inbound sequence number.
    fn next_target_seq(&self) -> u64;

    /// Sets the next outbound sequence number.
    fn set_next_sender_seq(&self, seq: u64);

    /// Sets the next expected inbound sequence number.
    fn set_next_target_seq(&self, seq: u64);

    /// Increments the next outbound sequence number.
    fn incr_next_sender_seq(&self) {
        self.set_next_sender_seq(self.next_sender_seq() + 1);
    }

    /// Increments the next expected inbound sequence number.
    fn incr_next_target_seq(&self) {
        self.set_next_target_seq(self.next_target_seq() + 1);
    }

    /// Persists an outbound message under its sequence number.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the message cannot be written.
    async fn set(&self, seq_num: u64, raw: &[u8]) -> Result<(), StoreError>;

    /// Reads stored messages for `begin..=end` in ascending sequence
    /// order; sequence numbers with no stored message are skipped.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the range cannot be read.
    async fn get(&self, begin: u64, end: u64) -> Result<Vec<(u64, Bytes)>, StoreError>;

    /// Clears all messages and restarts both sequence numbers at 1.
    ///
    /// This begins a new logical session, so the creation time moves too.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the reset cannot be persisted.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Reloads state from the backing storage.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the reload fails.
    async fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Returns when the current logical session began.
    fn creation_time(&self) -> UtcTimestamp;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStore {
        created: UtcTimestamp,
    }

    #[async_trait]
    impl MessageStore for NullStore {
        fn next_sender_seq(&self) -> u64 {
            1
        }

        fn next_target_seq(&self) -> u64 {
            1
        }

        fn set_next_sender_seq(&self, _seq: u64) {}

        fn set_next_target_seq(&self, _seq: u64) {}

        async fn set(&self, _seq_num: u64, _raw: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get(&self, _begin: u64, _end: u64) -> Result<Vec<(u64, Bytes)>, StoreError> {
            Ok(Vec::new())
        }

        async fn reset(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn creation_time(&self) -> UtcTimestamp {
            self.created
        }
    }

    #[tokio::test]
    async fn test_default_incr_and_refresh() {
        let store = NullStore {
            created: UtcTimestamp::now(),
        };
        store.incr_next_sender_seq();
        store.incr_next_target_seq();
        assert!(store.refresh().await.is_ok());
        assert!(store.get(1, 0).await.unwrap().is_empty());
    }
}
