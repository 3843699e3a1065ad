//! In-memory [`MessageStore`] backend: outgoing messages live in a `Vec`, sequence counters and
//! creation time live alongside them. Nothing survives a process restart; useful for tests and
//! for sessions that opt out of `PersistMessages`.

use crate::fix::message_store::{MessageStore, StoreError};
use chrono::{DateTime, Utc};

pub struct Store {
    outgoing_messages: Vec<(u32, Vec<u8>)>,
    next_sender: u32,
    next_target: u32,
    creation_time: DateTime<Utc>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            outgoing_messages: Vec::new(),
            next_sender: 1,
            next_target: 1,
            creation_time: Utc::now(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

impl MessageStore for Store {
    fn set(&mut self, seq: u32, bytes: &[u8]) -> Result<bool, StoreError> {
        if let Some(existing) = self.outgoing_messages.iter_mut().find(|(s, _)| *s == seq) {
            existing.1 = bytes.to_vec();
            return Ok(false);
        }
        self.outgoing_messages.push((seq, bytes.to_vec()));
        Ok(true)
    }

    fn get(&self, low: u32, high: u32) -> Result<Vec<(u32, Vec<u8>)>, StoreError> {
        let mut out: Vec<(u32, Vec<u8>)> = self
            .outgoing_messages
            .iter()
            .filter(|(seq, _)| (low..=high).contains(seq))
            .cloned()
            .collect();
        out.sort_by_key(|(seq, _)| *seq);
        Ok(out)
    }

    fn next_sender_seq(&self) -> u32 {
        self.next_sender
    }

    fn next_target_seq(&self) -> u32 {
        self.next_target
    }

    fn set_next_sender_seq(&mut self, seq: u32) -> Result<(), StoreError> {
        self.next_sender = seq;
        Ok(())
    }

    fn set_next_target_seq(&mut self, seq: u32) -> Result<(), StoreError> {
        self.next_target = seq;
        Ok(())
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.outgoing_messages.clear();
        self.next_sender = 1;
        self.next_target = 1;
        self.creation_time = Utc::now();
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_and_get_range() {
        let mut store = Store::new();
        store.set(1, b"one").unwrap();
        store.set(2, b"two").unwrap();
        store.set(3, b"three").unwrap();
        let got = store.get(2, 3).unwrap();
        assert_eq!(got, vec![(2, b"two".to_vec()), (3, b"three".to_vec())]);
    }

    #[test]
    fn test_seq_counters_increment() {
        let mut store = Store::new();
        assert_eq!(store.next_sender_seq(), 1);
        store.incr_next_sender_seq().unwrap();
        assert_eq!(store.next_sender_seq(), 2);
    }

    #[test]
    fn test_reset_clears_log_and_counters() {
        let mut store = Store::new();
        store.set(1, b"one").unwrap();
        store.set_next_sender_seq(5).unwrap();
        let before = store.creation_time();
        store.reset().unwrap();
        assert_eq!(store.next_sender_seq(), 1);
        assert_eq!(store.next_target_seq(), 1);
        assert!(store.get(1, 1).unwrap().is_empty());
        assert!(store.creation_time() >= before);
    }

    #[test]
    fn test_set_overwrite_returns_false() {
        let mut store = Store::new();
        assert!(store.set(1, b"first").unwrap());
        assert!(!store.set(1, b"second").unwrap());
        assert_eq!(store.get(1, 1).unwrap(), vec![(1, b"second".to_vec())]);
    }
}
