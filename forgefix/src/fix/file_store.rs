//! File-backed [`MessageStore`], grounded in `FileStore.cpp`'s four-file layout: a session keyed
//! by `{begin}-{sender}-{target}[-{qualifier}]` gets a `.body` file (message bytes concatenated),
//! a `.header` file (`seq,offset,length ` records appended on every write), a `.seqnums` file
//! (overwritten each update with `sender : target`), and a `.session` file (overwritten with the
//! creation timestamp).

use crate::fix::codec::{parse_utc_timestamp, write_utc_timestamp};
use crate::fix::message_store::{MessageStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct FileStore {
    body_path: PathBuf,
    header_path: PathBuf,
    seqnums_path: PathBuf,
    session_path: PathBuf,
    offsets: BTreeMap<u32, (u64, usize)>,
    next_sender: u32,
    next_target: u32,
    creation_time: DateTime<Utc>,
}

fn session_prefix(begin_string: &str, sender_comp_id: &str, target_comp_id: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) => format!("{begin_string}-{sender_comp_id}-{target_comp_id}-{q}"),
        None => format!("{begin_string}-{sender_comp_id}-{target_comp_id}"),
    }
}

impl FileStore {
    pub fn open(
        dir: &Path,
        begin_string: &str,
        sender_comp_id: &str,
        target_comp_id: &str,
        qualifier: Option<&str>,
    ) -> Result<FileStore, StoreError> {
        let prefix = session_prefix(begin_string, sender_comp_id, target_comp_id, qualifier);
        let mut store = FileStore {
            body_path: dir.join(format!("{prefix}.body")),
            header_path: dir.join(format!("{prefix}.header")),
            seqnums_path: dir.join(format!("{prefix}.seqnums")),
            session_path: dir.join(format!("{prefix}.session")),
            offsets: BTreeMap::new(),
            next_sender: 1,
            next_target: 1,
            creation_time: Utc::now(),
        };
        store.populate_cache()?;
        Ok(store)
    }

    fn populate_cache(&mut self) -> Result<(), StoreError> {
        self.offsets.clear();
        if let Ok(contents) = std::fs::read_to_string(&self.header_path) {
            for record in contents.split_whitespace() {
                let mut parts = record.split(',');
                let (Some(seq), Some(offset), Some(len)) = (parts.next(), parts.next(), parts.next()) else {
                    continue;
                };
                if let (Ok(seq), Ok(offset), Ok(len)) = (seq.parse(), offset.parse(), len.parse()) {
                    self.offsets.insert(seq, (offset, len));
                }
            }
        }

        if let Ok(contents) = std::fs::read_to_string(&self.seqnums_path) {
            let mut parts = contents.split(':').map(|s| s.trim());
            if let (Some(sender), Some(target)) = (parts.next(), parts.next()) {
                if let (Ok(sender), Ok(target)) = (sender.parse(), target.parse()) {
                    self.next_sender = sender;
                    self.next_target = target;
                }
            }
        }

        if let Ok(contents) = std::fs::read_to_string(&self.session_path) {
            if let Ok(ts) = parse_utc_timestamp(contents.trim().as_bytes()) {
                self.creation_time = ts;
            }
        }

        Ok(())
    }

    fn write_seqnums(&self) -> Result<(), StoreError> {
        let mut f = File::create(&self.seqnums_path)?;
        write!(f, "{:010} : {:010}", self.next_sender, self.next_target)?;
        f.flush()?;
        Ok(())
    }

    fn write_session(&self) -> Result<(), StoreError> {
        let mut f = File::create(&self.session_path)?;
        let mut buf = Vec::new();
        write_utc_timestamp(&mut buf, self.creation_time, false);
        f.write_all(&buf)?;
        f.flush()?;
        Ok(())
    }
}

impl MessageStore for FileStore {
    fn set(&mut self, seq: u32, bytes: &[u8]) -> Result<bool, StoreError> {
        let mut body = OpenOptions::new().create(true).append(true).open(&self.body_path)?;
        let offset = body.seek(SeekFrom::End(0))?;
        body.write_all(bytes)?;
        body.flush()?;

        let mut header = OpenOptions::new().create(true).append(true).open(&self.header_path)?;
        write!(header, "{},{},{} ", seq, offset, bytes.len())?;
        header.flush()?;

        self.offsets.insert(seq, (offset, bytes.len()));
        Ok(true)
    }

    fn get(&self, low: u32, high: u32) -> Result<Vec<(u32, Vec<u8>)>, StoreError> {
        let mut body = match File::open(&self.body_path) {
            Ok(f) => f,
            Err(_) => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for (&seq, &(offset, len)) in self.offsets.range(low..=high) {
            body.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; len];
            body.read_exact(&mut buf).map_err(|_| StoreError::CorruptRecord(seq))?;
            out.push((seq, buf));
        }
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
        self.write_seqnums()
    }

    fn set_next_target_seq(&mut self, seq: u32) -> Result<(), StoreError> {
        self.next_target = seq;
        self.write_seqnums()
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.offsets.clear();
        self.next_sender = 1;
        self.next_target = 1;
        self.creation_time = Utc::now();
        let _ = std::fs::remove_file(&self.body_path);
        let _ = std::fs::remove_file(&self.header_path);
        File::create(&self.body_path)?;
        File::create(&self.header_path)?;
        self.write_seqnums()?;
        self.write_session()?;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        self.populate_cache()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("forgefix-filestore-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_set_get_roundtrip() {
        let dir = tempdir();
        let mut store = FileStore::open(&dir, "FIX.4.2", "CLIENT", "SERVER", None).unwrap();
        store.reset().unwrap();
        store.set(1, b"hello").unwrap();
        store.set(2, b"world").unwrap();
        let got = store.get(1, 2).unwrap();
        assert_eq!(got, vec![(1, b"hello".to_vec()), (2, b"world".to_vec())]);
    }

    #[test]
    fn test_seqnums_persist_across_reopen() {
        let dir = tempdir();
        {
            let mut store = FileStore::open(&dir, "FIX.4.2", "A", "B", Some("Q")).unwrap();
            store.reset().unwrap();
            store.set_next_sender_seq(42).unwrap();
            store.set_next_target_seq(7).unwrap();
        }
        let reopened = FileStore::open(&dir, "FIX.4.2", "A", "B", Some("Q")).unwrap();
        assert_eq!(reopened.next_sender_seq(), 42);
        assert_eq!(reopened.next_target_seq(), 7);
    }

    #[test]
    fn test_refresh_rereads_from_disk() {
        let dir = tempdir();
        let mut store = FileStore::open(&dir, "FIX.4.2", "A", "B", Some("R")).unwrap();
        store.reset().unwrap();
        store.set_next_sender_seq(5).unwrap();

        let mut other = FileStore::open(&dir, "FIX.4.2", "A", "B", Some("R")).unwrap();
        other.set_next_sender_seq(9).unwrap();

        store.refresh().unwrap();
        assert_eq!(store.next_sender_seq(), 9);
    }
}
