use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::core::{ByteArraySequence, FileId, IndexError, Result};
use crate::stats::ForwardIndexStats;
use crate::storage::forward_index::ForwardIndex;

/// 纯内存 forward index（DashMap 实现），不落盘
#[derive(Default)]
pub struct InMemoryForwardIndex {
    entries: DashMap<FileId, ByteArraySequence>,
    closed: AtomicBool,
    puts: AtomicU64,
    removes: AtomicU64,
}

impl InMemoryForwardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::Closed);
        }
        Ok(())
    }
}

impl ForwardIndex for InMemoryForwardIndex {
    fn get(&self, file_id: FileId) -> Result<Option<ByteArraySequence>> {
        self.ensure_open()?;
        Ok(self.entries.get(&file_id).map(|e| e.value().clone()))
    }

    fn put(&self, file_id: FileId, value: Option<ByteArraySequence>) -> Result<()> {
        self.ensure_open()?;
        match value {
            Some(v) => {
                self.entries.insert(file_id, v);
                self.puts.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                if self.entries.remove(&file_id).is_some() {
                    self.removes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn contains_mapping(&self, file_id: FileId) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.entries.contains_key(&file_id))
    }

    fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        self.entries.clear();
        Ok(())
    }

    fn force(&self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.entries.clear();
        Ok(())
    }

    fn stats(&self) -> ForwardIndexStats {
        let live_value_bytes = self.entries.iter().map(|e| e.value().len() as u64).sum();
        ForwardIndexStats {
            entry_count: self.entries.len(),
            live_value_bytes,
            puts: self.puts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            ..ForwardIndexStats::default()
        }
    }
}
