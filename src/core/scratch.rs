use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// 超过该容量的 buffer 用完即丢，不放回池中（避免池长期持有大块内存）
const MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// 序列化用的 scratch buffer 池
///
/// 显式传入 `serialize`，替代隐式的线程局部 buffer。
/// `initial_size` 是常见情况下的容量提示；编码超出时 Vec 自行扩容。
pub struct ScratchPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    initial_size: usize,
    max_pooled: usize,
}

impl ScratchPool {
    pub fn new(initial_size: usize, max_pooled: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_pooled)),
            initial_size,
            max_pooled,
        }
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn acquire(&self) -> ScratchBuffer<'_> {
        let buf = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.initial_size));
        ScratchBuffer { pool: self, buf }
    }

    pub fn pooled(&self) -> usize {
        self.buffers.lock().len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut g = self.buffers.lock();
        if g.len() < self.max_pooled {
            g.push(buf);
        }
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(64, 8)
    }
}

/// 借出的 buffer；drop 时清空并归还
pub struct ScratchBuffer<'a> {
    pool: &'a ScratchPool,
    buf: Vec<u8>,
}

impl Deref for ScratchBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for ScratchBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for ScratchBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
