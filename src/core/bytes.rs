use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, Range};
use std::sync::Arc;

use crate::core::error::{IndexError, Result};

/// 不可变字节视图：(buffer, offset, length)
///
/// forward index 与持久层之间的交换格式。构造后永不修改；
/// 可能与更大的共享 buffer 别名（例如整个 log 文件读入后的切片），
/// 调用方不得假设独占该 buffer。相等性/哈希按内容比较。
#[derive(Clone)]
pub struct ByteArraySequence {
    buf: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl ByteArraySequence {
    pub fn new(buf: Arc<[u8]>, offset: usize, len: usize) -> Result<Self> {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| end <= buf.len());
        if !in_bounds {
            return Err(IndexError::invalid_input(format!(
                "byte range {}+{} out of bounds for buffer of {}",
                offset,
                len,
                buf.len()
            )));
        }
        Ok(Self { buf, offset, len })
    }

    pub fn empty() -> Self {
        Self {
            buf: Arc::from(Vec::new()),
            offset: 0,
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 零拷贝子切片（range 相对于当前视图）
    pub fn slice(&self, range: Range<usize>) -> Option<Self> {
        if range.start > range.end || range.end > self.len {
            return None;
        }
        Some(Self {
            buf: self.buf.clone(),
            offset: self.offset + range.start,
            len: range.end - range.start,
        })
    }

    /// 是否与另一视图共享同一块底层 buffer
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf)
    }

    /// 拷贝出独立的 buffer（用于丢弃对大 buffer 的引用）
    pub fn detach(&self) -> Self {
        Self::from(self.as_slice())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Deref for ByteArraySequence {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ByteArraySequence {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for ByteArraySequence {
    fn from(v: Vec<u8>) -> Self {
        let len = v.len();
        Self {
            buf: Arc::from(v),
            offset: 0,
            len,
        }
    }
}

impl From<&[u8]> for ByteArraySequence {
    fn from(v: &[u8]) -> Self {
        Self {
            buf: Arc::from(v),
            offset: 0,
            len: v.len(),
        }
    }
}

impl PartialEq for ByteArraySequence {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteArraySequence {}

impl Hash for ByteArraySequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl fmt::Debug for ByteArraySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteArraySequence(")?;
        for b in self.as_slice().iter().take(32) {
            write!(f, "{:02x}", b)?;
        }
        if self.len > 32 {
            write!(f, "..; {} bytes", self.len)?;
        }
        write!(f, ")")
    }
}
