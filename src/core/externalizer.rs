use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::io::{self, Cursor, Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::bytes::ByteArraySequence;
use crate::core::error::{IndexError, Result};
use crate::core::scratch::ScratchPool;

// 读取计数前缀时的预分配上限：损坏的计数不应触发巨型分配
const PREALLOC_LIMIT: usize = 4096;

/// 值的编解码策略（每种索引自行提供）
///
/// ## 契约
/// - 对称：`write` 后 `read` 得到相等的值。
/// - 自定界：不依赖外部长度前缀即可读出完整值。
/// - 确定性：同一输入总是产出同样的字节。
pub trait DataExternalizer<T>: Send + Sync {
    fn write(&self, out: &mut dyn Write, value: &T) -> io::Result<()>;
    fn read(&self, input: &mut dyn Read) -> io::Result<T>;
}

/// 编码为 `ByteArraySequence`；scratch buffer 来自调用方提供的池
pub fn serialize<T>(
    value: &T,
    externalizer: &dyn DataExternalizer<T>,
    scratch: &ScratchPool,
) -> Result<ByteArraySequence> {
    let mut buf = scratch.acquire();
    externalizer
        .write(&mut *buf, value)
        .map_err(IndexError::encode)?;
    Ok(ByteArraySequence::from(buf.as_slice()))
}

/// 解码；`None` 输入（无快照）直接返回 `None`
///
/// 必须恰好消费全部字节，尾部残留视为损坏/版本不匹配。
pub fn deserialize<T>(
    bytes: Option<&ByteArraySequence>,
    externalizer: &dyn DataExternalizer<T>,
) -> Result<Option<T>> {
    let Some(bytes) = bytes else {
        return Ok(None);
    };
    let mut cur = Cursor::new(bytes.as_slice());
    let value = externalizer.read(&mut cur).map_err(IndexError::decode)?;
    let consumed = cur.position() as usize;
    if consumed != bytes.len() {
        return Err(IndexError::decode(format!(
            "{} trailing bytes after value ({} consumed)",
            bytes.len() - consumed,
            consumed
        )));
    }
    Ok(Some(value))
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn len_u32(n: usize) -> io::Result<u32> {
    n.try_into()
        .map_err(|_| invalid_data(format!("length {} exceeds u32", n)))
}

/// LEB128 无符号 varint（u32）
pub fn write_varint(out: &mut dyn Write, mut v: u32) -> io::Result<()> {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            return out.write_all(&[byte]);
        }
        out.write_all(&[byte | 0x80])?;
    }
}

pub fn read_varint(input: &mut dyn Read) -> io::Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0u32;
    loop {
        let mut b = [0u8; 1];
        input.read_exact(&mut b)?;
        let byte = b[0];
        // 第 5 字节只剩 4 个有效位，且不能再有续位
        if shift == 28 && byte & 0xf0 != 0 {
            return Err(invalid_data("varint overflows u32"));
        }
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// 定长 4 字节 LE；定长保证与“缺失”不产生歧义
#[derive(Clone, Copy, Debug, Default)]
pub struct I32Externalizer;

impl DataExternalizer<i32> for I32Externalizer {
    fn write(&self, out: &mut dyn Write, value: &i32) -> io::Result<()> {
        out.write_all(&value.to_le_bytes())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<i32> {
        let mut b = [0u8; 4];
        input.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct U32Externalizer;

impl DataExternalizer<u32> for U32Externalizer {
    fn write(&self, out: &mut dyn Write, value: &u32) -> io::Result<()> {
        out.write_all(&value.to_le_bytes())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<u32> {
        let mut b = [0u8; 4];
        input.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }
}

/// varint 长度 + UTF-8
#[derive(Clone, Copy, Debug, Default)]
pub struct StringExternalizer;

impl DataExternalizer<String> for StringExternalizer {
    fn write(&self, out: &mut dyn Write, value: &String) -> io::Result<()> {
        write_varint(out, len_u32(value.len())?)?;
        out.write_all(value.as_bytes())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<String> {
        let len = read_varint(input)? as usize;
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        input.take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "string body truncated",
            ));
        }
        String::from_utf8(buf).map_err(|e| invalid_data(e.to_string()))
    }
}

/// 无值索引（仅存在性）用的零字节编码
#[derive(Clone, Copy, Debug, Default)]
pub struct UnitExternalizer;

impl DataExternalizer<()> for UnitExternalizer {
    fn write(&self, _out: &mut dyn Write, _value: &()) -> io::Result<()> {
        Ok(())
    }

    fn read(&self, _input: &mut dyn Read) -> io::Result<()> {
        Ok(())
    }
}

/// 任意 serde 类型，经 bincode 编码
pub struct BincodeExternalizer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeExternalizer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeExternalizer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DataExternalizer<T> for BincodeExternalizer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn write(&self, out: &mut dyn Write, value: &T) -> io::Result<()> {
        bincode::serialize_into(out, value).map_err(|e| invalid_data(e.to_string()))
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<T> {
        bincode::deserialize_from(input).map_err(|e| invalid_data(e.to_string()))
    }
}

/// 将 key 编码后按字节序排序，保证 HashMap/HashSet 的迭代顺序不影响输出
fn sorted_encoded_keys<'a, K: 'a>(
    keys: impl Iterator<Item = &'a K>,
    externalizer: &dyn DataExternalizer<K>,
) -> io::Result<Vec<(Vec<u8>, &'a K)>> {
    let mut out = Vec::new();
    for k in keys {
        let mut kb = Vec::new();
        externalizer.write(&mut kb, k)?;
        out.push((kb, k));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// varint 条目数 + (key, value)*
pub struct MapExternalizer<K, V> {
    keys: Arc<dyn DataExternalizer<K>>,
    values: Arc<dyn DataExternalizer<V>>,
}

impl<K, V> MapExternalizer<K, V> {
    pub fn new(keys: Arc<dyn DataExternalizer<K>>, values: Arc<dyn DataExternalizer<V>>) -> Self {
        Self { keys, values }
    }
}

impl<K, V> DataExternalizer<HashMap<K, V>> for MapExternalizer<K, V>
where
    K: Eq + Hash,
{
    fn write(&self, out: &mut dyn Write, value: &HashMap<K, V>) -> io::Result<()> {
        let entries = sorted_encoded_keys(value.keys(), self.keys.as_ref())?;
        write_varint(out, len_u32(entries.len())?)?;
        for (kb, k) in entries {
            out.write_all(&kb)?;
            if let Some(v) = value.get(k) {
                self.values.write(out, v)?;
            }
        }
        Ok(())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<HashMap<K, V>> {
        let n = read_varint(input)? as usize;
        let mut map = HashMap::with_capacity(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            let k = self.keys.read(input)?;
            let v = self.values.read(input)?;
            if map.insert(k, v).is_some() {
                return Err(invalid_data("duplicate key in map snapshot"));
            }
        }
        Ok(map)
    }
}

/// varint 条目数 + key*
pub struct CollectionExternalizer<K> {
    keys: Arc<dyn DataExternalizer<K>>,
}

impl<K> CollectionExternalizer<K> {
    pub fn new(keys: Arc<dyn DataExternalizer<K>>) -> Self {
        Self { keys }
    }
}

impl<K> DataExternalizer<HashSet<K>> for CollectionExternalizer<K>
where
    K: Eq + Hash,
{
    fn write(&self, out: &mut dyn Write, value: &HashSet<K>) -> io::Result<()> {
        let entries = sorted_encoded_keys(value.iter(), self.keys.as_ref())?;
        write_varint(out, len_u32(entries.len())?)?;
        for (kb, _) in entries {
            out.write_all(&kb)?;
        }
        Ok(())
    }

    fn read(&self, input: &mut dyn Read) -> io::Result<HashSet<K>> {
        let n = read_varint(input)? as usize;
        let mut set = HashSet::with_capacity(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            if !set.insert(self.keys.read(input)?) {
                return Err(invalid_data("duplicate key in collection snapshot"));
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_map() -> MapExternalizer<String, i32> {
        MapExternalizer::new(Arc::new(StringExternalizer), Arc::new(I32Externalizer))
    }

    #[test]
    fn varint_boundaries() {
        for v in [0u32, 1, 127, 128, 16_383, 16_384, u32::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v).unwrap();
            let mut cur = Cursor::new(buf.as_slice());
            assert_eq!(read_varint(&mut cur).unwrap(), v);
            assert_eq!(cur.position() as usize, buf.len());
        }
        let mut buf = Vec::new();
        write_varint(&mut buf, 127).unwrap();
        assert_eq!(buf, vec![0x7f]);
    }

    #[test]
    fn varint_overflow_is_rejected() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x1f];
        let mut cur = Cursor::new(&bytes[..]);
        assert!(read_varint(&mut cur).is_err());
    }

    #[test]
    fn map_round_trip_through_sequence() {
        let pool = ScratchPool::new(4, 2);
        let ext = string_map();
        let mut m = HashMap::new();
        m.insert("alpha".to_string(), 1);
        m.insert("beta".to_string(), -7);
        m.insert("gamma".to_string(), i32::MAX);
        // 初始容量 4 字节远小于编码结果，必须能正确扩容
        let bytes = serialize(&m, &ext, &pool).unwrap();
        assert!(bytes.len() > pool.initial_size());
        let back = deserialize::<HashMap<String, i32>>(Some(&bytes), &ext).unwrap();
        assert_eq!(back, Some(m));
    }

    #[test]
    fn map_encoding_is_deterministic() {
        let pool = ScratchPool::default();
        let ext = string_map();
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for i in 0..64 {
            a.insert(format!("k{}", i), i);
        }
        for i in (0..64).rev() {
            b.insert(format!("k{}", i), i);
        }
        let ea = serialize(&a, &ext, &pool).unwrap();
        let eb = serialize(&b, &ext, &pool).unwrap();
        assert_eq!(ea, eb);
    }

    #[test]
    fn collection_round_trip() {
        let pool = ScratchPool::default();
        let ext = CollectionExternalizer::new(Arc::new(U32Externalizer));
        let set: HashSet<u32> = [3, 1, 4, 1_000_000].into_iter().collect();
        let bytes = serialize(&set, &ext, &pool).unwrap();
        assert_eq!(bytes.len(), 1 + 4 * 4);
        assert_eq!(deserialize::<HashSet<u32>>(Some(&bytes), &ext).unwrap(), Some(set));
    }

    #[test]
    fn absent_bytes_decode_to_none() {
        let ext = I32Externalizer;
        assert_eq!(deserialize::<i32>(None, &ext).unwrap(), None);
    }

    #[test]
    fn trailing_and_truncated_bytes_are_decode_errors() {
        let ext = I32Externalizer;
        let long = ByteArraySequence::from(vec![1u8, 0, 0, 0, 9]);
        assert!(matches!(
            deserialize::<i32>(Some(&long), &ext),
            Err(IndexError::Decode { .. })
        ));
        let short = ByteArraySequence::from(vec![1u8, 0]);
        assert!(matches!(
            deserialize::<i32>(Some(&short), &ext),
            Err(IndexError::Decode { .. })
        ));
    }

    #[test]
    fn duplicate_keys_in_snapshot_are_rejected() {
        let ext = string_map();
        let mut raw = Vec::new();
        write_varint(&mut raw, 2).unwrap();
        for _ in 0..2 {
            StringExternalizer.write(&mut raw, &"dup".to_string()).unwrap();
            I32Externalizer.write(&mut raw, &1).unwrap();
        }
        let bytes = ByteArraySequence::from(raw);
        assert!(deserialize::<HashMap<String, i32>>(Some(&bytes), &ext).is_err());
    }

    #[test]
    fn bincode_externalizer_handles_serde_types() {
        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Sig {
            name: String,
            arity: u8,
        }
        let pool = ScratchPool::default();
        let ext = BincodeExternalizer::<Sig>::new();
        let v = Sig {
            name: "run".into(),
            arity: 2,
        };
        let bytes = serialize(&v, &ext, &pool).unwrap();
        assert_eq!(deserialize::<Sig>(Some(&bytes), &ext).unwrap(), Some(v));
    }

    #[test]
    fn unit_values_take_no_space() {
        let pool = ScratchPool::default();
        let ext = MapExternalizer::new(Arc::new(U32Externalizer), Arc::new(UnitExternalizer));
        let m: HashMap<u32, ()> = [(5, ())].into_iter().collect();
        let bytes = serialize(&m, &ext, &pool).unwrap();
        assert_eq!(bytes.len(), 1 + 4);
    }
}
