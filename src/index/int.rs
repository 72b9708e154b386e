use std::sync::Arc;

use crate::core::{
    deserialize, serialize, ByteArraySequence, FileId, I32Externalizer, InputData, Result,
    ScratchPool,
};
use crate::index::accessor::ForwardIndexAccessor;
use crate::index::diff::InputDataDiffBuilder;
use crate::index::single_value::{single_value, SingleValueDiffBuilder};

/// 每个文件只有一个整数值的索引（签名、哈希等）
///
/// 存储为定长 4 字节 LE，“缺失”即 forward index 中无条目。
pub struct IntForwardIndexAccessor {
    scratch: Arc<ScratchPool>,
}

impl IntForwardIndexAccessor {
    pub fn new(scratch: Arc<ScratchPool>) -> Self {
        Self { scratch }
    }

    pub fn decode(&self, stored: Option<&ByteArraySequence>) -> Result<Option<i32>> {
        deserialize::<i32>(stored, &I32Externalizer)
    }
}

impl ForwardIndexAccessor<FileId, i32> for IntForwardIndexAccessor {
    fn get_diff_builder(
        &self,
        file_id: FileId,
        stored: Option<&ByteArraySequence>,
    ) -> Result<Box<dyn InputDataDiffBuilder<FileId, i32>>> {
        let old = self.decode(stored)?;
        Ok(Box::new(SingleValueDiffBuilder::new(file_id, old)))
    }

    fn serialize_indexed_data(
        &self,
        data: &InputData<FileId, i32>,
    ) -> Result<Option<ByteArraySequence>> {
        // key 与 file id 是否一致在 diff 时校验；这里只编码值
        match single_value(data)? {
            Some((_, v)) => serialize(v, &I32Externalizer, &self.scratch).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IndexError;
    use crate::index::diff::{DiffOp, DiffRecorder};

    fn accessor() -> IntForwardIndexAccessor {
        IntForwardIndexAccessor::new(Arc::new(ScratchPool::default()))
    }

    fn value(file_id: FileId, v: Option<i32>) -> InputData<FileId, i32> {
        v.map(|v| (file_id, v)).into_iter().collect()
    }

    fn diff(old: Option<i32>, new: Option<i32>) -> (bool, Vec<DiffOp<FileId, i32>>) {
        let acc = accessor();
        let stored = acc.serialize_indexed_data(&value(11, old)).unwrap();
        let mut b = acc.get_diff_builder(11, stored.as_ref()).unwrap();
        let mut rec: DiffRecorder<FileId, i32> = DiffRecorder::new();
        let changed = b.differentiate(&value(11, new), &mut rec).unwrap();
        (changed, rec.into_ops())
    }

    #[test]
    fn absent_to_present_adds() {
        let (changed, ops) = diff(None, Some(42));
        assert!(changed);
        assert_eq!(
            ops,
            vec![DiffOp::Add {
                file_id: 11,
                key: 11,
                value: 42
            }]
        );
    }

    #[test]
    fn present_to_absent_removes() {
        let (changed, ops) = diff(Some(42), None);
        assert!(changed);
        assert_eq!(ops, vec![DiffOp::Remove { file_id: 11, key: 11 }]);
    }

    #[test]
    fn changed_value_updates_and_equal_is_silent() {
        assert_eq!(
            diff(Some(1), Some(-1)).1,
            vec![DiffOp::Update {
                file_id: 11,
                key: 11,
                value: -1
            }]
        );
        assert_eq!(diff(Some(7), Some(7)), (false, Vec::new()));
    }

    #[test]
    fn encoding_is_fixed_width() {
        let acc = accessor();
        for v in [0, 1, -1, i32::MIN, i32::MAX] {
            let bytes = acc.serialize_indexed_data(&value(1, Some(v))).unwrap();
            let bytes = bytes.expect("present value must be stored");
            assert_eq!(bytes.len(), 4);
            assert_eq!(acc.decode(Some(&bytes)).unwrap(), Some(v));
        }
        // 0 也是合法值，不能与“缺失”混淆
        assert!(acc.serialize_indexed_data(&value(1, Some(0))).unwrap().is_some());
        assert!(acc.serialize_indexed_data(&value(1, None)).unwrap().is_none());
    }

    #[test]
    fn wrong_width_is_decode_error() {
        let acc = accessor();
        let bad = ByteArraySequence::from(vec![1u8, 2, 3]);
        assert!(matches!(
            acc.get_diff_builder(1, Some(&bad)),
            Err(IndexError::Decode { .. })
        ));
    }
}
