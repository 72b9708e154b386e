use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{ByteArraySequence, CancelToken, FileId, IndexError, InputData, Result};
use crate::index::accessor::ForwardIndexAccessor;
use crate::index::diff::InputDataDiffBuilder;
use crate::index::single_value::SingleValueDiffBuilder;

/// 倒排索引的只读查询接口（仅 single-entry 索引使用）
pub trait InvertedIndexQuery<V>: Send + Sync {
    /// 该文件当前在倒排索引中的值；key 为 file id
    fn indexed_values_for_file(&self, file_id: FileId) -> Result<HashMap<FileId, V>>;
}

/// key 恒为 file id、每文件一个值的索引
///
/// 旧值直接从倒排索引里查出，forward index 自身从不存字节：
/// `serialize_indexed_data` 总是返回 `None`。
pub struct SingleEntryForwardIndexAccessor<V> {
    inverted: Arc<dyn InvertedIndexQuery<V>>,
    cancel: CancelToken,
}

impl<V> SingleEntryForwardIndexAccessor<V> {
    pub fn new(inverted: Arc<dyn InvertedIndexQuery<V>>, cancel: CancelToken) -> Self {
        Self { inverted, cancel }
    }
}

impl<V> ForwardIndexAccessor<FileId, V> for SingleEntryForwardIndexAccessor<V>
where
    V: PartialEq + Send + 'static,
{
    fn get_diff_builder(
        &self,
        file_id: FileId,
        _stored: Option<&ByteArraySequence>,
    ) -> Result<Box<dyn InputDataDiffBuilder<FileId, V>>> {
        // 查询中途被打断会让 builder 拿到不完整的旧值
        let current = self.cancel.compute_in_non_cancelable_section(|| {
            self.inverted.indexed_values_for_file(file_id)
        })?;
        if current.len() > 1 {
            return Err(IndexError::invalid_input(format!(
                "file {} has {} values in a single-entry index",
                file_id,
                current.len()
            )));
        }
        let old = current.into_values().next();
        Ok(Box::new(SingleValueDiffBuilder::new(file_id, old)))
    }

    fn serialize_indexed_data(
        &self,
        _data: &InputData<FileId, V>,
    ) -> Result<Option<ByteArraySequence>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::diff::{DiffOp, DiffRecorder};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeInverted {
        values: Mutex<HashMap<FileId, String>>,
        fail: bool,
        cancel_during_query: Option<CancelToken>,
    }

    impl InvertedIndexQuery<String> for FakeInverted {
        fn indexed_values_for_file(&self, file_id: FileId) -> Result<HashMap<FileId, String>> {
            if let Some(t) = &self.cancel_during_query {
                t.cancel();
                // 区段内不应看到取消
                t.check_canceled()?;
            }
            if self.fail {
                return Err(IndexError::Storage(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "inverted storage unreadable",
                )));
            }
            Ok(self
                .values
                .lock()
                .get(&file_id)
                .map(|v| [(file_id, v.clone())].into_iter().collect())
                .unwrap_or_default())
        }
    }

    type Acc = SingleEntryForwardIndexAccessor<String>;

    fn value(file_id: FileId, v: &str) -> InputData<FileId, String> {
        [(file_id, v.to_string())].into_iter().collect()
    }

    #[test]
    fn old_value_comes_from_inverted_index() {
        let inv = Arc::new(FakeInverted::default());
        inv.values.lock().insert(3, "old".to_string());
        let acc = Acc::new(inv.clone(), CancelToken::new());

        // 存储字节被忽略
        let junk = ByteArraySequence::from(vec![0xde, 0xad]);
        let mut b = acc.get_diff_builder(3, Some(&junk)).unwrap();
        let mut rec: DiffRecorder<FileId, String> = DiffRecorder::new();
        assert!(b.differentiate(&value(3, "new"), &mut rec).unwrap());
        assert_eq!(
            rec.into_ops(),
            vec![DiffOp::Update {
                file_id: 3,
                key: 3,
                value: "new".to_string()
            }]
        );
    }

    #[test]
    fn nothing_is_ever_persisted() {
        let acc = Acc::new(Arc::new(FakeInverted::default()), CancelToken::new());
        assert!(acc.serialize_indexed_data(&value(1, "v")).unwrap().is_none());
    }

    #[test]
    fn absent_then_present_adds_and_reverse_removes() {
        let inv = Arc::new(FakeInverted::default());
        let acc = Acc::new(inv.clone(), CancelToken::new());

        let mut b = acc.get_diff_builder(2, None).unwrap();
        let mut rec: DiffRecorder<FileId, String> = DiffRecorder::new();
        b.differentiate(&value(2, "v"), &mut rec).unwrap();
        assert!(matches!(rec.ops.as_slice(), [DiffOp::Add { .. }]));

        inv.values.lock().insert(2, "v".to_string());
        let mut b = acc.get_diff_builder(2, None).unwrap();
        let mut rec: DiffRecorder<FileId, String> = DiffRecorder::new();
        b.differentiate(&InputData::new(), &mut rec).unwrap();
        assert_eq!(rec.into_ops(), vec![DiffOp::Remove { file_id: 2, key: 2 }]);
    }

    #[test]
    fn cancellation_does_not_interrupt_query() {
        let token = CancelToken::new();
        let inv = Arc::new(FakeInverted {
            cancel_during_query: Some(token.clone()),
            ..FakeInverted::default()
        });
        let acc = Acc::new(inv, token.clone());
        assert!(acc.get_diff_builder(1, None).is_ok());
        // 区段结束后取消信号恢复生效
        assert!(matches!(token.check_canceled(), Err(IndexError::Canceled)));
    }

    #[test]
    fn query_error_is_reraised() {
        let inv = Arc::new(FakeInverted {
            fail: true,
            ..FakeInverted::default()
        });
        let acc = Acc::new(inv, CancelToken::new());
        assert!(matches!(
            acc.get_diff_builder(1, None),
            Err(IndexError::Storage(_))
        ));
    }
}
