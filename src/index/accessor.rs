use crate::core::{ByteArraySequence, FileId, InputData, Result};
use crate::index::diff::InputDataDiffBuilder;

/// 每种索引的 forward index 策略
///
/// ## 契约
/// - `serialize_indexed_data` 把新数据转换成中间表示并编码；中间表示为空时返回 `None`，
///   forward index 因而存“无条目”而不是空 blob。
/// - `get_diff_builder` 解码旧字节（`None` = 无旧快照），返回闭包了旧状态与 file id 的 builder。
/// - 对同一 accessor，`get_diff_builder(id, serialize_indexed_data(d))` 对 `d` 做 diff 必须无回调。
pub trait ForwardIndexAccessor<K, V>: Send + Sync {
    fn get_diff_builder(
        &self,
        file_id: FileId,
        stored: Option<&ByteArraySequence>,
    ) -> Result<Box<dyn InputDataDiffBuilder<K, V>>>;

    fn serialize_indexed_data(&self, data: &InputData<K, V>) -> Result<Option<ByteArraySequence>>;
}
