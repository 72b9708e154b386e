use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::{
    deserialize, serialize, ByteArraySequence, CollectionExternalizer, DataExternalizer, FileId,
    InputData, Result, ScratchPool,
};
use crate::index::accessor::ForwardIndexAccessor;
use crate::index::diff::{
    BuilderState, DiffSink, EmptyDiffBuilder, InputDataDiffBuilder, Reporter,
};

/// 无值索引（只关心 key 是否存在）：快照只存 key 集合
///
/// 新增 key 的 value 取自新数据本身（调用方定义的占位值，常见为 file id 或 `()`）。
pub struct KeyCollectionForwardIndexAccessor<K, V> {
    externalizer: Arc<dyn DataExternalizer<HashSet<K>>>,
    scratch: Arc<ScratchPool>,
    _values: PhantomData<fn() -> V>,
}

impl<K, V> KeyCollectionForwardIndexAccessor<K, V>
where
    K: Eq + Hash + 'static,
{
    pub fn new(keys: Arc<dyn DataExternalizer<K>>, scratch: Arc<ScratchPool>) -> Self {
        Self {
            externalizer: Arc::new(CollectionExternalizer::new(keys)),
            scratch,
            _values: PhantomData,
        }
    }
}

impl<K, V> ForwardIndexAccessor<K, V> for KeyCollectionForwardIndexAccessor<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    fn get_diff_builder(
        &self,
        file_id: FileId,
        stored: Option<&ByteArraySequence>,
    ) -> Result<Box<dyn InputDataDiffBuilder<K, V>>> {
        match deserialize(stored, self.externalizer.as_ref())? {
            Some(old) => Ok(Box::new(KeyCollectionDiffBuilder::new(file_id, old))),
            None => Ok(Box::new(EmptyDiffBuilder::new(file_id))),
        }
    }

    fn serialize_indexed_data(&self, data: &InputData<K, V>) -> Result<Option<ByteArraySequence>> {
        if data.is_empty() {
            return Ok(None);
        }
        let keys: HashSet<K> = data.keys().cloned().collect();
        serialize(&keys, self.externalizer.as_ref(), &self.scratch).map(Some)
    }
}

/// 对称差：只在新数据里 → add；只在旧快照里 → remove；两边都有 → 无回调
pub struct KeyCollectionDiffBuilder<K> {
    file_id: FileId,
    old: HashSet<K>,
    state: BuilderState,
}

impl<K> KeyCollectionDiffBuilder<K> {
    pub fn new(file_id: FileId, old: HashSet<K>) -> Self {
        Self {
            file_id,
            old,
            state: BuilderState::Constructed,
        }
    }
}

impl<K, V> InputDataDiffBuilder<K, V> for KeyCollectionDiffBuilder<K>
where
    K: Eq + Hash + Send,
{
    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn differentiate(
        &mut self,
        new_data: &InputData<K, V>,
        sink: &mut dyn DiffSink<K, V>,
    ) -> Result<bool> {
        self.state.begin()?;
        let mut r = Reporter::new(self.file_id, sink);
        for k in &self.old {
            if !new_data.contains_key(k) {
                r.remove(k)?;
            }
        }
        for (k, v) in new_data {
            if !self.old.contains(k) {
                r.add(k, v)?;
            }
        }
        Ok(r.changed())
    }
}
