use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::core::{
    deserialize, serialize, ByteArraySequence, DataExternalizer, FileId, InputData,
    MapExternalizer, Result, ScratchPool,
};
use crate::index::accessor::ForwardIndexAccessor;
use crate::index::diff::{
    BuilderState, DiffSink, EmptyDiffBuilder, InputDataDiffBuilder, Reporter,
};

/// 通用情形：快照即完整的 key → value map
pub struct MapForwardIndexAccessor<K, V> {
    externalizer: Arc<dyn DataExternalizer<HashMap<K, V>>>,
    scratch: Arc<ScratchPool>,
}

impl<K, V> MapForwardIndexAccessor<K, V>
where
    K: Eq + Hash + 'static,
    V: 'static,
{
    pub fn new(
        keys: Arc<dyn DataExternalizer<K>>,
        values: Arc<dyn DataExternalizer<V>>,
        scratch: Arc<ScratchPool>,
    ) -> Self {
        Self::with_externalizer(Arc::new(MapExternalizer::new(keys, values)), scratch)
    }

    pub fn with_externalizer(
        externalizer: Arc<dyn DataExternalizer<HashMap<K, V>>>,
        scratch: Arc<ScratchPool>,
    ) -> Self {
        Self {
            externalizer,
            scratch,
        }
    }
}

impl<K, V> ForwardIndexAccessor<K, V> for MapForwardIndexAccessor<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: PartialEq + Clone + Send + 'static,
{
    fn get_diff_builder(
        &self,
        file_id: FileId,
        stored: Option<&ByteArraySequence>,
    ) -> Result<Box<dyn InputDataDiffBuilder<K, V>>> {
        match deserialize(stored, self.externalizer.as_ref())? {
            Some(old) => Ok(Box::new(MapDiffBuilder::new(file_id, old))),
            None => Ok(Box::new(EmptyDiffBuilder::new(file_id))),
        }
    }

    fn serialize_indexed_data(&self, data: &InputData<K, V>) -> Result<Option<ByteArraySequence>> {
        if data.is_empty() {
            return Ok(None);
        }
        serialize(data, self.externalizer.as_ref(), &self.scratch).map(Some)
    }
}

/// O(old + new)：两次遍历 + 哈希成员测试
pub struct MapDiffBuilder<K, V> {
    file_id: FileId,
    old: HashMap<K, V>,
    state: BuilderState,
}

impl<K, V> MapDiffBuilder<K, V> {
    pub fn new(file_id: FileId, old: HashMap<K, V>) -> Self {
        Self {
            file_id,
            old,
            state: BuilderState::Constructed,
        }
    }
}

impl<K, V> InputDataDiffBuilder<K, V> for MapDiffBuilder<K, V>
where
    K: Eq + Hash + Send,
    V: PartialEq + Send,
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

        for k in self.old.keys() {
            if !new_data.contains_key(k) {
                r.remove(k)?;
            }
        }
        for (k, v) in new_data {
            match self.old.get(k) {
                None => r.add(k, v)?,
                Some(old_v) if old_v != v => r.update(k, v)?,
                Some(_) => {}
            }
        }

        tracing::trace!(
            "map diff for file {}: old={} new={} changed={}",
            self.file_id,
            self.old.len(),
            new_data.len(),
            r.changed()
        );
        Ok(r.changed())
    }
}
