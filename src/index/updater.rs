use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::core::{FileId, IndexError, InputData, Result};
use crate::index::accessor::ForwardIndexAccessor;
use crate::index::diff::DiffSink;
use crate::storage::ForwardIndex;

/// 单个文件一次 update 的结果
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateOutcome {
    /// diff 是否触发过任何回调
    pub changed: bool,
    /// 是否写回了 forward index
    pub rewritten: bool,
    /// 写回后存储的快照字节数（无条目为 0）
    pub stored_bytes_len: usize,
}

/// 读旧快照 → diff → 写回新快照
///
/// 同一 file id 的 update 由调用方串行化；不同 file id 可并发（见 `update_batch`）。
pub struct ForwardIndexUpdater<K, V> {
    forward: Arc<dyn ForwardIndex>,
    accessor: Arc<dyn ForwardIndexAccessor<K, V>>,
}

impl<K, V> ForwardIndexUpdater<K, V> {
    pub fn new(
        forward: Arc<dyn ForwardIndex>,
        accessor: Arc<dyn ForwardIndexAccessor<K, V>>,
    ) -> Self {
        Self { forward, accessor }
    }

    pub fn forward(&self) -> &Arc<dyn ForwardIndex> {
        &self.forward
    }

    pub fn update(
        &self,
        file_id: FileId,
        new_data: &InputData<K, V>,
        sink: &mut dyn DiffSink<K, V>,
    ) -> Result<UpdateOutcome> {
        if file_id == 0 {
            return Err(IndexError::InvalidFileId(file_id));
        }

        let stored = self.forward.get(file_id)?;
        let new_bytes = self.accessor.serialize_indexed_data(new_data)?;
        let diffed = self
            .accessor
            .get_diff_builder(file_id, stored.as_ref())
            .and_then(|mut builder| builder.differentiate(new_data, sink));
        let changed = match diffed {
            Ok(changed) => changed,
            Err(e) => {
                if e.requires_rebuild() {
                    tracing::warn!(
                        "Diff aborted for file {}, stored snapshot left untouched, needs full re-index: {}",
                        file_id,
                        e
                    );
                }
                return Err(e);
            }
        };

        // 编码版本漂移时 diff 为空但字节不同，也要写回
        let rewritten = changed || stored != new_bytes;
        let stored_bytes_len = new_bytes.as_ref().map_or(0, |b| b.len());
        if rewritten {
            self.forward.put(file_id, new_bytes)?;
        }
        tracing::debug!(
            "file {}: changed={} rewritten={} bytes={}",
            file_id,
            changed,
            rewritten,
            stored_bytes_len
        );
        Ok(UpdateOutcome {
            changed,
            rewritten,
            stored_bytes_len,
        })
    }

    /// 文件被删除：旧快照中的每个 key 都报 remove，并删掉条目
    pub fn remove_file(
        &self,
        file_id: FileId,
        sink: &mut dyn DiffSink<K, V>,
    ) -> Result<UpdateOutcome> {
        self.update(file_id, &InputData::new(), sink)
    }
}

impl<K, V> ForwardIndexUpdater<K, V>
where
    K: Sync,
    V: Sync,
{
    /// 并行处理一批互不相同的文件；每个文件的结果单独返回
    ///
    /// 批内出现重复 file id 时整批拒绝，不做任何 diff。
    pub fn update_batch<S, F>(
        &self,
        batch: &[(FileId, InputData<K, V>)],
        make_sink: F,
    ) -> Result<Vec<(FileId, Result<UpdateOutcome>)>>
    where
        S: DiffSink<K, V>,
        F: Fn(FileId) -> S + Sync,
    {
        let mut seen = HashSet::with_capacity(batch.len());
        for (file_id, _) in batch {
            if !seen.insert(*file_id) {
                return Err(IndexError::DuplicateFileId(*file_id));
            }
        }

        let results: Vec<(FileId, Result<UpdateOutcome>)> = batch
            .par_iter()
            .map(|(file_id, data)| {
                let mut sink = make_sink(*file_id);
                (*file_id, self.update(*file_id, data, &mut sink))
            })
            .collect();

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(
            "Batch update: {} files, {} failed",
            results.len(),
            failed
        );
        Ok(results)
    }
}
