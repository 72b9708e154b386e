use std::hash::Hash;

use crate::core::{FileId, IndexError, InputData, Result};

/// diff 的接收端（通常是倒排索引的更新器）
///
/// 任一回调返回错误都会立即中止 diff；已执行的回调不会回滚，
/// 调用方应把该文件视为需要全量重建。
pub trait DiffSink<K, V> {
    fn add(&mut self, file_id: FileId, key: &K, value: &V) -> anyhow::Result<()>;
    fn update(&mut self, file_id: FileId, key: &K, value: &V) -> anyhow::Result<()>;
    fn remove(&mut self, file_id: FileId, key: &K) -> anyhow::Result<()>;
}

/// 旧快照 + 新数据 → add/update/remove
///
/// 状态机：constructed → diffed（终态）。每个 builder 只能 diff 一次，
/// 第二次调用返回 `IndexError::BuilderConsumed` 且不触发任何回调。
pub trait InputDataDiffBuilder<K, V>: Send {
    fn file_id(&self) -> FileId;

    /// 返回是否触发过任何回调
    fn differentiate(
        &mut self,
        new_data: &InputData<K, V>,
        sink: &mut dyn DiffSink<K, V>,
    ) -> Result<bool>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BuilderState {
    Constructed,
    Diffed,
}

impl BuilderState {
    /// 进入 diffed；即使随后 diff 失败也不会回到 constructed
    pub(crate) fn begin(&mut self) -> Result<()> {
        if *self == BuilderState::Diffed {
            return Err(IndexError::BuilderConsumed);
        }
        *self = BuilderState::Diffed;
        Ok(())
    }
}

/// 包一层 sink：记录是否有回调触发，并把回调错误转换为 `IndexError::Callback`
pub(crate) struct Reporter<'a, K, V> {
    file_id: FileId,
    sink: &'a mut dyn DiffSink<K, V>,
    changed: bool,
}

impl<'a, K, V> Reporter<'a, K, V> {
    pub(crate) fn new(file_id: FileId, sink: &'a mut dyn DiffSink<K, V>) -> Self {
        Self {
            file_id,
            sink,
            changed: false,
        }
    }

    pub(crate) fn add(&mut self, key: &K, value: &V) -> Result<()> {
        self.changed = true;
        self.sink
            .add(self.file_id, key, value)
            .map_err(IndexError::Callback)
    }

    pub(crate) fn update(&mut self, key: &K, value: &V) -> Result<()> {
        self.changed = true;
        self.sink
            .update(self.file_id, key, value)
            .map_err(IndexError::Callback)
    }

    pub(crate) fn remove(&mut self, key: &K) -> Result<()> {
        self.changed = true;
        self.sink
            .remove(self.file_id, key)
            .map_err(IndexError::Callback)
    }

    pub(crate) fn changed(&self) -> bool {
        self.changed
    }
}

/// 无旧快照（首次索引，或 null 字节）：新数据全部是 add
pub struct EmptyDiffBuilder {
    file_id: FileId,
    state: BuilderState,
}

impl EmptyDiffBuilder {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            state: BuilderState::Constructed,
        }
    }
}

impl<K, V> InputDataDiffBuilder<K, V> for EmptyDiffBuilder {
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
        for (k, v) in new_data {
            r.add(k, v)?;
        }
        Ok(r.changed())
    }
}

/// 闭包版 sink
pub struct CallbackSink<A, U, R> {
    on_add: A,
    on_update: U,
    on_remove: R,
}

impl<A, U, R> CallbackSink<A, U, R> {
    pub fn new<K, V>(on_add: A, on_update: U, on_remove: R) -> Self
    where
        A: FnMut(FileId, &K, &V) -> anyhow::Result<()>,
        U: FnMut(FileId, &K, &V) -> anyhow::Result<()>,
        R: FnMut(FileId, &K) -> anyhow::Result<()>,
    {
        Self {
            on_add,
            on_update,
            on_remove,
        }
    }
}

impl<K, V, A, U, R> DiffSink<K, V> for CallbackSink<A, U, R>
where
    A: FnMut(FileId, &K, &V) -> anyhow::Result<()>,
    U: FnMut(FileId, &K, &V) -> anyhow::Result<()>,
    R: FnMut(FileId, &K) -> anyhow::Result<()>,
{
    fn add(&mut self, file_id: FileId, key: &K, value: &V) -> anyhow::Result<()> {
        (self.on_add)(file_id, key, value)
    }

    fn update(&mut self, file_id: FileId, key: &K, value: &V) -> anyhow::Result<()> {
        (self.on_update)(file_id, key, value)
    }

    fn remove(&mut self, file_id: FileId, key: &K) -> anyhow::Result<()> {
        (self.on_remove)(file_id, key)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum DiffOp<K, V> {
    Add { file_id: FileId, key: K, value: V },
    Update { file_id: FileId, key: K, value: V },
    Remove { file_id: FileId, key: K },
}

/// 把 diff 物化为 `DiffOp` 列表（调试、测试、延迟应用）
#[derive(Clone, Debug)]
pub struct DiffRecorder<K, V> {
    pub ops: Vec<DiffOp<K, V>>,
}

impl<K, V> Default for DiffRecorder<K, V> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<K, V> DiffRecorder<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<DiffOp<K, V>> {
        self.ops
    }
}

impl<K, V> DiffRecorder<K, V>
where
    K: Eq + Hash,
    V: Eq + Hash,
{
    /// 顺序无关的比较视图
    pub fn op_set(&self) -> std::collections::HashSet<&DiffOp<K, V>> {
        self.ops.iter().collect()
    }
}

impl<K: Clone, V: Clone> DiffSink<K, V> for DiffRecorder<K, V> {
    fn add(&mut self, file_id: FileId, key: &K, value: &V) -> anyhow::Result<()> {
        self.ops.push(DiffOp::Add {
            file_id,
            key: key.clone(),
            value: value.clone(),
        });
        Ok(())
    }

    fn update(&mut self, file_id: FileId, key: &K, value: &V) -> anyhow::Result<()> {
        self.ops.push(DiffOp::Update {
            file_id,
            key: key.clone(),
            value: value.clone(),
        });
        Ok(())
    }

    fn remove(&mut self, file_id: FileId, key: &K) -> anyhow::Result<()> {
        self.ops.push(DiffOp::Remove {
            file_id,
            key: key.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_reports_only_adds() {
        let mut b = EmptyDiffBuilder::new(3);
        let data: InputData<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
        let mut rec: DiffRecorder<&str, i32> = DiffRecorder::new();
        assert!(b.differentiate(&data, &mut rec).unwrap());
        assert_eq!(rec.ops.len(), 2);
        assert!(rec.op_set().contains(&DiffOp::Add {
            file_id: 3,
            key: "a",
            value: 1
        }));
    }

    #[test]
    fn second_differentiate_is_rejected_without_callbacks() {
        let mut b = EmptyDiffBuilder::new(1);
        let data: InputData<u32, u32> = [(1, 1)].into_iter().collect();
        let mut rec: DiffRecorder<u32, u32> = DiffRecorder::new();
        assert!(b.differentiate(&data, &mut rec).unwrap());
        let mut again: DiffRecorder<u32, u32> = DiffRecorder::new();
        assert!(matches!(
            b.differentiate(&data, &mut again),
            Err(IndexError::BuilderConsumed)
        ));
        assert!(again.is_empty());
        assert_eq!(rec.ops.len(), 1);
    }

    #[test]
    fn callback_sink_routes_each_kind() {
        let mut adds = Vec::new();
        let mut removes = Vec::new();
        {
            let mut sink = CallbackSink::new(
                |id: FileId, k: &u32, v: &u32| {
                    adds.push((id, *k, *v));
                    Ok(())
                },
                |_: FileId, _: &u32, _: &u32| Ok(()),
                |id: FileId, k: &u32| {
                    removes.push((id, *k));
                    Ok(())
                },
            );
            DiffSink::<u32, u32>::add(&mut sink, 9, &1, &2).unwrap();
            DiffSink::<u32, u32>::remove(&mut sink, 9, &5).unwrap();
        }
        assert_eq!(adds, vec![(9, 1, 2)]);
        assert_eq!(removes, vec![(9, 5)]);
    }
}
