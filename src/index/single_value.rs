use crate::core::{FileId, IndexError, InputData, Result};
use crate::index::diff::{BuilderState, DiffSink, InputDataDiffBuilder, Reporter};

/// 每个文件至多一个值，key 恒为 file id
///
/// | old     | new     | 回调              |
/// |---------|---------|-------------------|
/// | 无      | 有      | add               |
/// | 有      | 不同    | update            |
/// | 有      | 无      | remove            |
/// | 相等    | 相等    | 无                |
///
/// 新数据的 key 必须等于 file id，否则 `InvalidInput`，不触发回调。
pub struct SingleValueDiffBuilder<V> {
    file_id: FileId,
    old: Option<V>,
    state: BuilderState,
}

impl<V> SingleValueDiffBuilder<V> {
    pub fn new(file_id: FileId, old: Option<V>) -> Self {
        Self {
            file_id,
            old,
            state: BuilderState::Constructed,
        }
    }
}

/// 取出至多一个条目；多于一个条目时报错
pub(crate) fn single_value<V>(data: &InputData<FileId, V>) -> Result<Option<(FileId, &V)>> {
    if data.len() > 1 {
        return Err(IndexError::invalid_input(format!(
            "single-value index expects at most one entry per file, got {}",
            data.len()
        )));
    }
    Ok(data.iter().next().map(|(k, v)| (*k, v)))
}

impl<V> InputDataDiffBuilder<FileId, V> for SingleValueDiffBuilder<V>
where
    V: PartialEq + Send,
{
    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn differentiate(
        &mut self,
        new_data: &InputData<FileId, V>,
        sink: &mut dyn DiffSink<FileId, V>,
    ) -> Result<bool> {
        self.state.begin()?;
        let key = self.file_id;
        let new = match single_value(new_data)? {
            Some((k, _)) if k != key => {
                return Err(IndexError::invalid_input(format!(
                    "single-value entry for file {} is keyed by {}",
                    key, k
                )));
            }
            Some((_, v)) => Some(v),
            None => None,
        };
        let mut r = Reporter::new(self.file_id, sink);
        match (self.old.as_ref(), new) {
            (None, Some(v)) => r.add(&key, v)?,
            (Some(old), Some(v)) if old != v => r.update(&key, v)?,
            (Some(_), None) => r.remove(&key)?,
            _ => {}
        }
        Ok(r.changed())
    }
}
