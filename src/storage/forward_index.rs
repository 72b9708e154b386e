use crate::core::{ByteArraySequence, FileId, Result};
use crate::stats::ForwardIndexStats;

/// 持久化的 `FileId → ByteArraySequence` 映射
///
/// ## 契约（重要）
/// - `get` 对不存在的 key 返回 `Ok(None)`；只有介质不可读时才报 `Storage` 错误。
/// - `put(id, None)` 删除条目；否则原子覆盖，后续 `get` 不会看到部分写入。
/// - `get`/`put` 各自原子；同一 file id 的读-diff-写由上层串行化。
/// - `clear` 是独占操作：调用方保证没有并发的 `get`/`put`（不在内部强制）。
/// - `force` 刷盘但不关闭；`close` 之后的任何调用返回 `IndexError::Closed`。
pub trait ForwardIndex: Send + Sync {
    fn get(&self, file_id: FileId) -> Result<Option<ByteArraySequence>>;
    fn put(&self, file_id: FileId, value: Option<ByteArraySequence>) -> Result<()>;
    fn contains_mapping(&self, file_id: FileId) -> Result<bool>;
    fn clear(&self) -> Result<()>;
    fn force(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn stats(&self) -> ForwardIndexStats;
}
