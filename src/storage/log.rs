use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{ByteArraySequence, FileId, IndexError, Result};
use crate::stats::ForwardIndexStats;
use crate::storage::forward_index::ForwardIndex;

const LOG_MAGIC: u32 = 0x3144_5746; // "FWD1"
const LOG_VERSION: u32 = 1;
const HEADER_SIZE: u64 = 4 + 4; // magic + version
const RECORD_HEADER: usize = 4 + 4; // len + checksum
const PAYLOAD_PREFIX: usize = 4 + 1; // file_id + kind

const KIND_PUT: u8 = 1;
const KIND_REMOVE: u8 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct LogOptions {
    pub compaction_garbage_ratio: f64,
    pub compaction_min_bytes: u64,
    pub sync_on_force: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            compaction_garbage_ratio: 0.5,
            compaction_min_bytes: 1024 * 1024,
            sync_on_force: true,
        }
    }
}

fn checksum(payload: &[u8]) -> u32 {
    xxhash_rust::xxh3::xxh3_64(payload) as u32
}

fn header_bytes() -> [u8; HEADER_SIZE as usize] {
    let mut h = [0u8; HEADER_SIZE as usize];
    h[0..4].copy_from_slice(&LOG_MAGIC.to_le_bytes());
    h[4..8].copy_from_slice(&LOG_VERSION.to_le_bytes());
    h
}

fn record_size(value_len: usize) -> u64 {
    (RECORD_HEADER + PAYLOAD_PREFIX + value_len) as u64
}

/// len | checksum | file_id | kind | data
fn encode_record(file_id: FileId, kind: u8, data: &[u8]) -> Result<Vec<u8>> {
    let payload_len: u32 = (PAYLOAD_PREFIX + data.len()).try_into().map_err(|_| {
        IndexError::invalid_input(format!(
            "snapshot for file {} too large ({} bytes)",
            file_id,
            data.len()
        ))
    })?;
    let mut rec = Vec::with_capacity(RECORD_HEADER + payload_len as usize);
    rec.extend_from_slice(&payload_len.to_le_bytes());
    rec.extend_from_slice(&0u32.to_le_bytes()); // checksum placeholder
    rec.extend_from_slice(&file_id.to_le_bytes());
    rec.push(kind);
    rec.extend_from_slice(data);
    let crc = checksum(&rec[RECORD_HEADER..]);
    rec[4..8].copy_from_slice(&crc.to_le_bytes());
    Ok(rec)
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
}

fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[derive(Debug, Default)]
struct LogReplay {
    entries: HashMap<FileId, ByteArraySequence>,
    /// 最后一条完整记录之后的偏移
    valid_len: u64,
    file_len: u64,
    /// header 缺失/不匹配：整个文件需要重建
    reset: bool,
    records: usize,
    truncated_tail_records: usize,
}

/// 回放整个 log；回放出的值与读入的文件 buffer 共享内存（零拷贝）
fn replay_log(path: &Path) -> Result<LogReplay> {
    if !path.exists() {
        return Ok(LogReplay {
            reset: true,
            ..LogReplay::default()
        });
    }

    let data: Arc<[u8]> = Arc::from(std::fs::read(path)?);
    let mut out = LogReplay {
        file_len: data.len() as u64,
        ..LogReplay::default()
    };

    if data.len() < HEADER_SIZE as usize {
        tracing::warn!("Forward index log {:?} too small, resetting", path);
        out.reset = true;
        return Ok(out);
    }
    let magic = u32::from_le_bytes(data[0..4].try_into().map_err(IndexError::decode)?);
    let version = u32::from_le_bytes(data[4..8].try_into().map_err(IndexError::decode)?);
    if magic != LOG_MAGIC || version != LOG_VERSION {
        tracing::warn!(
            "Forward index log header mismatch ({:#x} v{}), resetting",
            magic,
            version
        );
        out.reset = true;
        return Ok(out);
    }

    let mut off = HEADER_SIZE as usize;
    loop {
        let Some(hdr) = data.get(off..off + RECORD_HEADER) else {
            if off < data.len() {
                out.truncated_tail_records += 1;
            }
            break;
        };
        let len = u32::from_le_bytes(hdr[0..4].try_into().map_err(IndexError::decode)?) as usize;
        let crc = u32::from_le_bytes(hdr[4..8].try_into().map_err(IndexError::decode)?);
        let start = off + RECORD_HEADER;
        let Some(payload) = data.get(start..start + len) else {
            out.truncated_tail_records += 1;
            break;
        };
        // 校验失败：视为截断/损坏，停止读取（保守）
        if checksum(payload) != crc || len < PAYLOAD_PREFIX {
            out.truncated_tail_records += 1;
            break;
        }
        let file_id = u32::from_le_bytes(payload[0..4].try_into().map_err(IndexError::decode)?);
        match payload[4] {
            KIND_PUT => {
                let value = ByteArraySequence::new(
                    data.clone(),
                    start + PAYLOAD_PREFIX,
                    len - PAYLOAD_PREFIX,
                )?;
                out.entries.insert(file_id, value);
            }
            KIND_REMOVE => {
                out.entries.remove(&file_id);
            }
            other => {
                tracing::warn!("Unknown record kind {} at offset {}, stopping replay", other, off);
                out.truncated_tail_records += 1;
                break;
            }
        }
        out.records += 1;
        off = start + len;
    }
    out.valid_len = off as u64;
    Ok(out)
}

struct LogState {
    /// `None` 表示已 close
    file: Option<File>,
    entries: HashMap<FileId, ByteArraySequence>,
    log_bytes: u64,
    live_value_bytes: u64,
    puts: u64,
    removes: u64,
    compactions: u64,
}

impl LogState {
    fn live_record_bytes(&self) -> u64 {
        self.entries.len() as u64 * record_size(0) + self.live_value_bytes
    }

    fn garbage_bytes(&self) -> u64 {
        self.log_bytes
            .saturating_sub(HEADER_SIZE)
            .saturating_sub(self.live_record_bytes())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(IndexError::Closed);
        }
        Ok(())
    }

    fn append(&mut self, rec: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(IndexError::Closed)?;
        if let Err(e) = file.write_all(rec) {
            // 回滚半条记录：否则 replay 会在这里停下，丢掉之后追加的所有记录
            let _ = file.set_len(self.log_bytes);
            return Err(e.into());
        }
        self.log_bytes += rec.len() as u64;
        Ok(())
    }
}

/// 追加式 log 上的 forward index
///
/// 文件布局（LE）：
/// - header：magic `FWD1` + version
/// - record：`len u32 | checksum u32 | file_id u32 | kind u8 | data`
///
/// 打开时回放整个 log 到内存；尾部不完整/校验失败的记录被截掉。
/// 覆盖写与删除留下的垃圾超过阈值时自动 compaction（临时文件 + fsync + rename）。
pub struct LogForwardIndex {
    path: PathBuf,
    options: LogOptions,
    state: RwLock<LogState>,
}

impl LogForwardIndex {
    pub fn open(path: impl Into<PathBuf>, options: LogOptions) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let replay = replay_log(&path)?;
        let log_bytes = if replay.reset {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            f.write_all(&header_bytes())?;
            f.sync_all()?;
            HEADER_SIZE
        } else {
            if replay.valid_len < replay.file_len {
                tracing::warn!(
                    "Forward index log {:?}: dropping {} torn tail bytes ({} records)",
                    path,
                    replay.file_len - replay.valid_len,
                    replay.truncated_tail_records
                );
                let f = OpenOptions::new().write(true).open(&path)?;
                f.set_len(replay.valid_len)?;
                f.sync_all()?;
            }
            replay.valid_len
        };

        let file = open_append(&path)?;
        let live_value_bytes = replay.entries.values().map(|v| v.len() as u64).sum();
        tracing::info!(
            "Opened forward index {:?}: {} entries from {} records, {} log bytes",
            path,
            replay.entries.len(),
            replay.records,
            log_bytes
        );

        Ok(Self {
            path,
            options,
            state: RwLock::new(LogState {
                file: Some(file),
                entries: replay.entries,
                log_bytes,
                live_value_bytes,
                puts: 0,
                removes: 0,
                compactions: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &LogOptions {
        &self.options
    }

    /// 只保留存活条目重写 log（原子替换）
    pub fn compact(&self) -> Result<()> {
        let mut st = self.state.write();
        self.compact_locked(&mut st)
    }

    fn should_compact(&self, st: &LogState) -> bool {
        st.log_bytes >= self.options.compaction_min_bytes
            && st.garbage_bytes() as f64 >= st.log_bytes as f64 * self.options.compaction_garbage_ratio
    }

    fn compact_locked(&self, st: &mut LogState) -> Result<()> {
        let before = st.log_bytes;
        let mut ids: Vec<FileId> = st.entries.keys().copied().collect();
        ids.sort_unstable();
        self.rewrite_locked(st, &ids)?;
        st.compactions += 1;
        tracing::info!(
            "Compacted forward index {:?}: {} -> {} bytes ({} entries)",
            self.path,
            before,
            st.log_bytes,
            st.entries.len()
        );
        Ok(())
    }

    /// 只把 `ids` 对应的条目写进新 log，再原子替换旧 log
    ///
    /// 任一步失败都返回错误，旧文件、旧句柄与内存状态保持原样。
    fn rewrite_locked(&self, st: &mut LogState, ids: &[FileId]) -> Result<()> {
        st.ensure_open()?;
        let tmp_path = self.path.with_extension("log.tmp");

        let mut fresh = HashMap::with_capacity(ids.len());
        let written = (|| -> Result<(File, u64)> {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            out.write_all(&header_bytes())?;
            let mut len = HEADER_SIZE;
            for &id in ids {
                let Some(v) = st.entries.get(&id) else {
                    continue;
                };
                let rec = encode_record(id, KIND_PUT, v.as_slice())?;
                out.write_all(&rec)?;
                len += rec.len() as u64;
                // 脱离旧 log buffer，释放其内存
                fresh.insert(id, v.detach());
            }
            let f = out.into_inner().map_err(|e| e.into_error())?;
            f.sync_all()?;
            // rename 前就拿到新句柄：rename 之后它跟着 inode 走，不存在无句柄的窗口
            Ok((open_append(&tmp_path)?, len))
        })();

        let (file, new_len) = match written {
            Ok(v) => v,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        sync_parent_dir(&self.path);

        st.file = Some(file);
        st.live_value_bytes = fresh.values().map(|v: &ByteArraySequence| v.len() as u64).sum();
        st.entries = fresh;
        st.log_bytes = new_len;
        Ok(())
    }
}

impl ForwardIndex for LogForwardIndex {
    fn get(&self, file_id: FileId) -> Result<Option<ByteArraySequence>> {
        let st = self.state.read();
        st.ensure_open()?;
        Ok(st.entries.get(&file_id).cloned())
    }

    fn put(&self, file_id: FileId, value: Option<ByteArraySequence>) -> Result<()> {
        let mut guard = self.state.write();
        let st = &mut *guard;
        st.ensure_open()?;
        match value {
            Some(v) => {
                let rec = encode_record(file_id, KIND_PUT, v.as_slice())?;
                st.append(&rec)?;
                st.live_value_bytes += v.len() as u64;
                if let Some(old) = st.entries.insert(file_id, v) {
                    st.live_value_bytes -= old.len() as u64;
                }
                st.puts += 1;
            }
            None => {
                if !st.entries.contains_key(&file_id) {
                    return Ok(());
                }
                let rec = encode_record(file_id, KIND_REMOVE, &[])?;
                st.append(&rec)?;
                if let Some(old) = st.entries.remove(&file_id) {
                    st.live_value_bytes -= old.len() as u64;
                }
                st.removes += 1;
            }
        }

        // 记录已经落盘；compaction 失败不影响本次 put 的结果
        if self.should_compact(st) {
            if let Err(e) = self.compact_locked(st) {
                tracing::warn!(
                    "Auto-compaction of {:?} failed, keeping current log: {}",
                    self.path,
                    e
                );
            }
        }
        Ok(())
    }

    fn contains_mapping(&self, file_id: FileId) -> Result<bool> {
        let st = self.state.read();
        st.ensure_open()?;
        Ok(st.entries.contains_key(&file_id))
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self.state.write();
        let st = &mut *guard;
        let dropped = st.entries.len();
        // 与 compaction 同一条路径：失败时磁盘与内存都还是 clear 之前的样子
        self.rewrite_locked(st, &[])?;
        tracing::info!("Cleared forward index {:?} ({} entries dropped)", self.path, dropped);
        Ok(())
    }

    fn force(&self) -> Result<()> {
        let mut guard = self.state.write();
        let file = guard.file.as_mut().ok_or(IndexError::Closed)?;
        file.flush()?;
        if self.options.sync_on_force {
            file.sync_all()?;
        }
        Ok(())
    }

    /// 幂等：重复 close 不报错
    fn close(&self) -> Result<()> {
        let mut st = self.state.write();
        if let Some(mut file) = st.file.take() {
            file.flush()?;
            file.sync_all()?;
            st.entries.clear();
            st.live_value_bytes = 0;
            tracing::debug!("Closed forward index {:?}", self.path);
        }
        Ok(())
    }

    fn stats(&self) -> ForwardIndexStats {
        let st = self.state.read();
        ForwardIndexStats {
            entry_count: st.entries.len(),
            live_value_bytes: st.live_value_bytes,
            live_record_bytes: st.live_record_bytes(),
            log_bytes: st.log_bytes,
            garbage_bytes: st.garbage_bytes(),
            puts: st.puts,
            removes: st.removes,
            compactions: st.compactions,
        }
    }
}
