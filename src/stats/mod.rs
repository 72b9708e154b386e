use std::fmt;

use serde::Serialize;

/// forward index 存储统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ForwardIndexStats {
    /// 存活条目数（有快照的文件数）
    pub entry_count: usize,
    /// 存活快照字节总数（不含记录头）
    pub live_value_bytes: u64,
    /// 存活记录在 log 中占用的字节（含记录头）
    pub live_record_bytes: u64,
    /// log 文件总字节；内存实现为 0
    pub log_bytes: u64,
    /// 被覆盖/删除记录占用的字节
    pub garbage_bytes: u64,
    /// 累计 put（非 None）次数
    pub puts: u64,
    /// 累计删除次数
    pub removes: u64,
    /// 累计 compaction 次数
    pub compactions: u64,
}

impl ForwardIndexStats {
    pub fn garbage_ratio(&self) -> f64 {
        if self.log_bytes == 0 {
            return 0.0;
        }
        self.garbage_bytes as f64 / self.log_bytes as f64
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for ForwardIndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           fwd-index Storage Report               ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ entries:      {:>12}                       ║", self.entry_count)?;
        writeln!(
            f,
            "║ live values:  {:>12}                       ║",
            human_bytes(self.live_value_bytes)
        )?;
        writeln!(
            f,
            "║ live records: {:>12}                       ║",
            human_bytes(self.live_record_bytes)
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║ log size:     {:>12}                       ║",
            human_bytes(self.log_bytes)
        )?;
        writeln!(
            f,
            "║ garbage:      {:>12}  ({:>5.1}%)              ║",
            human_bytes(self.garbage_bytes),
            self.garbage_ratio() * 100.0
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ puts:         {:>12}                       ║", self.puts)?;
        writeln!(f, "║ removes:      {:>12}                       ║", self.removes)?;
        writeln!(f, "║ compactions:  {:>12}                       ║", self.compactions)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn garbage_ratio_handles_empty_log() {
        let s = ForwardIndexStats::default();
        assert_eq!(s.garbage_ratio(), 0.0);
        let s = ForwardIndexStats {
            log_bytes: 200,
            garbage_bytes: 50,
            ..Default::default()
        };
        assert!((s.garbage_ratio() - 0.25).abs() < f64::EPSILON);
        assert!(s.to_string().contains("garbage"));
    }
}
