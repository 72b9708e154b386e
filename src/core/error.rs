use crate::core::FileId;

pub type Result<T> = std::result::Result<T, IndexError>;

/// forward index 的错误类型
///
/// - `Decode`：快照字节损坏或版本不匹配，本地不可恢复，上层应清空并重建。
/// - `Storage`：底层持久化 I/O 失败，原样上抛，不吞掉。
/// - `Callback`：diff 回调失败，diff 立即中止；已执行的回调不会回滚。
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("encode error: {message}")]
    Encode { message: String },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("diff callback failed: {0}")]
    Callback(anyhow::Error),

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("diff builder already used")]
    BuilderConsumed,

    #[error("forward index is closed")]
    Closed,

    #[error("operation canceled")]
    Canceled,

    #[error("file id {0} appears more than once in batch")]
    DuplicateFileId(FileId),

    #[error("invalid file id {0}")]
    InvalidFileId(FileId),

    #[error("config error: {0}")]
    Config(String),
}

impl IndexError {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode {
            message: err.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 是否意味着该文件（或整个索引）需要全量重建
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Callback(_))
    }
}

impl From<toml::de::Error> for IndexError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
