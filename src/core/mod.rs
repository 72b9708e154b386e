pub mod bytes;
pub mod cancel;
pub mod config;
pub mod error;
pub mod externalizer;
pub mod scratch;

use std::collections::HashMap;

/// 文件的稳定索引身份；0 保留为无效值
pub type FileId = u32;

/// 一次索引过程中为单个文件新提取出的 key → value（瞬态）
pub type InputData<K, V> = HashMap<K, V>;

pub use bytes::ByteArraySequence;
pub use cancel::CancelToken;
pub use config::ForwardIndexConfig;
pub use error::{IndexError, Result};
pub use externalizer::*;
pub use scratch::{ScratchBuffer, ScratchPool};
