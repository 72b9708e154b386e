pub mod forward_index;
pub mod log;
pub mod memory;

pub use forward_index::ForwardIndex;
pub use log::{LogForwardIndex, LogOptions};
pub use memory::InMemoryForwardIndex;
