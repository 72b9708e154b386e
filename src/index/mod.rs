pub mod accessor;
pub mod collection;
pub mod diff;
pub mod int;
pub mod map;
pub mod single_entry;
pub mod single_value;
pub mod updater;

pub use accessor::ForwardIndexAccessor;
pub use collection::{KeyCollectionDiffBuilder, KeyCollectionForwardIndexAccessor};
pub use diff::{
    BuilderState, CallbackSink, DiffOp, DiffRecorder, DiffSink, EmptyDiffBuilder,
    InputDataDiffBuilder,
};
pub use int::IntForwardIndexAccessor;
pub use map::{MapDiffBuilder, MapForwardIndexAccessor};
pub use single_entry::{InvertedIndexQuery, SingleEntryForwardIndexAccessor};
pub use single_value::SingleValueDiffBuilder;
pub use updater::{ForwardIndexUpdater, UpdateOutcome};
