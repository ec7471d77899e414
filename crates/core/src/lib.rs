pub mod optimistic;
pub mod record;

pub use optimistic::{MergeOptions, MergeOutcome, PendingMutation, merge_optimistic};
pub use record::{Record, RecordId};
