pub mod batch;
pub mod dedup;
pub mod text_change;

pub use batch::{BatchRecognizer, RecognitionOutcome};
pub use dedup::Deduplicator;
pub use text_change::{TextChange, TextChangeTracker, change_ratio, normalized_text};
