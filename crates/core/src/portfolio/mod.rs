pub mod summary;

pub use summary::{compute_summary, SummaryRow};
