mod labels;
pub use labels::Labels;

mod constants;
pub use constants::*;

/// Poll / lifetime value in seconds, as written in configuration documents.
pub type Seconds = i64;
