mod loader;
mod types;

pub use loader::{load_document, parse_document};
pub use types::*;
