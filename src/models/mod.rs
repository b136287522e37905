pub mod catalog;
pub mod posting;

pub use catalog::{default_catalog, load_catalog};
pub use posting::{Posting, SearchTerm, SourceName};
