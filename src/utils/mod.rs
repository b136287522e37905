pub mod logging;

pub use logging::{clip, mask_credentials, truncate_text};
