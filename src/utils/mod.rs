pub mod logging;
pub mod naming;

pub use naming::{chapter_display_name, sanitize_filename, truncate_text};
