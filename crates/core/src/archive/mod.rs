//! Archive builder: one zip entry per staged payload.

mod builder;
mod naming;

pub use builder::{ArchiveBuilder, ArchiveCompression, ArchiveError, ArchiveSummary};
pub use naming::{assign_entry_names, sanitize_file_name};
