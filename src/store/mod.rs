pub mod backend;
pub mod metadata;
pub mod types;


pub use backend::{Backend, JsonFileBackend, MemoryBackend};
pub use metadata::MetadataStore;
pub use types::{Document, FileRecord, FileType, NewRecord, RecordPatch, DEFAULT_OWNER};
