pub mod disk;
pub mod format;
pub mod handler;
pub mod types;
pub mod view;

pub use disk::{StorageLayout, UPLOADS_DIR};
pub use handler::{create_router, AppState};
pub use view::View;
