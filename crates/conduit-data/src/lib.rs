pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, LoadedData, build_registry, load_dir};
