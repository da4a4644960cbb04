pub mod catalog_file;
pub mod export;

pub use catalog_file::{load_catalog, read_catalog};
pub use export::{export_to_csv, export_to_writer};
