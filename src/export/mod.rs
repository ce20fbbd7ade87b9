// src/export/mod.rs
pub mod columnar;
pub mod delimited;
pub mod spreadsheet;

pub use columnar::write_parquet;
pub use delimited::write_delimited_table;
pub use spreadsheet::write_spreadsheet;
