pub mod filter;
pub mod join;
pub mod project;

pub use filter::retain_in;
pub use join::{left_join, KeyKind};
pub use project::{project, resolve_columns};
