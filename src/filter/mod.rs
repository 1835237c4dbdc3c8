//! Composable filter tree over committed files: construction (text
//! syntax or JSON), and the cursor that walks matches in submission
//! order.

pub mod cursor;
pub mod json;
pub mod parser;
pub mod tree;

pub use cursor::{matches, FilterCursor};
pub use tree::Filter;
