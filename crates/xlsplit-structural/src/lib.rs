//! Streaming rewrites of SpreadsheetML parts.
//!
//! Everything here works on raw XML strings so a caller can patch a worksheet inside a
//! package without round-tripping the workbook through a writer library. Style indices,
//! row attributes and unknown elements pass through unchanged.

pub mod cell_ref;
mod error;
mod formula;
mod rows;
mod strip;
pub mod xml;

pub use cell_ref::CellSpan;
pub use error::StructuralError;
pub use formula::shift_formula;
pub use rows::{last_row, rewrite_rows, CellWrite, RowRewrite, ScalarValue};
pub use strip::strip_elements;
