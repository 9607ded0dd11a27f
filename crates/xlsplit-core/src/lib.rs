//! Split one worksheet of an xlsx workbook into parts of at most `chunk_size` data rows.
//! Every part repeats the sheet's header rows and is named `part_<i>_of_<n>.xlsx` inside
//! a single zip archive.
//!
//! Two strategies produce the parts:
//! * [`Strategy::Template`] reopens the package per part and trims it, so every package
//!   part other than the sheet's rows is carried over byte for byte.
//! * [`Strategy::Rebuild`] writes a fresh workbook per part with rust_xlsxwriter and
//!   copies values, formatting and sheet layout cell by cell.

pub mod archive;
pub mod comments;
mod error;
pub mod loader;
mod ooxml_util;
pub mod options;
pub mod package;
pub mod partition;
pub mod progress;
pub mod sheet_xml;
mod split;
pub mod styles;
pub mod transcribe;

pub use archive::{assemble, part_file_name};
pub use error::{Result, SplitError};
pub use loader::{SheetExtents, SourceSheet, SourceWorkbook};
pub use options::{ShortTemplatePolicy, SplitOptions, Strategy, DEFAULT_CHUNK_SIZE, DEFAULT_HEADER_ROWS};
pub use partition::{part_count, partition, PartRange};
pub use progress::{ProgressEvent, ProgressSink, ProgressTracker, REPORT_EVERY};
pub use split::{
    plan_split, split_workbook, split_workbook_with_template, PlannedPart, SplitOutcome, SplitPlan,
};
