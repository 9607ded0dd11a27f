//! Per-part workbook production. Both strategies turn one [`PartRange`] into the bytes of
//! a complete `.xlsx`: header rows first, then the part's data rows renumbered from
//! `header_rows + 1`.

mod rebuild;
mod template;

pub use rebuild::RebuildTranscriber;
pub use template::TemplateTranscriber;

use crate::error::Result;
use crate::partition::PartRange;
use crate::progress::ProgressTracker;

pub trait Transcriber {
    /// Produce the workbook for `part`, ticking `progress` once per data row written.
    fn transcribe(&mut self, part: &PartRange, progress: &mut ProgressTracker<'_>) -> Result<Vec<u8>>;
}
