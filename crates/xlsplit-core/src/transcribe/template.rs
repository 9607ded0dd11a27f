use xlsplit_structural::{last_row, rewrite_rows, CellWrite, RowRewrite};

use crate::error::{Result, SplitError};
use crate::loader::SourceSheet;
use crate::options::ShortTemplatePolicy;
use crate::package::{Package, PackagePatch};
use crate::partition::PartRange;
use crate::progress::ProgressTracker;

use super::Transcriber;

/// Reopens the template package for every part, drops the rows the part does not need
/// and overwrites the data rows' values. Styles, row heights, column widths and every
/// other package part come through untouched because nothing else is rewritten.
///
/// Each part re-parses the template, so cost is `O(parts x template size)`.
pub struct TemplateTranscriber<'a> {
    template: &'a [u8],
    template_sheet: String,
    source: &'a SourceSheet,
    header_rows: u32,
    max_col: u32,
    policy: ShortTemplatePolicy,
    /// Overwrite the header rows too, for a template that is not the source itself.
    source_headers: bool,
}

impl<'a> TemplateTranscriber<'a> {
    pub fn new(
        template: &'a [u8],
        template_sheet: impl Into<String>,
        source: &'a SourceSheet,
        header_rows: u32,
        policy: ShortTemplatePolicy,
    ) -> Self {
        Self {
            template,
            template_sheet: template_sheet.into(),
            source,
            header_rows,
            max_col: source.extents().max_col,
            policy,
            source_headers: false,
        }
    }

    /// Take header values from the source as well; the template still supplies the styles.
    pub fn with_source_headers(mut self) -> Self {
        self.source_headers = true;
        self
    }

    fn source_row(&self, row: u32) -> Vec<CellWrite> {
        (1..=self.max_col)
            .map(|col| self.source.cell_write(row, col))
            .collect()
    }

    /// Last sheet row this part may write, after applying the short-template policy.
    fn keep_through(&self, part: &PartRange, template_rows: u32) -> Result<u32> {
        let needed = part.keep_through(self.header_rows);
        if needed <= template_rows {
            return Ok(needed);
        }
        match self.policy {
            ShortTemplatePolicy::Error => Err(SplitError::TemplateTooShort {
                part: part.number(),
                needed_rows: needed,
                template_rows,
            }),
            ShortTemplatePolicy::Truncate => {
                let kept = template_rows.max(self.header_rows);
                log::warn!(
                    "part {}: template has {template_rows} rows but {needed} are needed; \
                     dropping {} data row(s)",
                    part.number(),
                    needed - kept
                );
                Ok(kept)
            }
        }
    }
}

impl Transcriber for TemplateTranscriber<'_> {
    fn transcribe(&mut self, part: &PartRange, progress: &mut ProgressTracker<'_>) -> Result<Vec<u8>> {
        let mut package = Package::open(self.template)?;
        let sheet_path = package.sheet_path(&self.template_sheet)?.to_string();
        let xml = package.read_part(&sheet_path)?;

        let template_rows = last_row(&xml)?;
        let keep_through = self.keep_through(part, template_rows)?;
        let rows = keep_through - self.header_rows;

        let mut plan = RowRewrite::new(keep_through, self.max_col);
        if self.source_headers {
            for row in 1..=self.header_rows.min(keep_through) {
                plan.set_row(row, self.source_row(row));
            }
        }

        // Progress is measured against the rows actually written when the part is truncated.
        let written = PartRange {
            end: part.start + rows,
            ..*part
        };
        for (i, source_row) in part
            .source_rows(self.header_rows)
            .take(rows as usize)
            .enumerate()
        {
            let offset = i as u32 + 1;
            plan.set_row(self.header_rows + offset, self.source_row(source_row));
            progress.row_written(&written, offset);
        }

        let rewritten = rewrite_rows(&xml, &plan)?;
        let mut patch = PackagePatch::default();
        patch.replace(sheet_path, rewritten);
        package.drop_calc_chain(&mut patch)?;
        log::debug!(
            "part {}: kept rows 1..={keep_through} of {template_rows} template rows",
            part.number()
        );
        package.write_patched(&patch)
    }
}
