//! The split pipeline: load the sheet, plan the parts, transcribe each one into the
//! archive in order.

use serde::Serialize;

use crate::archive::{part_file_name, ArchiveWriter};
use crate::error::{Result, SplitError};
use crate::loader::{SheetExtents, SourceWorkbook};
use crate::options::{SplitOptions, Strategy};
use crate::package::Package;
use crate::partition::{partition, PartRange};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::transcribe::{RebuildTranscriber, TemplateTranscriber, Transcriber};

/// A finished split: the zip bytes plus the entry names in archive order.
#[derive(Debug)]
pub struct SplitOutcome {
    pub archive: Vec<u8>,
    pub parts: usize,
    pub entries: Vec<String>,
}

/// What a split would produce, without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct SplitPlan {
    pub sheet: String,
    pub extents: SheetExtents,
    pub header_rows: u32,
    pub chunk_size: u32,
    pub data_rows: u32,
    pub parts: Vec<PlannedPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPart {
    pub file_name: String,
    /// First and last source rows (1-based, inclusive).
    pub first_row: u32,
    pub last_row: u32,
    pub rows: u32,
}

fn plan_parts(extents: SheetExtents, options: &SplitOptions) -> Result<Vec<PartRange>> {
    let data_rows = extents.data_rows(options.header_rows);
    if data_rows == 0 {
        return Err(SplitError::NoDataRows {
            header_rows: options.header_rows,
            max_row: extents.max_row,
        });
    }
    partition(data_rows, options.chunk_size)
}

/// Resolve the sheet and the part boundaries for `bytes`.
pub fn plan_split(bytes: &[u8], options: &SplitOptions) -> Result<SplitPlan> {
    options.validate()?;
    let mut workbook = SourceWorkbook::open(bytes)?;
    let sheet = workbook.load_sheet(options.sheet())?;
    let extents = sheet.extents();
    let ranges = plan_parts(extents, options)?;
    let total = ranges.len();
    let parts = ranges
        .iter()
        .map(|p| {
            let rows = p.source_rows(options.header_rows);
            PlannedPart {
                file_name: part_file_name(p.number(), total),
                first_row: *rows.start(),
                last_row: *rows.end(),
                rows: p.len(),
            }
        })
        .collect();
    Ok(SplitPlan {
        sheet: sheet.name().to_string(),
        extents,
        header_rows: options.header_rows,
        chunk_size: options.chunk_size,
        data_rows: extents.data_rows(options.header_rows),
        parts,
    })
}

/// Split `bytes` into a zip of parts. The template strategy reuses `bytes` as its template.
pub fn split_workbook(
    bytes: &[u8],
    options: &SplitOptions,
    progress: Option<&mut dyn ProgressSink>,
) -> Result<SplitOutcome> {
    split_workbook_with_template(bytes, bytes, options, progress)
}

/// Like [`split_workbook`], but the template strategy trims `template` instead of the
/// source. `template` is ignored by the rebuild strategy.
pub fn split_workbook_with_template(
    source: &[u8],
    template: &[u8],
    options: &SplitOptions,
    progress: Option<&mut dyn ProgressSink>,
) -> Result<SplitOutcome> {
    options.validate()?;
    let mut workbook = SourceWorkbook::open(source)?;
    let sheet = workbook.load_sheet(options.sheet())?;
    let extents = sheet.extents();
    let parts = plan_parts(extents, options)?;
    let header_rows = options.header_rows;

    log::info!(
        "splitting {:?}: {} data row(s) into {} part(s) of up to {} ({:?} strategy)",
        sheet.name(),
        extents.data_rows(header_rows),
        parts.len(),
        options.chunk_size,
        options.strategy
    );

    let formatting;
    let mut transcriber: Box<dyn Transcriber + '_> = match options.strategy {
        Strategy::Template => {
            if std::ptr::eq(source, template) {
                Box::new(TemplateTranscriber::new(
                    template,
                    sheet.name(),
                    &sheet,
                    header_rows,
                    options.short_template,
                ))
            } else {
                let template_sheet = template_sheet_name(template, sheet.name())?;
                Box::new(
                    TemplateTranscriber::new(
                        template,
                        template_sheet,
                        &sheet,
                        header_rows,
                        options.short_template,
                    )
                    .with_source_headers(),
                )
            }
        }
        Strategy::Rebuild => {
            if !std::ptr::eq(source, template) {
                log::debug!("rebuild strategy ignores the supplied template");
            }
            formatting = workbook.load_formatting(&sheet)?;
            Box::new(RebuildTranscriber::new(
                &sheet,
                &formatting,
                header_rows,
                options.max_col_override,
            ))
        }
    };

    let mut tracker = ProgressTracker::new(progress, parts.len());
    let mut archive = ArchiveWriter::new();
    for part in &parts {
        let bytes = transcriber.transcribe(part, &mut tracker)?;
        let name = part_file_name(part.number(), parts.len());
        archive.add(&name, &bytes)?;
        log::debug!("wrote {name} ({} row(s), {} bytes)", part.len(), bytes.len());
        drop(bytes);
        tracker.part_finished(part);
    }

    let (archive, entries) = archive.finish()?;
    log::info!("created {} file(s), archive is {} bytes", entries.len(), archive.len());
    Ok(SplitOutcome {
        archive,
        parts: parts.len(),
        entries,
    })
}

/// The template's sheet with the source sheet's name, or the one it opens on.
fn template_sheet_name(template: &[u8], source_sheet: &str) -> Result<String> {
    let package = Package::open(template)?;
    match package.resolve_sheet(Some(source_sheet)) {
        Ok(name) => Ok(name.to_string()),
        Err(SplitError::SheetNotFound(_)) => {
            let name = package.resolve_sheet(None)?;
            log::warn!("template has no sheet {source_sheet:?}; using {name:?}");
            Ok(name.to_string())
        }
        Err(e) => Err(e),
    }
}
