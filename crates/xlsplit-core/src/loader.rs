//! Open a workbook from bytes and load the sheet being split.
//!
//! Values (shared strings, dates, rich text) come from calamine-styles; formula text,
//! style ids and layout come from one quick-xml pass over the worksheet part. Formatting
//! is only loaded on request since the template strategy never needs it.

use std::collections::HashMap;
use std::io::Cursor;

use calamine_styles::{Data, Range, Reader, Style, StyleRange, WorksheetLayout, Xlsx};
use serde::Serialize;

use xlsplit_structural::{CellWrite, ScalarValue};

use crate::comments::{parse_comments_xml, CellComment};
use crate::error::{Result, SplitError};
use crate::package::Package;
use crate::sheet_xml::{scan_sheet_xml, SheetLayout};
use crate::styles::{parse_cell_protection, Protection};

type XlsxReader<'a> = Xlsx<Cursor<&'a [u8]>>;

// Excel stores column widths with font-metric padding included.
const CALIBRI_WIDTH_PADDING: f64 = 0.83203125;
const ALT_WIDTH_PADDING: f64 = 0.7109375;
const WIDTH_TOLERANCE: f64 = 0.0005;

/// Column width as the user typed it, without the padding Excel adds on save.
pub fn strip_excel_padding(raw: f64) -> f64 {
    let frac = raw % 1.0;
    for padding in [CALIBRI_WIDTH_PADDING, ALT_WIDTH_PADDING] {
        if (frac - padding).abs() < WIDTH_TOLERANCE {
            let adjusted = raw - padding;
            if adjusted >= 0.0 {
                return (adjusted * 10000.0).round() / 10000.0;
            }
        }
    }
    (raw * 10000.0).round() / 10000.0
}

fn map_error_value(err_str: &str) -> &'static str {
    let e = err_str.to_ascii_uppercase();
    match e.as_str() {
        "DIV0" | "DIV/0" | "#DIV/0!" => "#DIV/0!",
        "NA" | "#N/A" => "#N/A",
        "VALUE" | "#VALUE!" => "#VALUE!",
        "REF" | "#REF!" => "#REF!",
        "NAME" | "#NAME?" => "#NAME?",
        "NUM" | "#NUM!" => "#NUM!",
        "NULL" | "#NULL!" => "#NULL!",
        "GETTINGDATA" | "#GETTING_DATA" => "#GETTING_DATA",
        _ => "#N/A",
    }
}

/// The stored value of a cell, or `None` for an empty one. Dates become serial numbers;
/// the cell's number format is what makes them display as dates.
pub fn scalar_value(value: &Data) -> Option<ScalarValue> {
    match value {
        Data::Empty => None,
        Data::String(s) => Some(ScalarValue::Text(s.clone())),
        Data::Float(f) => Some(ScalarValue::Number(*f)),
        Data::Int(i) => Some(ScalarValue::Number(*i as f64)),
        Data::Bool(b) => Some(ScalarValue::Bool(*b)),
        Data::DateTime(dt) => Some(ScalarValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(ScalarValue::Text(s.clone())),
        Data::RichText(rt) => Some(ScalarValue::Text(rt.plain_text())),
        Data::Error(e) => Some(ScalarValue::Error(
            map_error_value(&format!("{e:?}")).to_string(),
        )),
    }
}

/// Row/column extents of a sheet. `max_row`/`max_col` are the last row/column holding a
/// value or a formula (formatting alone does not count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetExtents {
    pub max_row: u32,
    pub max_col: u32,
}

impl SheetExtents {
    pub fn data_rows(&self, header_rows: u32) -> u32 {
        self.max_row.saturating_sub(header_rows)
    }
}

pub struct SourceWorkbook<'a> {
    package: Package<'a>,
    workbook: XlsxReader<'a>,
}

impl<'a> SourceWorkbook<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let package = Package::open(bytes)?;
        let workbook: XlsxReader<'a> = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| SplitError::MalformedWorkbook(format!("failed to parse xlsx: {e}")))?;
        Ok(Self { package, workbook })
    }

    /// Load `requested`, or the workbook's active sheet.
    pub fn load_sheet(&mut self, requested: Option<&str>) -> Result<SourceSheet> {
        let name = self.package.resolve_sheet(requested)?.to_string();
        let path = self.package.sheet_path(&name)?.to_string();
        log::debug!("loading sheet {name:?} from {path}");

        let xml = self.package.read_part(&path)?;
        let scan = scan_sheet_xml(&xml)?;
        let values = self.workbook.worksheet_range(&name).map_err(|e| {
            SplitError::MalformedWorkbook(format!("failed to read sheet {name}: {e}"))
        })?;

        let mut extents = SheetExtents {
            max_row: 0,
            max_col: 0,
        };
        if let Some((row0, col0)) = values.start() {
            for (r, c, value) in values.used_cells() {
                if matches!(value, Data::Empty) {
                    continue;
                }
                extents.max_row = extents.max_row.max(row0 + r as u32 + 1);
                extents.max_col = extents.max_col.max(col0 + c as u32 + 1);
            }
        }
        for &(row, col) in scan.formulas.keys() {
            extents.max_row = extents.max_row.max(row);
            extents.max_col = extents.max_col.max(col);
        }

        Ok(SourceSheet {
            name,
            values,
            formulas: scan.formulas,
            style_ids: scan.style_ids,
            layout: scan.layout,
            extents,
        })
    }

    /// Per-cell styles, comments and protection for the rebuild strategy.
    pub fn load_formatting(&mut self, sheet: &SourceSheet) -> Result<SheetFormatting> {
        let styles = self.workbook.worksheet_style(&sheet.name).map_err(|e| {
            SplitError::MalformedWorkbook(format!("style error for {}: {e}", sheet.name))
        })?;
        let layout = self.workbook.worksheet_layout(&sheet.name).map_err(|e| {
            SplitError::MalformedWorkbook(format!("layout error for {}: {e}", sheet.name))
        })?;
        let origin = styles.start().unwrap_or((0, 0));

        let protection = match self.package.read_part_opt("xl/styles.xml")? {
            Some(xml) => parse_cell_protection(&xml)?,
            None => Vec::new(),
        };
        let comments = match self.package.sheet_related_part(&sheet.name, "comments")? {
            Some(path) => match self.package.read_part_opt(&path)? {
                Some(xml) => parse_comments_xml(&xml)?,
                None => HashMap::new(),
            },
            None => HashMap::new(),
        };
        log::debug!(
            "loaded formatting for {:?}: {} xf protection record(s), {} comment(s)",
            sheet.name,
            protection.len(),
            comments.len()
        );

        Ok(SheetFormatting {
            styles,
            origin,
            layout,
            protection,
            comments,
        })
    }
}

/// The sheet being split. Rows and columns are 1-based.
pub struct SourceSheet {
    name: String,
    values: Range<Data>,
    formulas: HashMap<(u32, u32), String>,
    style_ids: HashMap<(u32, u32), u32>,
    layout: SheetLayout,
    extents: SheetExtents,
}

impl SourceSheet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extents(&self) -> SheetExtents {
        self.extents
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    /// Non-empty value at `(row, col)`. For formula cells this is the cached result.
    pub fn value(&self, row: u32, col: u32) -> Option<&Data> {
        if row == 0 || col == 0 {
            return None;
        }
        self.values
            .get_value((row - 1, col - 1))
            .filter(|v| !matches!(v, Data::Empty))
    }

    /// Formula text without the leading `=`.
    pub fn formula(&self, row: u32, col: u32) -> Option<&str> {
        self.formulas.get(&(row, col)).map(String::as_str)
    }

    /// `cellXfs` index of the cell (`0` when unstyled).
    pub fn style_id(&self, row: u32, col: u32) -> u32 {
        self.style_ids.get(&(row, col)).copied().unwrap_or(0)
    }

    /// What to write in place of `(row, col)` when only the value is transferred.
    pub fn cell_write(&self, row: u32, col: u32) -> CellWrite {
        let cached = self.value(row, col).and_then(scalar_value);
        match self.formula(row, col) {
            Some(text) => CellWrite::Formula {
                text: text.to_string(),
                cached,
            },
            None => cached.map_or(CellWrite::Blank, CellWrite::Value),
        }
    }
}

/// Formatting lookups for one sheet, loaded for the rebuild strategy.
pub struct SheetFormatting {
    styles: StyleRange,
    /// Offset of `styles` so lookups can use absolute positions.
    origin: (u32, u32),
    layout: WorksheetLayout,
    protection: Vec<Protection>,
    comments: HashMap<(u32, u32), CellComment>,
}

impl SheetFormatting {
    pub fn style(&self, row: u32, col: u32) -> Option<&Style> {
        let (or, oc) = self.origin;
        let (r0, c0) = (row.checked_sub(1)?, col.checked_sub(1)?);
        if r0 < or || c0 < oc {
            return None;
        }
        self.styles.get(((r0 - or) as usize, (c0 - oc) as usize))
    }

    /// Custom column width in character units, padding removed.
    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.layout
            .get_column_width(col.checked_sub(1)?)
            .filter(|cw| cw.custom_width)
            .map(|cw| strip_excel_padding(cw.width))
    }

    /// Custom row height in points.
    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.layout
            .get_row_height(row.checked_sub(1)?)
            .filter(|rh| rh.custom_height)
            .map(|rh| rh.height)
    }

    pub fn protection(&self, style_id: u32) -> Protection {
        self.protection
            .get(style_id as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn comment(&self, row: u32, col: u32) -> Option<&CellComment> {
        self.comments.get(&(row, col))
    }

    pub fn comments(&self) -> impl Iterator<Item = (&(u32, u32), &CellComment)> {
        self.comments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_excel_padding() {
        assert_eq!(strip_excel_padding(20.7109375), 20.0);
        assert_eq!(strip_excel_padding(9.83203125), 9.0);
        assert_eq!(strip_excel_padding(12.5), 12.5);
    }

    #[test]
    fn test_scalar_value() {
        assert_eq!(scalar_value(&Data::Empty), None);
        assert_eq!(
            scalar_value(&Data::Int(7)),
            Some(ScalarValue::Number(7.0))
        );
        assert_eq!(
            scalar_value(&Data::String("SKU-1".to_string())),
            Some(ScalarValue::Text("SKU-1".to_string()))
        );
        assert_eq!(scalar_value(&Data::Bool(false)), Some(ScalarValue::Bool(false)));
    }

    #[test]
    fn test_map_error_value() {
        assert_eq!(map_error_value("Div0"), "#DIV/0!");
        assert_eq!(map_error_value("NA"), "#N/A");
        assert_eq!(map_error_value("Ref"), "#REF!");
    }

    #[test]
    fn test_data_rows_saturates() {
        let extents = SheetExtents {
            max_row: 2,
            max_col: 4,
        };
        assert_eq!(extents.data_rows(2), 0);
        assert_eq!(extents.data_rows(5), 0);
        assert_eq!(extents.data_rows(1), 1);
    }
}
