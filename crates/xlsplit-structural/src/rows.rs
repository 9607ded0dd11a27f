//! Trim trailing rows from a worksheet and overwrite cell values in the rows that remain.
//!
//! The rewrite is a single streaming pass over `CT_Worksheet`. Rows above the keep line
//! pass through untouched unless the plan names them; planned rows have their cells in
//! `1..=last_col` replaced, each keeping the `s` (style index) of the cell it replaces.
//! Cells beyond `last_col` are preserved as-is.

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};

use crate::cell_ref::{cell_ref, parse_cell_ref, CellSpan};
use crate::error::StructuralError;
use crate::xml::{attr_u32, attr_value, prefix_of, with_attr};

/// A typed cell value as it is stored in sheet XML.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

/// What to put into one planned cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellWrite {
    /// Clear the value; an existing cell keeps its style index.
    Blank,
    Value(ScalarValue),
    /// Formula text without the leading `=`, plus the cached result if one is known.
    Formula {
        text: String,
        cached: Option<ScalarValue>,
    },
}

/// Row plan for [`rewrite_rows`]. Row numbers are 1-based sheet rows.
#[derive(Debug, Clone)]
pub struct RowRewrite {
    keep_through: u32,
    last_col: u32,
    rows: BTreeMap<u32, Vec<CellWrite>>,
}

impl RowRewrite {
    /// Keep rows `1..=keep_through`; planned rows are written across `1..=last_col`.
    pub fn new(keep_through: u32, last_col: u32) -> Self {
        Self {
            keep_through,
            last_col,
            rows: BTreeMap::new(),
        }
    }

    /// Plan `row`'s values. `cells[i]` lands in column `i + 1`; columns the vector does
    /// not reach are blanked. Rows past the keep line are ignored.
    pub fn set_row(&mut self, row: u32, cells: Vec<CellWrite>) {
        if row >= 1 && row <= self.keep_through {
            self.rows.insert(row, cells);
        }
    }

    fn last_planned_row(&self) -> u32 {
        self.rows.keys().next_back().copied().unwrap_or(0)
    }

    fn cell(&self, row: u32, col: u32) -> &CellWrite {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get((col - 1) as usize))
            .unwrap_or(&CellWrite::Blank)
    }
}

/// Highest row number present in `<sheetData>` (formatted empty rows included), or `0`.
pub fn last_row(xml: &str) -> Result<u32, StructuralError> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut in_sheet_data = false;
    let mut current: u32 = 0;
    let mut max_row: u32 = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = true,
                b"row" if in_sheet_data => {
                    current = attr_u32(&e, b"r").unwrap_or(current + 1);
                    max_row = max_row.max(current);
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(max_row)
}

/// Apply `plan` to worksheet `xml`, returning the rewritten document.
///
/// Besides the row work this keeps the sheet self-consistent: `<dimension>` is narrowed to
/// the new extent, and merged ranges below the keep line are dropped (or clipped when
/// they straddle it).
pub fn rewrite_rows(xml: &str, plan: &RowRewrite) -> Result<String, StructuralError> {
    let template_last = last_row(xml)?;
    let final_last_row = template_last
        .min(plan.keep_through)
        .max(plan.last_planned_row());

    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf: Vec<u8> = Vec::new();
    let mut state = Rewriter::new(plan, final_last_row);

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if matches!(event, Event::Eof) {
            break;
        }
        state.handle(event.into_owned(), &mut writer)?;
        buf.clear();
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tag {
    SheetData,
    Row,
    Cell,
    Dimension,
    MergeCells,
    MergeCell,
    Other,
}

impl Tag {
    fn of(local: &[u8]) -> Self {
        match local {
            b"sheetData" => Tag::SheetData,
            b"row" => Tag::Row,
            b"c" => Tag::Cell,
            b"dimension" => Tag::Dimension,
            b"mergeCells" => Tag::MergeCells,
            b"mergeCell" => Tag::MergeCell,
            _ => Tag::Other,
        }
    }
}

struct CapturedCell {
    col: u32,
    style: Option<String>,
    events: Vec<Event<'static>>,
}

struct PendingRow {
    number: u32,
    start: BytesStart<'static>,
    cells: Vec<CapturedCell>,
    extras: Vec<Event<'static>>,
    capture: Option<(CapturedCell, usize)>,
    last_col: u32,
}

struct MergeBuffer {
    start: BytesStart<'static>,
    prefix: String,
    kept: Vec<String>,
}

struct Rewriter<'p> {
    plan: &'p RowRewrite,
    final_last_row: u32,
    /// Element prefix used for synthesized rows/cells (`""` or e.g. `"x:"`).
    prefix: String,
    in_sheet_data: bool,
    skip_depth: usize,
    last_row_seen: u32,
    next_planned: u32,
    row: Option<PendingRow>,
    merges: Option<MergeBuffer>,
}

type XmlOut = XmlWriter<Vec<u8>>;

impl<'p> Rewriter<'p> {
    fn new(plan: &'p RowRewrite, final_last_row: u32) -> Self {
        Self {
            plan,
            final_last_row,
            prefix: String::new(),
            in_sheet_data: false,
            skip_depth: 0,
            last_row_seen: 0,
            next_planned: 1,
            row: None,
            merges: None,
        }
    }

    fn handle(&mut self, event: Event<'static>, w: &mut XmlOut) -> Result<(), StructuralError> {
        if self.skip_depth > 0 {
            match event {
                Event::Start(_) => self.skip_depth += 1,
                Event::End(_) => self.skip_depth -= 1,
                _ => {}
            }
            return Ok(());
        }
        if self.row.is_some() {
            return self.handle_in_row(event, w);
        }
        if self.merges.is_some() {
            return self.handle_in_merges(event, w);
        }

        match event {
            Event::Start(e) => match Tag::of(e.local_name().as_ref()) {
                Tag::SheetData => {
                    self.enter_sheet_data(&e);
                    w.write_event(Event::Start(e))?;
                }
                Tag::Row if self.in_sheet_data => self.open_row(e, false, w)?,
                Tag::Dimension => w.write_event(Event::Start(self.rewrite_dimension(e)))?,
                Tag::MergeCells => {
                    let prefix = prefix_of(e.name().as_ref(), b"mergeCells");
                    self.merges = Some(MergeBuffer {
                        start: e,
                        prefix,
                        kept: Vec::new(),
                    });
                }
                _ => w.write_event(Event::Start(e))?,
            },
            Event::Empty(e) => match Tag::of(e.local_name().as_ref()) {
                Tag::SheetData => {
                    self.enter_sheet_data(&e);
                    if self.plan.rows.is_empty() {
                        w.write_event(Event::Empty(e))?;
                    } else {
                        let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                        w.write_event(Event::Start(e))?;
                        self.flush_planned(self.plan.keep_through + 1, w)?;
                        w.write_event(Event::End(end))?;
                    }
                    self.in_sheet_data = false;
                }
                Tag::Row if self.in_sheet_data => self.open_row(e, true, w)?,
                Tag::Dimension => w.write_event(Event::Empty(self.rewrite_dimension(e)))?,
                Tag::MergeCells => {}
                _ => w.write_event(Event::Empty(e))?,
            },
            Event::End(e) => {
                if Tag::of(e.local_name().as_ref()) == Tag::SheetData {
                    self.flush_planned(self.plan.keep_through + 1, w)?;
                    self.in_sheet_data = false;
                }
                w.write_event(Event::End(e))?;
            }
            other => w.write_event(other)?,
        }
        Ok(())
    }

    fn enter_sheet_data(&mut self, e: &BytesStart<'_>) {
        self.in_sheet_data = true;
        self.prefix = prefix_of(e.name().as_ref(), b"sheetData");
    }

    fn open_row(
        &mut self,
        e: BytesStart<'static>,
        empty: bool,
        w: &mut XmlOut,
    ) -> Result<(), StructuralError> {
        let number = attr_u32(&e, b"r").unwrap_or(self.last_row_seen + 1);
        self.last_row_seen = number;

        if number > self.plan.keep_through {
            if !empty {
                self.skip_depth = 1;
            }
            return Ok(());
        }

        self.flush_planned(number, w)?;
        self.next_planned = self.next_planned.max(number + 1);

        if !self.plan.rows.contains_key(&number) {
            if empty {
                w.write_event(Event::Empty(e))?;
            } else {
                w.write_event(Event::Start(e))?;
            }
            return Ok(());
        }

        if empty {
            let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            w.write_event(Event::Start(e))?;
            self.write_planned_cells(number, Vec::new(), w)?;
            w.write_event(Event::End(end))?;
        } else {
            self.row = Some(PendingRow {
                number,
                start: e,
                cells: Vec::new(),
                extras: Vec::new(),
                capture: None,
                last_col: 0,
            });
        }
        Ok(())
    }

    fn handle_in_row(&mut self, event: Event<'static>, w: &mut XmlOut) -> Result<(), StructuralError> {
        let Some(mut row) = self.row.take() else {
            return Ok(());
        };

        if let Some((mut cell, depth)) = row.capture.take() {
            let depth = match &event {
                Event::Start(_) => depth + 1,
                Event::End(_) => depth - 1,
                _ => depth,
            };
            cell.events.push(event);
            if depth == 0 {
                row.cells.push(cell);
            } else {
                row.capture = Some((cell, depth));
            }
            self.row = Some(row);
            return Ok(());
        }

        match event {
            Event::Start(e) if Tag::of(e.local_name().as_ref()) == Tag::Cell => {
                let cell = Self::capture_cell(&mut row, e, true)?;
                row.capture = Some((cell, 1));
            }
            Event::Empty(e) if Tag::of(e.local_name().as_ref()) == Tag::Cell => {
                let cell = Self::capture_cell(&mut row, e, false)?;
                row.cells.push(cell);
            }
            Event::End(e) if Tag::of(e.local_name().as_ref()) == Tag::Row => {
                let number = row.number;
                w.write_event(Event::Start(row.start))?;
                self.write_planned_cells(number, row.cells, w)?;
                for extra in row.extras {
                    w.write_event(extra)?;
                }
                w.write_event(Event::End(e))?;
                return Ok(());
            }
            Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => {}
            other => row.extras.push(other),
        }
        self.row = Some(row);
        Ok(())
    }

    fn capture_cell(
        row: &mut PendingRow,
        e: BytesStart<'static>,
        open: bool,
    ) -> Result<CapturedCell, StructuralError> {
        let col = match attr_value(&e, b"r") {
            Some(a1) => parse_cell_ref(&a1)
                .map(|(_, col)| col)
                .ok_or(StructuralError::BadReference(a1))?,
            None => row.last_col + 1,
        };
        row.last_col = col;
        let style = attr_value(&e, b"s");
        let event = if open { Event::Start(e) } else { Event::Empty(e) };
        Ok(CapturedCell {
            col,
            style,
            events: vec![event],
        })
    }

    /// Emit synthesized rows for planned row numbers below `before` that the template lacks.
    fn flush_planned(&mut self, before: u32, w: &mut XmlOut) -> Result<(), StructuralError> {
        if before <= self.next_planned {
            return Ok(());
        }
        let pending: Vec<u32> = self
            .plan
            .rows
            .range(self.next_planned..before)
            .map(|(row, _)| *row)
            .collect();
        for number in pending {
            let name = format!("{}row", self.prefix);
            let mut start = BytesStart::new(name.clone());
            start.push_attribute(("r", number.to_string().as_str()));
            w.write_event(Event::Start(start))?;
            self.write_planned_cells(number, Vec::new(), w)?;
            w.write_event(Event::End(BytesEnd::new(name)))?;
        }
        self.next_planned = before;
        Ok(())
    }

    fn write_planned_cells(
        &self,
        row: u32,
        existing: Vec<CapturedCell>,
        w: &mut XmlOut,
    ) -> Result<(), StructuralError> {
        let mut by_col: BTreeMap<u32, CapturedCell> = BTreeMap::new();
        for cell in existing {
            by_col.insert(cell.col, cell);
        }

        for col in 1..=self.plan.last_col {
            let previous = by_col.remove(&col);
            let write = self.plan.cell(row, col);
            if previous.is_none() && *write == CellWrite::Blank {
                continue;
            }
            let style = previous.as_ref().and_then(|c| c.style.as_deref());
            write_cell(w, &self.prefix, row, col, style, write)?;
        }

        for (_, cell) in by_col {
            for event in cell.events {
                w.write_event(event)?;
            }
        }
        Ok(())
    }

    fn rewrite_dimension(&self, e: BytesStart<'static>) -> BytesStart<'static> {
        if self.final_last_row == 0 {
            return e;
        }
        let Some(span) = attr_value(&e, b"ref").and_then(|r| CellSpan::parse(&r)) else {
            return e;
        };
        let narrowed = CellSpan {
            first_row: span.first_row.min(self.final_last_row),
            first_col: span.first_col,
            last_row: self.final_last_row,
            last_col: span.last_col.max(self.plan.last_col),
        };
        with_attr(&e, "ref", &narrowed.to_string())
    }

    fn handle_in_merges(&mut self, event: Event<'static>, w: &mut XmlOut) -> Result<(), StructuralError> {
        let Some(mut merges) = self.merges.take() else {
            return Ok(());
        };
        match event {
            Event::Start(e) | Event::Empty(e) if Tag::of(e.local_name().as_ref()) == Tag::MergeCell => {
                if let Some(span) = attr_value(&e, b"ref").and_then(|r| CellSpan::parse(&r)) {
                    if let Some(kept) = self.clip_merge(span) {
                        merges.kept.push(kept.to_string());
                    }
                }
            }
            Event::End(e) if Tag::of(e.local_name().as_ref()) == Tag::MergeCells => {
                if !merges.kept.is_empty() {
                    let count = merges.kept.len().to_string();
                    let start = with_attr(&merges.start, "count", &count);
                    let child = format!("{}mergeCell", merges.prefix);
                    w.write_event(Event::Start(start))?;
                    for range in &merges.kept {
                        let mut cell = BytesStart::new(child.as_str());
                        cell.push_attribute(("ref", range.as_str()));
                        w.write_event(Event::Empty(cell))?;
                    }
                    w.write_event(Event::End(e))?;
                }
                return Ok(());
            }
            _ => {}
        }
        self.merges = Some(merges);
        Ok(())
    }

    fn clip_merge(&self, span: CellSpan) -> Option<CellSpan> {
        let keep = self.plan.keep_through;
        if span.first_row > keep {
            return None;
        }
        let clipped = CellSpan {
            last_row: span.last_row.min(keep),
            ..span
        };
        (!clipped.is_single_cell()).then_some(clipped)
    }
}

fn write_cell(
    w: &mut XmlOut,
    prefix: &str,
    row: u32,
    col: u32,
    style: Option<&str>,
    cell: &CellWrite,
) -> std::io::Result<()> {
    let name = format!("{prefix}c");
    let reference = cell_ref(row, col);
    let mut start = BytesStart::new(name.as_str());
    start.push_attribute(("r", reference.as_str()));
    if let Some(s) = style {
        start.push_attribute(("s", s));
    }

    match cell {
        CellWrite::Blank => w.write_event(Event::Empty(start)),
        CellWrite::Value(value) => {
            let cell_type = match value {
                ScalarValue::Number(_) => None,
                ScalarValue::Text(_) => Some("inlineStr"),
                ScalarValue::Bool(_) => Some("b"),
                ScalarValue::Error(_) => Some("e"),
            };
            if let Some(t) = cell_type {
                start.push_attribute(("t", t));
            }
            w.write_event(Event::Start(start))?;
            match value {
                ScalarValue::Text(text) => {
                    w.write_event(Event::Start(BytesStart::new(format!("{prefix}is"))))?;
                    write_text_element(w, &format!("{prefix}t"), text)?;
                    w.write_event(Event::End(BytesEnd::new(format!("{prefix}is"))))?;
                }
                other => write_text_element(w, &format!("{prefix}v"), &raw_value(other))?,
            }
            w.write_event(Event::End(BytesEnd::new(name.as_str())))
        }
        CellWrite::Formula { text, cached } => {
            let result_type = match cached {
                Some(ScalarValue::Text(_)) => Some("str"),
                Some(ScalarValue::Bool(_)) => Some("b"),
                Some(ScalarValue::Error(_)) => Some("e"),
                Some(ScalarValue::Number(_)) | None => None,
            };
            if let Some(t) = result_type {
                start.push_attribute(("t", t));
            }
            w.write_event(Event::Start(start))?;
            write_text_element(w, &format!("{prefix}f"), text)?;
            if let Some(value) = cached {
                write_text_element(w, &format!("{prefix}v"), &raw_value(value))?;
            }
            w.write_event(Event::End(BytesEnd::new(name.as_str())))
        }
    }
}

fn write_text_element(w: &mut XmlOut, name: &str, text: &str) -> std::io::Result<()> {
    let mut start = BytesStart::new(name);
    if text.trim() != text {
        start.push_attribute(("xml:space", "preserve"));
    }
    w.write_event(Event::Start(start))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))
}

fn raw_value(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Number(n) => n.to_string(),
        ScalarValue::Text(s) | ScalarValue::Error(s) => s.clone(),
        ScalarValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
    }
}
