use std::collections::{BTreeMap, HashMap, HashSet};

use calamine_styles::{
    Alignment, BorderStyle as CalBorderStyle, Color as CalColor, FillPattern, FontStyle,
    FontWeight, HorizontalAlignment, Style, TextRotation, UnderlineStyle, VerticalAlignment,
};
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, FormatDiagonalBorder, FormatUnderline, Formula,
    Note, Workbook, Worksheet, XlsxError,
};

use xlsplit_structural::cell_ref::MAX_COLUMN;
use xlsplit_structural::{CellSpan, ScalarValue};

use crate::comments::CellComment;
use crate::error::{Result, SplitError};
use crate::loader::{scalar_value, SheetFormatting, SourceSheet};
use crate::partition::PartRange;
use crate::progress::ProgressTracker;
use crate::sheet_xml::SheetLayout;

use super::Transcriber;

/// Excel's deepest outline level.
const MAX_OUTLINE_LEVEL: u8 = 7;

fn write_err(op: &'static str) -> impl Fn(XlsxError) -> SplitError {
    move |e| SplitError::Resource(format!("{op} failed: {e}"))
}

fn to_color(c: &CalColor) -> Color {
    Color::RGB((u32::from(c.red) << 16) | (u32::from(c.green) << 8) | u32::from(c.blue))
}

fn map_border_style(s: &CalBorderStyle) -> FormatBorder {
    match s {
        CalBorderStyle::None => FormatBorder::None,
        CalBorderStyle::Thin => FormatBorder::Thin,
        CalBorderStyle::Medium => FormatBorder::Medium,
        CalBorderStyle::Thick => FormatBorder::Thick,
        CalBorderStyle::Double => FormatBorder::Double,
        CalBorderStyle::Hair => FormatBorder::Hair,
        CalBorderStyle::Dashed => FormatBorder::Dashed,
        CalBorderStyle::Dotted => FormatBorder::Dotted,
        CalBorderStyle::MediumDashed => FormatBorder::MediumDashed,
        CalBorderStyle::DashDot => FormatBorder::DashDot,
        CalBorderStyle::DashDotDot => FormatBorder::DashDotDot,
        CalBorderStyle::SlantDashDot => FormatBorder::SlantDashDot,
    }
}

fn map_h_align(a: &HorizontalAlignment) -> Option<FormatAlign> {
    match a {
        HorizontalAlignment::General => None,
        HorizontalAlignment::Left => Some(FormatAlign::Left),
        HorizontalAlignment::Center => Some(FormatAlign::Center),
        HorizontalAlignment::Right => Some(FormatAlign::Right),
        HorizontalAlignment::Justify => Some(FormatAlign::Justify),
        HorizontalAlignment::Distributed => Some(FormatAlign::Distributed),
        HorizontalAlignment::Fill => Some(FormatAlign::Fill),
    }
}

fn map_v_align(a: &VerticalAlignment) -> Option<FormatAlign> {
    match a {
        VerticalAlignment::Bottom => None,
        VerticalAlignment::Top => Some(FormatAlign::Top),
        VerticalAlignment::Center => Some(FormatAlign::VerticalCenter),
        VerticalAlignment::Justify => Some(FormatAlign::VerticalJustify),
        VerticalAlignment::Distributed => Some(FormatAlign::VerticalDistributed),
    }
}

fn map_underline(u: &UnderlineStyle) -> Option<FormatUnderline> {
    match u {
        UnderlineStyle::None => None,
        UnderlineStyle::Single => Some(FormatUnderline::Single),
        UnderlineStyle::Double => Some(FormatUnderline::Double),
        UnderlineStyle::SingleAccounting => Some(FormatUnderline::SingleAccounting),
        UnderlineStyle::DoubleAccounting => Some(FormatUnderline::DoubleAccounting),
    }
}

/// OOXML stores downward rotation as 91..=180; the writer wants -1..=-90.
fn rotation_angle(raw: i32) -> Option<i16> {
    let angle = if (91..=180).contains(&raw) { 90 - raw } else { raw };
    i16::try_from(angle).ok().filter(|a| *a != 0)
}

fn apply_alignment(mut f: Format, align: &Alignment) -> Format {
    if let Some(h) = map_h_align(&align.horizontal) {
        f = f.set_align(h);
    }
    if let Some(v) = map_v_align(&align.vertical) {
        f = f.set_align(v);
    }
    if align.wrap_text {
        f = f.set_text_wrap();
    }
    match align.text_rotation {
        TextRotation::None => {}
        TextRotation::Degrees(deg) => {
            if let Some(angle) = i32::try_from(deg).ok().and_then(rotation_angle) {
                f = f.set_rotation(angle);
            }
        }
        TextRotation::Stacked => f = f.set_rotation(270),
    }
    if let Some(indent) = align.indent {
        if let Ok(indent) = u8::try_from(indent) {
            if indent > 0 {
                f = f.set_indent(indent);
            }
        }
    }
    f
}

/// Translate a resolved calamine style plus `cellXfs` protection into a writer format.
fn build_format(style: Option<&Style>, locked: bool, hidden: bool) -> Format {
    let mut f = Format::new();

    if let Some(style) = style {
        if let Some(font) = &style.font {
            if font.weight == FontWeight::Bold {
                f = f.set_bold();
            }
            if font.style == FontStyle::Italic {
                f = f.set_italic();
            }
            if let Some(u) = map_underline(&font.underline) {
                f = f.set_underline(u);
            }
            if font.strikethrough {
                f = f.set_font_strikethrough();
            }
            if let Some(name) = &font.name {
                f = f.set_font_name(name.as_str());
            }
            if let Some(size) = font.size {
                f = f.set_font_size(size);
            }
            if let Some(color) = &font.color {
                f = f.set_font_color(to_color(color));
            }
        }
        if let Some(fill) = &style.fill {
            if fill.pattern != FillPattern::None {
                if let Some(color) = fill.get_color() {
                    f = f.set_background_color(to_color(&color));
                }
            }
        }
        if let Some(nf) = &style.number_format {
            if nf.format_code != "General" {
                f = f.set_num_format(nf.format_code.as_str());
            }
        }
        if let Some(align) = &style.alignment {
            f = apply_alignment(f, align);
        }
        if let Some(borders) = &style.borders {
            let edge = |b: &calamine_styles::Border| {
                (b.style != CalBorderStyle::None)
                    .then(|| (map_border_style(&b.style), b.color.as_ref().map(to_color)))
            };
            if let Some((s, c)) = edge(&borders.top) {
                f = f.set_border_top(s);
                if let Some(c) = c {
                    f = f.set_border_top_color(c);
                }
            }
            if let Some((s, c)) = edge(&borders.bottom) {
                f = f.set_border_bottom(s);
                if let Some(c) = c {
                    f = f.set_border_bottom_color(c);
                }
            }
            if let Some((s, c)) = edge(&borders.left) {
                f = f.set_border_left(s);
                if let Some(c) = c {
                    f = f.set_border_left_color(c);
                }
            }
            if let Some((s, c)) = edge(&borders.right) {
                f = f.set_border_right(s);
                if let Some(c) = c {
                    f = f.set_border_right_color(c);
                }
            }

            // The writer has one diagonal style; prefer the down stroke when both exist.
            let up = edge(&borders.diagonal_up);
            let down = edge(&borders.diagonal_down);
            let diagonal_type = match (&up, &down) {
                (Some(_), Some(_)) => Some(FormatDiagonalBorder::BorderUpDown),
                (Some(_), None) => Some(FormatDiagonalBorder::BorderUp),
                (None, Some(_)) => Some(FormatDiagonalBorder::BorderDown),
                (None, None) => None,
            };
            if let (Some(kind), Some((s, c))) = (diagonal_type, down.or(up)) {
                f = f.set_border_diagonal(s).set_border_diagonal_type(kind);
                if let Some(c) = c {
                    f = f.set_border_diagonal_color(c);
                }
            }
        }
    }

    if !locked {
        f = f.set_unlocked();
    }
    if hidden {
        f = f.set_hidden();
    }
    f
}

/// Maximal runs of consecutive indices whose outline level is at least `level`, for every
/// level. Grouping each run once per level reproduces nested outlines.
fn outline_runs(levels: &BTreeMap<u32, u8>) -> Vec<(u32, u32)> {
    let deepest = levels.values().copied().max().unwrap_or(0).min(MAX_OUTLINE_LEVEL);
    let mut runs = Vec::new();
    for level in 1..=deepest {
        let mut current: Option<(u32, u32)> = None;
        for (&index, &l) in levels {
            if l < level {
                continue;
            }
            current = match current {
                Some((first, last)) if last + 1 == index => Some((first, index)),
                Some(run) => {
                    runs.push(run);
                    Some((index, index))
                }
                None => Some((index, index)),
            };
        }
        runs.extend(current);
    }
    runs
}

/// Builds each part as a fresh single-sheet workbook, copying values and every supported
/// formatting facet cell by cell. Cost is linear in the copied cells.
pub struct RebuildTranscriber<'a> {
    source: &'a SourceSheet,
    formatting: &'a SheetFormatting,
    header_rows: u32,
    max_col: u32,
    comments_by_row: BTreeMap<u32, Vec<(u32, CellComment)>>,
    formats: HashMap<u32, Format>,
}

impl<'a> RebuildTranscriber<'a> {
    pub fn new(
        source: &'a SourceSheet,
        formatting: &'a SheetFormatting,
        header_rows: u32,
        max_col_override: Option<u32>,
    ) -> Self {
        let max_col = max_col_override
            .unwrap_or(source.extents().max_col)
            .min(MAX_COLUMN);
        let mut comments_by_row: BTreeMap<u32, Vec<(u32, CellComment)>> = BTreeMap::new();
        for ((row, col), comment) in formatting.comments() {
            comments_by_row
                .entry(*row)
                .or_default()
                .push((*col, comment.clone()));
        }
        Self {
            source,
            formatting,
            header_rows,
            max_col,
            comments_by_row,
            formats: HashMap::new(),
        }
    }

    fn format_for(&mut self, row: u32, col: u32) -> Format {
        let style_id = self.source.style_id(row, col);
        if let Some(f) = self.formats.get(&style_id) {
            return f.clone();
        }
        let protection = self.formatting.protection(style_id);
        let f = build_format(
            self.formatting.style(row, col),
            protection.locked,
            protection.hidden,
        );
        self.formats.insert(style_id, f.clone());
        f
    }

    /// Copy source row `src` into output row `dst` (both 1-based).
    fn copy_row(&mut self, ws: &mut Worksheet, src: u32, dst: u32) -> Result<()> {
        let row0 = dst - 1;
        for col in 1..=self.max_col {
            let value = self.source.value(src, col).and_then(scalar_value);
            let formula = self.source.formula(src, col).map(str::to_string);
            if value.is_none() && formula.is_none() && self.source.style_id(src, col) == 0 {
                continue;
            }
            let format = self.format_for(src, col);
            write_cell(ws, row0, (col - 1) as u16, formula, value, &format)?;
        }

        if let Some(comments) = self.comments_by_row.get(&src) {
            for (col, comment) in comments {
                let mut note = Note::new(comment.text.as_str()).add_author_prefix(false);
                if let Some(author) = &comment.author {
                    note = note.set_author(author.as_str());
                }
                ws.insert_note(row0, (col - 1) as u16, &note)
                    .map_err(write_err("insert_note"))?;
            }
        }
        Ok(())
    }

    fn apply_rows(&self, ws: &mut Worksheet, rows: &[(u32, u32)]) -> Result<()> {
        let layout = self.source.layout();
        let mut levels: BTreeMap<u32, u8> = BTreeMap::new();
        let mut collapsed: HashSet<u32> = HashSet::new();
        for &(src, dst) in rows {
            let row0 = dst - 1;
            if let Some(height) = self.formatting.row_height(src) {
                ws.set_row_height(row0, height)
                    .map_err(write_err("set_row_height"))?;
            }
            if let Some(spec) = layout.rows.get(&src) {
                if spec.outline_level > 0 {
                    levels.insert(row0, spec.outline_level);
                }
                if spec.collapsed {
                    collapsed.insert(row0);
                }
            }
        }
        // A collapsed group is flagged on the summary row just below it.
        for (first, last) in outline_runs(&levels) {
            if collapsed.contains(&(last + 1)) {
                ws.group_rows_collapsed(first, last)
                    .map_err(write_err("group_rows_collapsed"))?;
            } else {
                ws.group_rows(first, last).map_err(write_err("group_rows"))?;
            }
        }
        for &(src, dst) in rows {
            if layout.rows.get(&src).is_some_and(|spec| spec.hidden) {
                ws.set_row_hidden(dst - 1).map_err(write_err("set_row_hidden"))?;
            }
        }
        Ok(())
    }

    fn apply_columns(&self, ws: &mut Worksheet) -> Result<()> {
        let layout = self.source.layout();
        let mut levels: BTreeMap<u32, u8> = BTreeMap::new();
        let mut collapsed: HashSet<u32> = HashSet::new();
        for spec in &layout.columns {
            for col in spec.min..=spec.max.min(MAX_COLUMN) {
                let col0 = (col - 1) as u16;
                if let Some(width) = self.formatting.column_width(col) {
                    ws.set_column_width(col0, width)
                        .map_err(write_err("set_column_width"))?;
                }
                if spec.outline_level > 0 {
                    levels.insert(col - 1, spec.outline_level);
                }
                if spec.collapsed {
                    collapsed.insert(col - 1);
                }
            }
        }
        for (first, last) in outline_runs(&levels) {
            let (first, last) = (first as u16, last as u16);
            if collapsed.contains(&(u32::from(last) + 1)) {
                ws.group_columns_collapsed(first, last)
                    .map_err(write_err("group_columns_collapsed"))?;
            } else {
                ws.group_columns(first, last)
                    .map_err(write_err("group_columns"))?;
            }
        }
        for spec in layout.columns.iter().filter(|s| s.hidden) {
            for col in spec.min..=spec.max.min(MAX_COLUMN) {
                ws.set_column_hidden((col - 1) as u16)
                    .map_err(write_err("set_column_hidden"))?;
            }
        }
        Ok(())
    }

    /// Merges wholly inside the header are copied; merges wholly inside this part's data
    /// rows move with them. Anything crossing the header or a part boundary is dropped.
    fn apply_merges(&mut self, ws: &mut Worksheet, part: &PartRange) -> Result<()> {
        let data_rows = part.source_rows(self.header_rows);
        let shift = -i64::from(part.start);
        let merges: Vec<CellSpan> = self.source.layout().merges.clone();
        for span in merges {
            let placed = if span.last_row <= self.header_rows {
                Some(span)
            } else if data_rows.contains(&span.first_row) && data_rows.contains(&span.last_row) {
                span.shifted_rows(shift)
            } else {
                None
            };
            let Some(target) = placed else {
                log::debug!("part {}: skipping merge {span}", part.number());
                continue;
            };
            if target.is_single_cell() || target.last_col > MAX_COLUMN {
                continue;
            }
            let format = self.format_for(span.first_row, span.first_col);
            ws.merge_range(
                target.first_row - 1,
                (target.first_col - 1) as u16,
                target.last_row - 1,
                (target.last_col - 1) as u16,
                "",
                &format,
            )
            .map_err(write_err("merge_range"))?;
        }
        Ok(())
    }
}

fn apply_sheet_layout(ws: &mut Worksheet, layout: &SheetLayout) -> Result<()> {
    if let Some(pane) = layout.pane {
        if pane.rows > 0 || pane.cols > 0 {
            ws.set_freeze_panes(pane.rows, pane.cols as u16)
                .map_err(write_err("set_freeze_panes"))?;
            if let Some((row, col)) = pane.top_left {
                if (row, col) != (pane.rows + 1, pane.cols + 1) {
                    ws.set_freeze_panes_top_cell(row - 1, (col - 1) as u16)
                        .map_err(write_err("set_freeze_panes_top_cell"))?;
                }
            }
        }
    }
    if let Some(height) = layout.default_row_height {
        ws.set_default_row_height(height);
    }
    if let Some(rgb) = layout.tab_color {
        ws.set_tab_color(Color::RGB(rgb));
    }

    let setup = &layout.page_setup;
    match setup.landscape {
        Some(true) => {
            ws.set_landscape();
        }
        Some(false) => {
            ws.set_portrait();
        }
        None => {}
    }
    if let Some(size) = setup.paper_size {
        ws.set_paper_size(size);
    }
    if let Some(scale) = setup.scale {
        ws.set_print_scale(scale);
    }
    if let Some((width, height)) = setup.fit_to {
        ws.set_print_fit_to_pages(width, height);
    }
    if let Some(first) = setup.first_page_number {
        ws.set_print_first_page_number(first);
    }
    if setup.over_then_down {
        ws.set_page_order(false);
    }
    if let Some(m) = layout.margins {
        ws.set_margins(m.left, m.right, m.top, m.bottom, m.header, m.footer);
    }

    let print = layout.print_options;
    if print.gridlines {
        ws.set_print_gridlines(true);
    }
    if print.headings {
        ws.set_print_headings(true);
    }
    if print.center_horizontally {
        ws.set_print_center_horizontally(true);
    }
    if print.center_vertically {
        ws.set_print_center_vertically(true);
    }
    Ok(())
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    formula: Option<String>,
    value: Option<ScalarValue>,
    format: &Format,
) -> Result<()> {
    if let Some(text) = formula {
        let mut formula = Formula::new(text);
        if let Some(cached) = &value {
            formula = formula.set_result(result_text(cached));
        }
        ws.write_formula_with_format(row, col, formula, format)
            .map_err(write_err("write_formula"))?;
        return Ok(());
    }

    match value {
        None => {
            ws.write_blank(row, col, format)
                .map_err(write_err("write_blank"))?;
        }
        Some(ScalarValue::Number(n)) => {
            ws.write_number_with_format(row, col, n, format)
                .map_err(write_err("write_number"))?;
        }
        Some(ScalarValue::Text(s)) => {
            ws.write_string_with_format(row, col, s, format)
                .map_err(write_err("write_string"))?;
        }
        Some(ScalarValue::Bool(b)) => {
            ws.write_boolean_with_format(row, col, b, format)
                .map_err(write_err("write_boolean"))?;
        }
        Some(ScalarValue::Error(token)) => {
            // Error literals have no writer API; an equivalent formula yields the same value.
            let source = match token.as_str() {
                "#DIV/0!" => "=1/0",
                "#N/A" => "=NA()",
                "#VALUE!" => "=\"text\"+1",
                "#REF!" => "=#REF!",
                "#NAME?" => "=#NAME?",
                "#NUM!" => "=#NUM!",
                "#NULL!" => "=#NULL!",
                _ => "=NA()",
            };
            let formula = Formula::new(source).set_result(token);
            ws.write_formula_with_format(row, col, formula, format)
                .map_err(write_err("write_formula"))?;
        }
    }
    Ok(())
}

fn result_text(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Number(n) => n.to_string(),
        ScalarValue::Text(s) | ScalarValue::Error(s) => s.clone(),
        ScalarValue::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
    }
}

impl Transcriber for RebuildTranscriber<'_> {
    fn transcribe(&mut self, part: &PartRange, progress: &mut ProgressTracker<'_>) -> Result<Vec<u8>> {
        let mut ws = Worksheet::new();
        ws.set_name(self.source.name())
            .map_err(|e| SplitError::Resource(format!("invalid sheet name: {e}")))?;

        apply_sheet_layout(&mut ws, self.source.layout())?;
        self.apply_columns(&mut ws)?;

        let mut rows: Vec<(u32, u32)> = (1..=self.header_rows).map(|r| (r, r)).collect();
        rows.extend(
            part.source_rows(self.header_rows)
                .enumerate()
                .map(|(i, src)| (src, self.header_rows + 1 + i as u32)),
        );
        self.apply_rows(&mut ws, &rows)?;
        self.apply_merges(&mut ws, part)?;

        for &(src, dst) in &rows[..self.header_rows as usize] {
            self.copy_row(&mut ws, src, dst)?;
        }
        for (i, &(src, dst)) in rows[self.header_rows as usize..].iter().enumerate() {
            self.copy_row(&mut ws, src, dst)?;
            progress.row_written(part, i as u32 + 1);
        }

        let mut workbook = Workbook::new();
        workbook.push_worksheet(ws);
        workbook
            .save_to_buffer()
            .map_err(|e| SplitError::Resource(format!("failed to serialize part {}: {e}", part.number())))
    }
}
