//! One targeted quick-xml pass over a worksheet part for what calamine does not expose:
//! formula text, per-cell style ids, and the sheet layout.

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use xlsplit_structural::cell_ref::parse_cell_ref;
use xlsplit_structural::xml::{attr_bool, attr_u32, attr_value};
use xlsplit_structural::{shift_formula, CellSpan};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub min: u32,
    pub max: u32,
    pub hidden: bool,
    pub outline_level: u8,
    pub collapsed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSpec {
    pub hidden: bool,
    pub outline_level: u8,
    pub collapsed: bool,
}

/// Frozen panes: `rows`/`cols` stay fixed, `top_left` is the first cell of the scrolling pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenPane {
    pub rows: u32,
    pub cols: u32,
    pub top_left: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSetup {
    pub landscape: Option<bool>,
    pub paper_size: Option<u8>,
    pub scale: Option<u16>,
    /// `(width, height)` in pages when the sheet is set to fit to page.
    pub fit_to: Option<(u16, u16)>,
    pub first_page_number: Option<u16>,
    pub over_then_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMargins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub header: f64,
    pub footer: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintOptions {
    pub gridlines: bool,
    pub headings: bool,
    pub center_horizontally: bool,
    pub center_vertically: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetLayout {
    pub columns: Vec<ColumnSpec>,
    /// Keyed by 1-based row number; only rows with explicit attributes are present.
    pub rows: BTreeMap<u32, RowSpec>,
    pub merges: Vec<CellSpan>,
    pub pane: Option<FrozenPane>,
    pub default_row_height: Option<f64>,
    /// `0xRRGGBB`.
    pub tab_color: Option<u32>,
    pub page_setup: PageSetup,
    pub margins: Option<PageMargins>,
    pub print_options: PrintOptions,
}

impl SheetLayout {
    pub fn column(&self, col: u32) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.min <= col && col <= c.max)
    }
}

/// Everything the scan pulls out of one worksheet. Positions are 1-based `(row, col)`.
#[derive(Debug, Default)]
pub struct SheetScan {
    pub formulas: HashMap<(u32, u32), String>,
    pub style_ids: HashMap<(u32, u32), u32>,
    pub layout: SheetLayout,
}

fn attr_f64(e: &BytesStart<'_>, key: &[u8]) -> Option<f64> {
    attr_value(e, key).and_then(|s| s.trim().parse().ok())
}

fn attr_u8(e: &BytesStart<'_>, key: &[u8]) -> Option<u8> {
    attr_u32(e, key).and_then(|v| u8::try_from(v).ok())
}

fn attr_u16(e: &BytesStart<'_>, key: &[u8]) -> Option<u16> {
    attr_u32(e, key).and_then(|v| u16::try_from(v).ok())
}

/// `"FFRRGGBB"` / `"RRGGBB"` → `0xRRGGBB`.
fn parse_argb(rgb: &str) -> Option<u32> {
    let hex = rgb.trim();
    let hex = if hex.len() == 8 { &hex[2..] } else { hex };
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// `t="shared"` group id of a `<f>` element, if it has one.
fn shared_index(e: &BytesStart<'_>) -> Option<u32> {
    (attr_value(e, b"t").as_deref() == Some("shared"))
        .then(|| attr_u32(e, b"si"))
        .flatten()
}

/// Shared-formula bookkeeping: masters by group id, followers waiting for expansion.
#[derive(Default)]
struct SharedFormulas {
    masters: HashMap<u32, ((u32, u32), String)>,
    followers: Vec<((u32, u32), u32)>,
}

impl SharedFormulas {
    fn expand_into(self, formulas: &mut HashMap<(u32, u32), String>) {
        for ((row, col), si) in self.followers {
            let Some(((anchor_row, anchor_col), text)) = self.masters.get(&si) else {
                continue;
            };
            let rows = i64::from(row) - i64::from(*anchor_row);
            let cols = i64::from(col) - i64::from(*anchor_col);
            formulas.insert((row, col), shift_formula(text, rows, cols));
        }
    }
}

pub fn scan_sheet_xml(xml: &str) -> Result<SheetScan> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut scan = SheetScan::default();
    let layout = &mut scan.layout;

    let mut fit_to_page = false;
    let mut fit_to = (1u16, 1u16);
    let mut current_row: u32 = 0;
    let mut current_col: u32 = 0;
    let mut current_cell: Option<(u32, u32)> = None;
    let mut in_formula = false;
    let mut formula_text = String::new();
    let mut formula_shared: Option<u32> = None;
    let mut shared = SharedFormulas::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => current_row = read_row(&e, current_row, layout),
                b"c" => {
                    current_cell = Some(cell_position(&e, current_row, &mut current_col));
                    record_style(&e, current_cell, &mut scan.style_ids);
                }
                b"f" if current_cell.is_some() => {
                    in_formula = true;
                    formula_text.clear();
                    formula_shared = shared_index(&e);
                }
                other => read_layout_element(other, &e, layout, &mut fit_to_page, &mut fit_to),
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => current_row = read_row(&e, current_row, layout),
                b"c" => {
                    let pos = cell_position(&e, current_row, &mut current_col);
                    record_style(&e, Some(pos), &mut scan.style_ids);
                }
                b"f" => {
                    if let (Some(pos), Some(si)) = (current_cell, shared_index(&e)) {
                        shared.followers.push((pos, si));
                    }
                }
                other => read_layout_element(other, &e, layout, &mut fit_to_page, &mut fit_to),
            },
            Event::Text(t) if in_formula => {
                if let Ok(text) = t.unescape() {
                    formula_text.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"f" if in_formula => {
                    in_formula = false;
                    if let Some(pos) = current_cell {
                        match (formula_text.is_empty(), formula_shared.take()) {
                            (false, Some(si)) => {
                                shared.masters.insert(si, (pos, formula_text.clone()));
                                scan.formulas.insert(pos, formula_text.clone());
                            }
                            (false, None) => {
                                scan.formulas.insert(pos, formula_text.clone());
                            }
                            (true, Some(si)) => shared.followers.push((pos, si)),
                            (true, None) => {}
                        }
                    }
                }
                b"c" => current_cell = None,
                b"row" => current_col = 0,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if fit_to_page {
        layout.page_setup.fit_to = Some(fit_to);
    }
    shared.expand_into(&mut scan.formulas);
    Ok(scan)
}

fn read_row(e: &BytesStart<'_>, previous: u32, layout: &mut SheetLayout) -> u32 {
    let number = attr_u32(e, b"r").unwrap_or(previous + 1);
    let spec = RowSpec {
        hidden: attr_bool(e, b"hidden").unwrap_or(false),
        outline_level: attr_u8(e, b"outlineLevel").unwrap_or(0),
        collapsed: attr_bool(e, b"collapsed").unwrap_or(false),
    };
    if spec != RowSpec::default() {
        layout.rows.insert(number, spec);
    }
    number
}

fn cell_position(e: &BytesStart<'_>, row: u32, col: &mut u32) -> (u32, u32) {
    let pos = attr_value(e, b"r")
        .and_then(|a1| parse_cell_ref(&a1))
        .unwrap_or((row, *col + 1));
    *col = pos.1;
    pos
}

fn record_style(e: &BytesStart<'_>, pos: Option<(u32, u32)>, out: &mut HashMap<(u32, u32), u32>) {
    if let (Some(pos), Some(style_id)) = (pos, attr_u32(e, b"s")) {
        if style_id != 0 {
            out.insert(pos, style_id);
        }
    }
}

fn read_layout_element(
    local: &[u8],
    e: &BytesStart<'_>,
    layout: &mut SheetLayout,
    fit_to_page: &mut bool,
    fit_to: &mut (u16, u16),
) {
    match local {
        b"col" => {
            let (Some(min), Some(max)) = (attr_u32(e, b"min"), attr_u32(e, b"max")) else {
                return;
            };
            layout.columns.push(ColumnSpec {
                min,
                max,
                hidden: attr_bool(e, b"hidden").unwrap_or(false),
                outline_level: attr_u8(e, b"outlineLevel").unwrap_or(0),
                collapsed: attr_bool(e, b"collapsed").unwrap_or(false),
            });
        }
        b"mergeCell" => {
            if let Some(span) = attr_value(e, b"ref").and_then(|r| CellSpan::parse(&r)) {
                layout.merges.push(span);
            }
        }
        b"pane" => {
            let state = attr_value(e, b"state").unwrap_or_default();
            if !state.to_ascii_lowercase().starts_with("frozen") {
                return;
            }
            let split = |key: &[u8]| attr_f64(e, key).map(|v| v.max(0.0) as u32).unwrap_or(0);
            layout.pane = Some(FrozenPane {
                rows: split(b"ySplit"),
                cols: split(b"xSplit"),
                top_left: attr_value(e, b"topLeftCell").and_then(|a1| parse_cell_ref(&a1)),
            });
        }
        b"sheetFormatPr" => {
            if attr_bool(e, b"customHeight").unwrap_or(false) {
                layout.default_row_height = attr_f64(e, b"defaultRowHeight");
            }
        }
        b"tabColor" => layout.tab_color = attr_value(e, b"rgb").and_then(|rgb| parse_argb(&rgb)),
        b"pageSetUpPr" => *fit_to_page = attr_bool(e, b"fitToPage").unwrap_or(false),
        b"pageSetup" => {
            let setup = &mut layout.page_setup;
            setup.landscape = attr_value(e, b"orientation").and_then(|o| match o.as_str() {
                "landscape" => Some(true),
                "portrait" => Some(false),
                _ => None,
            });
            setup.paper_size = attr_u8(e, b"paperSize");
            setup.scale = attr_u16(e, b"scale");
            if attr_bool(e, b"useFirstPageNumber").unwrap_or(false) {
                setup.first_page_number = attr_u16(e, b"firstPageNumber");
            }
            setup.over_then_down = attr_value(e, b"pageOrder").as_deref() == Some("overThenDown");
            *fit_to = (
                attr_u16(e, b"fitToWidth").unwrap_or(1),
                attr_u16(e, b"fitToHeight").unwrap_or(1),
            );
        }
        b"pageMargins" => {
            let m = |key: &[u8], default: f64| attr_f64(e, key).unwrap_or(default);
            layout.margins = Some(PageMargins {
                left: m(b"left", 0.7),
                right: m(b"right", 0.7),
                top: m(b"top", 0.75),
                bottom: m(b"bottom", 0.75),
                header: m(b"header", 0.3),
                footer: m(b"footer", 0.3),
            });
        }
        b"printOptions" => {
            let flag = |key: &[u8]| attr_bool(e, key).unwrap_or(false);
            layout.print_options = PrintOptions {
                gridlines: flag(b"gridLines"),
                headings: flag(b"headings"),
                center_horizontally: flag(b"horizontalCentered"),
                center_vertically: flag(b"verticalCentered"),
            };
        }
        _ => {}
    }
}
