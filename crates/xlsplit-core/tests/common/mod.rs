#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read};

use calamine_styles::{Data, Range, Reader, StyleRange, Xlsx};
use quick_xml::events::Event;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet};
use xlsplit_core::package::{Package, PackagePatch};
use zip::ZipArchive;

pub const SHEET: &str = "Orders";
pub const AMOUNT_FORMAT: &str = "#,##0.000";

/// Two header rows (a merged title and column names) above `data_rows` order lines.
/// Data line `i` sits on sheet row `i + 2` as `SKU-i | i | i * 1.5 | =B<row>*2`.
pub fn orders_workbook(data_rows: u32) -> Vec<u8> {
    orders_workbook_with(data_rows, "Quarterly orders", |_| {})
}

/// [`orders_workbook`] with a custom title, plus `extra` applied to the sheet last.
pub fn orders_workbook_with(
    data_rows: u32,
    title_text: &str,
    extra: impl FnOnce(&mut Worksheet),
) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name(SHEET).unwrap();

    let title = Format::new().set_bold().set_font_size(14);
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2))
        .set_border(FormatBorder::Thin);
    let amount = Format::new().set_num_format(AMOUNT_FORMAT);

    ws.merge_range(0, 0, 0, 3, title_text, &title).unwrap();
    for (col, name) in ["SKU", "Qty", "Amount", "Double"].into_iter().enumerate() {
        ws.write_string_with_format(1, col as u16, name, &header)
            .unwrap();
    }
    ws.set_column_width(0, 18).unwrap();
    ws.set_freeze_panes(2, 0).unwrap();

    for i in 1..=data_rows {
        let row = i + 1;
        ws.write_string(row, 0, format!("SKU-{i}")).unwrap();
        ws.write_number(row, 1, f64::from(i)).unwrap();
        ws.write_number_with_format(row, 2, f64::from(i) * 1.5, &amount)
            .unwrap();
        ws.write_formula(row, 3, format!("=B{}*2", row + 1).as_str())
            .unwrap();
    }
    extra(ws);
    workbook.save_to_buffer().unwrap()
}

/// Rewrite column D's per-row formulas as one shared formula anchored on `D3`, the way
/// spreadsheet apps store a filled-down formula.
pub fn with_shared_formulas(bytes: &[u8], data_rows: u32) -> Vec<u8> {
    let mut package = Package::open(bytes).unwrap();
    let path = package.sheet_path(SHEET).unwrap().to_string();
    let mut xml = package.read_part(&path).unwrap();
    let last = data_rows + 2;
    for row in 3..=last {
        let plain = format!("<f>B{row}*2</f>");
        assert!(xml.contains(&plain), "fixture lacks {plain}");
        let shared = if row == 3 {
            format!(r#"<f t="shared" ref="D3:D{last}" si="0">B3*2</f>"#)
        } else {
            r#"<f t="shared" si="0"/>"#.to_string()
        };
        xml = xml.replace(&plain, &shared);
    }
    let mut patch = PackagePatch::default();
    patch.replace(path, xml);
    package.write_patched(&patch).unwrap()
}

/// Entries of a zip in archive order.
pub fn archive_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

pub fn zip_part(bytes: &[u8], name: &str) -> Option<String> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = zip.by_name(name).ok()?;
    let mut text = String::new();
    file.read_to_string(&mut text).unwrap();
    Some(text)
}

pub fn sheet_xml(bytes: &[u8]) -> String {
    zip_part(bytes, "xl/worksheets/sheet1.xml").unwrap()
}

pub fn values(bytes: &[u8]) -> Range<Data> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
    workbook.worksheet_range(SHEET).unwrap()
}

pub fn formulas(bytes: &[u8]) -> Range<String> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
    workbook.worksheet_formula(SHEET).unwrap()
}

pub fn styles(bytes: &[u8]) -> StyleRange {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
    workbook.worksheet_style(SHEET).unwrap()
}

/// Last used row, 1-based.
pub fn row_count(range: &Range<Data>) -> u32 {
    range.end().map_or(0, |(row, _)| row + 1)
}

/// Value at a 1-based position.
pub fn cell(range: &Range<Data>, row: u32, col: u32) -> Option<&Data> {
    range
        .get_value((row - 1, col - 1))
        .filter(|v| !matches!(v, Data::Empty))
}

pub fn text(range: &Range<Data>, row: u32, col: u32) -> String {
    match cell(range, row, col) {
        Some(Data::String(s)) => s.clone(),
        other => panic!("expected text at ({row}, {col}), got {other:?}"),
    }
}

pub fn number(range: &Range<Data>, row: u32, col: u32) -> f64 {
    match cell(range, row, col) {
        Some(Data::Float(f)) => *f,
        Some(Data::Int(i)) => *i as f64,
        other => panic!("expected number at ({row}, {col}), got {other:?}"),
    }
}

/// Cell reference → `s` attribute for every `<c>` in a worksheet part.
pub fn cell_style_ids(xml: &str) -> HashMap<String, u32> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut out = HashMap::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let mut reference = None;
                let mut style = 0;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.as_ref() {
                        b"r" => reference = Some(value),
                        b"s" => style = value.parse().unwrap(),
                        _ => {}
                    }
                }
                if let Some(reference) = reference {
                    out.insert(reference, style);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    out
}

/// Attributes of every element named `local`, in document order.
pub fn elements(xml: &str, local: &str) -> Vec<HashMap<String, String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut out = Vec::new();
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == local.as_bytes() => {
                out.push(
                    e.attributes()
                        .flatten()
                        .map(|a| {
                            (
                                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                                String::from_utf8_lossy(&a.value).into_owned(),
                            )
                        })
                        .collect(),
                );
            }
            Event::Eof => break,
            _ => {}
        }
    }
    out
}

/// Attributes of `<row r="row">`, empty when the row is absent.
pub fn row_attrs(xml: &str, row: u32) -> HashMap<String, String> {
    let r = row.to_string();
    elements(xml, "row")
        .into_iter()
        .find(|attrs| attrs.get("r") == Some(&r))
        .unwrap_or_default()
}

/// Attributes of the `<col>` span covering 1-based `col`, empty when none does.
pub fn col_attrs(xml: &str, col: u32) -> HashMap<String, String> {
    elements(xml, "col")
        .into_iter()
        .find(|attrs| {
            let bound = |k: &str| attrs.get(k).and_then(|v| v.parse::<u32>().ok());
            matches!((bound("min"), bound("max")), (Some(min), Some(max)) if min <= col && col <= max)
        })
        .unwrap_or_default()
}

pub fn merge_refs(xml: &str) -> Vec<String> {
    elements(xml, "mergeCell")
        .into_iter()
        .filter_map(|mut attrs| attrs.remove("ref"))
        .collect()
}
