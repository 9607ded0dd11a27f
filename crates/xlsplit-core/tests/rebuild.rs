mod common;

use calamine_styles::{FontWeight, Style};
use common::*;
use rust_xlsxwriter::{Color, Format, Note};
use xlsplit_core::styles::parse_cell_protection;
use xlsplit_core::{split_workbook, SplitOptions, Strategy};

fn rebuild(chunk_size: u32) -> SplitOptions {
    SplitOptions {
        chunk_size,
        strategy: Strategy::Rebuild,
        ..SplitOptions::default()
    }
}

fn style_at(range: &calamine_styles::StyleRange, row: u32, col: u32) -> Option<&Style> {
    range.get(((row - 1) as usize, (col - 1) as usize))
}

fn is_bold(style: Option<&Style>) -> bool {
    style
        .and_then(|s| s.font.as_ref())
        .is_some_and(|f| f.weight == FontWeight::Bold)
}

#[test]
fn test_header_and_data_formatting_carry_over() {
    let source = orders_workbook(150);
    let outcome = split_workbook(&source, &rebuild(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);

    for (name, bytes) in &entries {
        let styles = styles(bytes);
        assert!(is_bold(style_at(&styles, 1, 1)), "{name}");
        assert!(is_bold(style_at(&styles, 2, 3)), "{name}");
        assert!(!is_bold(style_at(&styles, 3, 1)), "{name}");

        let amount = style_at(&styles, 3, 3)
            .and_then(|s| s.number_format.as_ref())
            .map(|nf| nf.format_code.clone());
        assert_eq!(amount.as_deref(), Some(AMOUNT_FORMAT), "{name}");
    }
}

#[test]
fn test_sheet_layout_is_rebuilt() {
    let source = orders_workbook(150);
    let outcome = split_workbook(&source, &rebuild(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);

    let xml = sheet_xml(&entries[1].1);
    assert!(xml.contains(r#"<mergeCell ref="A1:D1"/>"#));
    assert!(xml.contains(r#"state="frozen""#));
    assert!(xml.contains(r#"ySplit="2""#));
    assert!(xml.contains(r#"<col min="1" max="1""#));
    assert!(xml.contains(r#"customWidth="1""#));

    let workbook = zip_part(&entries[1].1, "xl/workbook.xml").unwrap();
    assert!(workbook.contains(r#"name="Orders""#));
}

#[test]
fn test_values_and_formulas_are_renumbered() {
    let source = orders_workbook(150);
    let outcome = split_workbook(&source, &rebuild(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);

    let part2 = values(&entries[1].1);
    assert_eq!(row_count(&part2), 52);
    assert_eq!(text(&part2, 3, 1), "SKU-101");
    assert_eq!(number(&part2, 3, 2), 101.0);
    assert_eq!(number(&part2, 3, 3), 151.5);

    let formulas = formulas(&entries[1].1);
    assert_eq!(formulas.get_value((2, 3)).map(String::as_str), Some("B103*2"));
}

#[test]
fn test_column_override_limits_the_copy() {
    let source = orders_workbook(20);
    let opts = SplitOptions {
        max_col_override: Some(2),
        ..rebuild(100)
    };
    let outcome = split_workbook(&source, &opts, None).unwrap();
    let range = values(&archive_entries(&outcome.archive)[0].1);
    assert_eq!(text(&range, 2, 2), "Qty");
    assert!(cell(&range, 2, 3).is_none());
    assert!(cell(&range, 5, 3).is_none());
}

#[test]
fn test_repeated_runs_give_the_same_values() {
    let source = orders_workbook(130);
    let first = split_workbook(&source, &rebuild(100), None).unwrap();
    let second = split_workbook(&source, &rebuild(100), None).unwrap();
    assert_eq!(first.entries, second.entries);
    for ((_, a), (_, b)) in archive_entries(&first.archive)
        .iter()
        .zip(archive_entries(&second.archive).iter())
    {
        let rows = |bytes: &[u8]| -> Vec<Vec<calamine_styles::Data>> {
            values(bytes).rows().map(<[_]>::to_vec).collect()
        };
        assert_eq!(rows(a), rows(b));
    }
}

/// 20 order lines (source rows 3..=22) carrying comments, protection, outlines, merges and
/// print settings. With a chunk of 10, part 1 holds rows 3..=12 and part 2 rows 13..=22.
fn layout_workbook() -> Vec<u8> {
    orders_workbook_with(20, "Quarterly orders", |ws| {
        let unlocked = Format::new().set_unlocked();
        let hidden = Format::new().set_hidden();
        ws.write_number_with_format(2, 1, 1.0, &unlocked).unwrap();
        ws.write_number_with_format(2, 2, 1.5, &hidden).unwrap();
        let note = Note::new("Check stock")
            .add_author_prefix(false)
            .set_author("Ops");
        ws.insert_note(2, 0, &note).unwrap();

        ws.group_rows(4, 6).unwrap();
        ws.group_rows_collapsed(8, 9).unwrap();
        ws.set_row_hidden(15).unwrap();
        ws.group_columns(6, 7).unwrap();
        ws.set_column_hidden(8).unwrap();

        let plain = Format::new();
        ws.merge_range(13, 4, 14, 5, "restock", &plain).unwrap();
        ws.merge_range(11, 4, 12, 5, "carry", &plain).unwrap();

        ws.set_landscape();
        ws.set_paper_size(9);
        ws.set_print_scale(80);
        ws.set_print_first_page_number(3);
        ws.set_margins(0.5, 0.5, 1.0, 1.0, 0.4, 0.4);
        ws.set_print_gridlines(true);
        ws.set_print_center_horizontally(true);
        ws.set_tab_color(Color::RGB(0x00B050));
    })
}

fn layout_parts() -> Vec<(String, Vec<u8>)> {
    let outcome = split_workbook(&layout_workbook(), &rebuild(10), None).unwrap();
    assert_eq!(outcome.parts, 2);
    archive_entries(&outcome.archive)
}

fn attr<'m>(attrs: &'m std::collections::HashMap<String, String>, key: &str) -> Option<&'m str> {
    attrs.get(key).map(String::as_str)
}

#[test]
fn test_comments_follow_their_rows() {
    let entries = layout_parts();
    let comments = zip_part(&entries[0].1, "xl/comments1.xml").unwrap();
    assert!(comments.contains("Check stock"));
    assert!(comments.contains("<author>Ops</author>"));
    assert!(comments.contains(r#"ref="A3""#));
    assert!(zip_part(&entries[1].1, "xl/comments1.xml").is_none());
}

#[test]
fn test_cell_protection_is_copied() {
    let entries = layout_parts();
    let bytes = &entries[0].1;
    let protection = parse_cell_protection(&zip_part(bytes, "xl/styles.xml").unwrap()).unwrap();
    let styles = cell_style_ids(&sheet_xml(bytes));

    let unlocked = protection[styles["B3"] as usize];
    assert!(!unlocked.locked);
    let hidden = protection[styles["C3"] as usize];
    assert!(hidden.hidden);
    assert!(hidden.locked);
    let plain = protection[styles.get("B4").copied().unwrap_or(0) as usize];
    assert!(plain.locked && !plain.hidden);
}

#[test]
fn test_row_outlines_and_hidden_rows() {
    let entries = layout_parts();
    let part1 = sheet_xml(&entries[0].1);
    for row in 5..=7 {
        let attrs = row_attrs(&part1, row);
        assert_eq!(attr(&attrs, "outlineLevel"), Some("1"), "row {row}");
        assert_eq!(attr(&attrs, "hidden"), None, "row {row}");
    }
    for row in 9..=10 {
        let attrs = row_attrs(&part1, row);
        assert_eq!(attr(&attrs, "outlineLevel"), Some("1"), "row {row}");
        assert_eq!(attr(&attrs, "hidden"), Some("1"), "row {row}");
    }
    assert_eq!(attr(&row_attrs(&part1, 11), "collapsed"), Some("1"));

    // Source row 16 lands on row 6 of part 2.
    let part2 = sheet_xml(&entries[1].1);
    assert_eq!(attr(&row_attrs(&part2, 6), "hidden"), Some("1"));
    assert_eq!(attr(&row_attrs(&part2, 5), "outlineLevel"), None);
}

#[test]
fn test_column_outlines_and_hidden_columns() {
    let entries = layout_parts();
    for (name, bytes) in &entries {
        let xml = sheet_xml(bytes);
        for col in 7..=8 {
            assert_eq!(attr(&col_attrs(&xml, col), "outlineLevel"), Some("1"), "{name} col {col}");
        }
        assert_eq!(attr(&col_attrs(&xml, 9), "hidden"), Some("1"), "{name}");
    }
}

#[test]
fn test_data_merges_move_with_their_part() {
    let entries = layout_parts();
    // E12:F13 straddles the two parts and is dropped; E14:F15 moves up by ten rows.
    assert_eq!(merge_refs(&sheet_xml(&entries[0].1)), vec!["A1:D1"]);
    assert_eq!(merge_refs(&sheet_xml(&entries[1].1)), vec!["A1:D1", "E4:F5"]);

    let part2 = values(&entries[1].1);
    assert_eq!(text(&part2, 4, 5), "restock");
}

#[test]
fn test_page_setup_margins_and_print_options() {
    let entries = layout_parts();
    for (name, bytes) in &entries {
        let xml = sheet_xml(bytes);

        let setup = elements(&xml, "pageSetup").remove(0);
        assert_eq!(attr(&setup, "orientation"), Some("landscape"), "{name}");
        assert_eq!(attr(&setup, "paperSize"), Some("9"), "{name}");
        assert_eq!(attr(&setup, "scale"), Some("80"), "{name}");
        assert_eq!(attr(&setup, "firstPageNumber"), Some("3"), "{name}");

        let margins = elements(&xml, "pageMargins").remove(0);
        let margin = |key: &str| attr(&margins, key).and_then(|v| v.parse::<f64>().ok());
        assert_eq!(margin("left"), Some(0.5), "{name}");
        assert_eq!(margin("top"), Some(1.0), "{name}");
        assert_eq!(margin("header"), Some(0.4), "{name}");

        let print = elements(&xml, "printOptions").remove(0);
        assert_eq!(attr(&print, "gridLines"), Some("1"), "{name}");
        assert_eq!(attr(&print, "horizontalCentered"), Some("1"), "{name}");

        let tab = elements(&xml, "tabColor").remove(0);
        assert_eq!(attr(&tab, "rgb"), Some("FF00B050"), "{name}");
    }
}

#[test]
fn test_shared_formula_followers_are_rebuilt_as_formulas() {
    let source = with_shared_formulas(&orders_workbook(5), 5);
    let outcome = split_workbook(&source, &rebuild(2), None).unwrap();
    let entries = archive_entries(&outcome.archive);
    let part3 = formulas(&entries[2].1);
    assert_eq!(part3.get_value((2, 3)).map(String::as_str), Some("B7*2"));
}
