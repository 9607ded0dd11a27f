mod common;

use common::*;
use xlsplit_core::{
    split_workbook, split_workbook_with_template, ProgressEvent, ShortTemplatePolicy, SplitError,
    SplitOptions,
};

fn chunked(chunk_size: u32) -> SplitOptions {
    SplitOptions {
        chunk_size,
        ..SplitOptions::default()
    }
}

#[test]
fn test_style_indices_are_kept() {
    let source = orders_workbook(250);
    let source_styles = cell_style_ids(&sheet_xml(&source));
    let outcome = split_workbook(&source, &chunked(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);

    for (name, bytes) in &entries {
        let styles = cell_style_ids(&sheet_xml(bytes));
        for reference in ["A1", "B1", "A2", "B2", "C2", "D2"] {
            assert_eq!(styles.get(reference), source_styles.get(reference), "{name} {reference}");
        }
    }

    // Part 2 row 3 holds source row 103.
    let part2 = cell_style_ids(&sheet_xml(&entries[1].1));
    assert_eq!(part2.get("C3"), source_styles.get("C103"));
    assert_ne!(part2.get("C3"), Some(&0));
}

#[test]
fn test_same_input_gives_identical_bytes() {
    let source = orders_workbook(300);
    let first = split_workbook(&source, &chunked(120), None).unwrap();
    let second = split_workbook(&source, &chunked(120), None).unwrap();
    assert_eq!(first.archive, second.archive);
}

#[test]
fn test_rows_past_the_part_are_removed() {
    let source = orders_workbook(250);
    let outcome = split_workbook(&source, &chunked(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);
    let last = sheet_xml(&entries[2].1);
    assert!(last.contains(r#"<row r="52""#));
    assert!(!last.contains(r#"<row r="53""#));
    assert!(last.contains(r#"<dimension ref="A1:D52"/>"#));
    assert!(last.contains(r#"<mergeCell ref="A1:D1"/>"#));
}

#[test]
fn test_formula_text_is_copied_verbatim() {
    let source = orders_workbook(150);
    let outcome = split_workbook(&source, &chunked(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);
    let formulas = formulas(&entries[1].1);
    // Source row 103 is the first data row of part 2.
    assert_eq!(formulas.get_value((2, 3)).map(String::as_str), Some("B103*2"));
}

#[test]
fn test_short_template_errors_by_default() {
    let source = orders_workbook(300);
    let template = orders_workbook(50);
    let err = split_workbook_with_template(&source, &template, &chunked(100), None).unwrap_err();
    assert!(matches!(
        err,
        SplitError::TemplateTooShort {
            part: 1,
            needed_rows: 102,
            template_rows: 52
        }
    ));
}

#[test]
fn test_short_template_truncates_when_asked() {
    let source = orders_workbook(300);
    let template = orders_workbook(50);
    let opts = SplitOptions {
        short_template: ShortTemplatePolicy::Truncate,
        ..chunked(100)
    };
    let outcome = split_workbook_with_template(&source, &template, &opts, None).unwrap();
    assert_eq!(outcome.parts, 3);

    let entries = archive_entries(&outcome.archive);
    let part2 = values(&entries[1].1);
    assert_eq!(row_count(&part2), 52);
    assert_eq!(text(&part2, 3, 1), "SKU-101");
    assert_eq!(text(&part2, 52, 1), "SKU-150");
    assert_eq!(number(&part2, 52, 2), 150.0);
}

#[test]
fn test_longer_template_is_trimmed_to_the_part() {
    let source = orders_workbook(120);
    let template = orders_workbook(500);
    let outcome = split_workbook_with_template(&source, &template, &chunked(100), None).unwrap();
    let entries = archive_entries(&outcome.archive);
    let part2 = values(&entries[1].1);
    assert_eq!(row_count(&part2), 22);
    assert_eq!(text(&part2, 22, 1), "SKU-120");
}

#[test]
fn test_shared_formula_followers_keep_their_formulas() {
    let source = with_shared_formulas(&orders_workbook(5), 5);
    let outcome = split_workbook(&source, &chunked(2), None).unwrap();
    let entries = archive_entries(&outcome.archive);
    assert_eq!(entries.len(), 3);

    // Part 2 holds source rows 5 and 6, both followers of the D3 master.
    let part2 = formulas(&entries[1].1);
    assert_eq!(part2.get_value((2, 3)).map(String::as_str), Some("B5*2"));
    assert_eq!(part2.get_value((3, 3)).map(String::as_str), Some("B6*2"));
    let part1 = formulas(&entries[0].1);
    assert_eq!(part1.get_value((2, 3)).map(String::as_str), Some("B3*2"));
    assert_eq!(part1.get_value((3, 3)).map(String::as_str), Some("B4*2"));

    for (name, bytes) in &entries {
        assert!(!sheet_xml(bytes).contains(r#"t="shared""#), "{name}");
    }
}

#[test]
fn test_separate_template_takes_headers_from_source() {
    let source = orders_workbook(10);
    let template = orders_workbook_with(50, "OLD TITLE", |_| {});
    let template_styles = cell_style_ids(&sheet_xml(&template));

    let outcome = split_workbook_with_template(&source, &template, &chunked(5), None).unwrap();
    for (name, bytes) in archive_entries(&outcome.archive) {
        let range = values(&bytes);
        assert_eq!(text(&range, 1, 1), "Quarterly orders", "{name}");
        assert_eq!(text(&range, 2, 3), "Amount", "{name}");

        let styles = cell_style_ids(&sheet_xml(&bytes));
        assert_eq!(styles.get("A1"), template_styles.get("A1"), "{name}");
        assert_eq!(styles.get("B2"), template_styles.get("B2"), "{name}");
    }
}

#[test]
fn test_truncated_part_reports_progress_for_written_rows() {
    let source = orders_workbook(300);
    let template = orders_workbook(50);
    let opts = SplitOptions {
        short_template: ShortTemplatePolicy::Truncate,
        ..chunked(100)
    };
    let mut events: Vec<ProgressEvent> = Vec::new();
    let mut sink = |e: &ProgressEvent| events.push(e.clone());
    split_workbook_with_template(&source, &template, &opts, Some(&mut sink)).unwrap();

    let part1: Vec<(u32, u32)> = events
        .iter()
        .filter(|e| e.part == 1)
        .map(|e| (e.rows_done, e.rows_total))
        .collect();
    assert_eq!(part1, vec![(1, 50), (25, 50), (50, 50), (100, 100)]);
    assert!(events.windows(2).all(|w| w[0].overall <= w[1].overall));
}
