//! Text the CLI prints: progress lines and the split plan.

use std::fmt::Write as _;

use xlsplit_core::{ProgressEvent, SplitPlan};

pub fn progress_line(event: &ProgressEvent) -> String {
    format!(
        "Progress: {:.0}% | File {}/{} | Row {}/{} | Elapsed: {}s",
        event.overall * 100.0,
        event.part,
        event.total_parts,
        event.rows_done,
        event.rows_total,
        event.elapsed.as_secs()
    )
}

pub fn plan_text(plan: &SplitPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Sheet: {}", plan.sheet);
    let _ = writeln!(
        out,
        "Used range: {} rows x {} columns",
        plan.extents.max_row, plan.extents.max_col
    );
    let _ = writeln!(
        out,
        "Header rows: {} | Data rows: {} | Chunk size: {}",
        plan.header_rows, plan.data_rows, plan.chunk_size
    );
    for part in &plan.parts {
        let _ = writeln!(
            out,
            "  {}  rows {}-{} ({} rows)",
            part.file_name, part.first_row, part.last_row, part.rows
        );
    }
    out
}
