//! Row partitioning: cut the data region into contiguous parts of at most `chunk_size` rows.

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::error::{Result, SplitError};

/// One part's slice of the data region. `start`/`end` are zero-based offsets into the
/// data region, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartRange {
    pub index: usize,
    pub start: u32,
    pub end: u32,
}

impl PartRange {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 1-based part number, as used in entry names and progress.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// The 1-based source sheet rows this part copies.
    pub fn source_rows(&self, header_rows: u32) -> RangeInclusive<u32> {
        (header_rows + 1 + self.start)..=(header_rows + self.end)
    }

    /// Last row of the part's output sheet (header included).
    pub fn keep_through(&self, header_rows: u32) -> u32 {
        header_rows + self.len()
    }
}

pub fn part_count(data_rows: u32, chunk_size: u32) -> usize {
    data_rows.div_ceil(chunk_size) as usize
}

pub fn partition(data_rows: u32, chunk_size: u32) -> Result<Vec<PartRange>> {
    if chunk_size == 0 {
        return Err(SplitError::InvalidConfig(
            "chunk size must be at least 1".to_string(),
        ));
    }
    if data_rows == 0 {
        return Err(SplitError::NoDataRows {
            header_rows: 0,
            max_row: 0,
        });
    }

    let mut parts = Vec::with_capacity(part_count(data_rows, chunk_size));
    let mut cursor = 0u32;
    while cursor < data_rows {
        let end = cursor.saturating_add(chunk_size).min(data_rows);
        parts.push(PartRange {
            index: parts.len(),
            start: cursor,
            end,
        });
        cursor = end;
    }
    Ok(parts)
}
