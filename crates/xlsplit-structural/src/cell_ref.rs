//! A1-style cell references. Rows and columns are 1-based, matching OOXML.

use std::fmt;

/// Largest column index a worksheet may address (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;

/// Largest row index a worksheet may address.
pub const MAX_ROW: u32 = 1_048_576;

/// Convert column letters (`"A"`, `"xfd"`) to a 1-based index.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut idx: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        idx = idx
            .checked_mul(26)?
            .checked_add((ch.to_ascii_uppercase() as u8 - b'A' + 1) as u32)?;
    }
    (idx <= MAX_COLUMN).then_some(idx)
}

/// Convert a 1-based column index to letters. `0` yields an empty string.
pub fn column_letters(col: u32) -> String {
    let mut n = col;
    let mut out = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Parse `"B3"` / `"$B$3"` into `(row, col)`.
pub fn parse_cell_ref(a1: &str) -> Option<(u32, u32)> {
    let clean = a1.trim().replace('$', "");
    let split = clean.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = clean.split_at(split);
    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    (row >= 1 && row <= MAX_ROW).then_some((row, col))
}

/// Format `(row, col)` as an A1 reference.
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

/// A rectangular block of cells, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellSpan {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl CellSpan {
    /// Parse `"A1:C2"`; a single reference yields a one-cell span. Corners are normalized.
    pub fn parse(range: &str) -> Option<Self> {
        let mut parts = range.split(':');
        let a = parts.next()?;
        let b = parts.next().unwrap_or(a);
        if parts.next().is_some() {
            return None;
        }
        let (r1, c1) = parse_cell_ref(a)?;
        let (r2, c2) = parse_cell_ref(b)?;
        Some(Self {
            first_row: r1.min(r2),
            first_col: c1.min(c2),
            last_row: r1.max(r2),
            last_col: c1.max(c2),
        })
    }

    pub fn is_single_cell(&self) -> bool {
        self.first_row == self.last_row && self.first_col == self.last_col
    }

    /// Shift every row by `delta` (may be negative). `None` if a row would leave the sheet.
    pub fn shifted_rows(&self, delta: i64) -> Option<Self> {
        let shift = |r: u32| -> Option<u32> {
            let moved = i64::from(r) + delta;
            (1..=i64::from(MAX_ROW))
                .contains(&moved)
                .then_some(moved as u32)
        };
        Some(Self {
            first_row: shift(self.first_row)?,
            last_row: shift(self.last_row)?,
            ..*self
        })
    }
}

impl fmt::Display for CellSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", cell_ref(self.first_row, self.first_col))
        } else {
            write!(
                f,
                "{}:{}",
                cell_ref(self.first_row, self.first_col),
                cell_ref(self.last_row, self.last_col)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn letters_and_indices_agree_at_edges() {
        assert_eq!(column_index("A"), Some(1));
        assert_eq!(column_index("z"), Some(26));
        assert_eq!(column_index("AA"), Some(27));
        assert_eq!(column_index("XFD"), Some(MAX_COLUMN));
        assert_eq!(column_index("XFE"), None);
        assert_eq!(column_index(""), None);
        assert_eq!(column_letters(28), "AB");
        assert_eq!(column_letters(0), "");
    }

    #[test]
    fn parses_absolute_refs() {
        assert_eq!(parse_cell_ref("$C$12"), Some((12, 3)));
        assert_eq!(parse_cell_ref("C0"), None);
        assert_eq!(parse_cell_ref("12"), None);
    }

    #[test]
    fn span_parse_normalizes_corners() {
        let span = CellSpan::parse("C5:A1").unwrap();
        assert_eq!(span.to_string(), "A1:C5");
        assert_eq!(CellSpan::parse("B2").unwrap().to_string(), "B2");
        assert!(CellSpan::parse("A1:B2:C3").is_none());
    }

    #[test]
    fn shifting_off_the_sheet_is_rejected() {
        let span = CellSpan::parse("A2:B3").unwrap();
        assert_eq!(span.shifted_rows(-1).unwrap().to_string(), "A1:B2");
        assert!(span.shifted_rows(-2).is_none());
    }

    proptest! {
        #[test]
        fn column_letters_round_trip(col in 1u32..=MAX_COLUMN) {
            prop_assert_eq!(column_index(&column_letters(col)), Some(col));
        }
    }
}
