//! Relative-reference translation for shared formulas.
//!
//! A shared-formula follower stores no text; its formula is the master's with every
//! relative reference moved by the follower's offset from the master cell.

use crate::cell_ref::{column_index, column_letters, MAX_COLUMN, MAX_ROW};

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$'
}

/// End (exclusive) of a quoted run opened at `start`; a doubled quote is an escape.
fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Move one `A1`, `$A1`, `A$1` or `$A$1` token. `None` when the token is not a cell
/// reference; `#REF!` when the move leaves the sheet.
fn shift_ref(token: &str, rows: i64, cols: i64) -> Option<String> {
    let (col_abs, rest) = match token.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let split = rest.find(|c: char| !c.is_ascii_alphabetic())?;
    let (letters, rest) = rest.split_at(split);
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let (row_abs, digits) = match rest.strip_prefix('$') {
        Some(digits) => (true, digits),
        None => (false, rest),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 || row > MAX_ROW {
        return None;
    }

    let new_col = if col_abs { i64::from(col) } else { i64::from(col) + cols };
    let new_row = if row_abs { i64::from(row) } else { i64::from(row) + rows };
    if !(1..=i64::from(MAX_COLUMN)).contains(&new_col) || !(1..=i64::from(MAX_ROW)).contains(&new_row) {
        return Some("#REF!".to_string());
    }
    Some(format!(
        "{}{}{}{}",
        if col_abs { "$" } else { "" },
        column_letters(new_col as u32),
        if row_abs { "$" } else { "" },
        new_row
    ))
}

/// Translate the relative cell references in `formula` by `rows`/`cols`.
///
/// String literals, quoted sheet names, structured references and function names are
/// left alone. Whole-row and whole-column ranges (`A:A`, `1:1`) are not moved.
pub fn shift_formula(formula: &str, rows: i64, cols: i64) -> String {
    let bytes = formula.as_bytes();
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            let end = quoted_end(bytes, i);
            out.push_str(&formula[i..end]);
            i = end;
        } else if b == b'[' {
            let end = formula[i..].find(']').map_or(bytes.len(), |p| i + p + 1);
            out.push_str(&formula[i..end]);
            i = end;
        } else if is_ident_byte(b) {
            let start = i;
            while i < bytes.len() && is_ident_byte(bytes[i]) {
                i += 1;
            }
            let token = &formula[start..i];
            let is_ref_position = !matches!(bytes.get(i), Some(b'(') | Some(b'!'));
            match is_ref_position.then(|| shift_ref(token, rows, cols)).flatten() {
                Some(moved) => out.push_str(&moved),
                None => out.push_str(token),
            }
        } else {
            let ch = formula[i..].chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8().max(1);
        }
    }
    out
}
