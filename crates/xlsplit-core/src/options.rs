//! Split configuration. Every field has a default so a partial JSON file is enough.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplitError};

pub const DEFAULT_CHUNK_SIZE: u32 = 999;
pub const DEFAULT_HEADER_ROWS: u32 = 2;

/// How each part's workbook is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Reopen the source package per part, trim rows, write values only. Every part
    /// re-parses the template, so cost grows with `parts x template size`.
    #[default]
    Template,
    /// Build a fresh single-sheet workbook per part and copy values plus formatting.
    Rebuild,
}

/// What the template strategy does when a part needs more rows than the template has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortTemplatePolicy {
    #[default]
    Error,
    /// Keep only the rows the template has and log a warning.
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitOptions {
    pub chunk_size: u32,
    pub header_rows: u32,
    /// Sheet to split; the workbook's active sheet when unset.
    pub sheet_name: Option<String>,
    pub strategy: Strategy,
    /// Column extent for the rebuild strategy; defaults to the sheet's last used column.
    pub max_col_override: Option<u32>,
    pub short_template: ShortTemplatePolicy,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            header_rows: DEFAULT_HEADER_ROWS,
            sheet_name: None,
            strategy: Strategy::default(),
            max_col_override: None,
            short_template: ShortTemplatePolicy::default(),
        }
    }
}

impl SplitOptions {
    /// Core-level checks. Narrower presentation bounds belong to the caller.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SplitError::InvalidConfig(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.header_rows == 0 {
            return Err(SplitError::InvalidConfig(
                "header rows must be at least 1".to_string(),
            ));
        }
        if self.max_col_override == Some(0) {
            return Err(SplitError::InvalidConfig(
                "column override must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The requested sheet name with surrounding whitespace removed; blank means unset.
    pub fn sheet(&self) -> Option<&str> {
        self.sheet_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
