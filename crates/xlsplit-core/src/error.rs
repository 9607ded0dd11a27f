use thiserror::Error;

use xlsplit_structural::StructuralError;

pub type Result<T> = std::result::Result<T, SplitError>;

#[derive(Debug, Error)]
pub enum SplitError {
    /// The sheet has nothing below its header rows.
    #[error(
        "No data rows found (expected data starting at row {}); the sheet's last used row is {max_row}",
        .header_rows + 1
    )]
    NoDataRows { header_rows: u32, max_row: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error(
        "template too short for part {part}: needs {needed_rows} rows but the template has {template_rows}"
    )]
    TemplateTooShort {
        part: usize,
        needed_rows: u32,
        template_rows: u32,
    },

    #[error("malformed workbook: {0}")]
    MalformedWorkbook(String),

    #[error("{0}")]
    Resource(String),
}

impl From<StructuralError> for SplitError {
    fn from(e: StructuralError) -> Self {
        SplitError::MalformedWorkbook(e.to_string())
    }
}

impl From<quick_xml::Error> for SplitError {
    fn from(e: quick_xml::Error) -> Self {
        SplitError::MalformedWorkbook(format!("xml: {e}"))
    }
}
