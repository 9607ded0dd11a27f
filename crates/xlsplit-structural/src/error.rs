use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("failed to parse worksheet XML: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("XML write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("worksheet XML is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid cell reference {0:?} in worksheet XML")]
    BadReference(String),
}
