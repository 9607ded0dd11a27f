//! The downloadable zip holding one `.xlsx` per part.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{Result, SplitError};

/// `part_<number>_of_<total>.xlsx`, with a 1-based `number`.
pub fn part_file_name(number: usize, total: usize) -> String {
    format!("part_{number}_of_{total}.xlsx")
}

/// Appends entries in call order; each buffer can be dropped once `add` returns.
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    entries: Vec<String>,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<()> {
        // Fixed timestamp so identical parts give identical archives.
        let opts = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        self.zip
            .start_file(name, opts)
            .map_err(|e| SplitError::Resource(format!("failed to add {name} to archive: {e}")))?;
        self.zip
            .write_all(data)
            .map_err(|e| SplitError::Resource(format!("failed to write {name} to archive: {e}")))?;
        self.entries.push(name.to_string());
        Ok(())
    }

    pub fn finish(self) -> Result<(Vec<u8>, Vec<String>)> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| SplitError::Resource(format!("failed to finalize archive: {e}")))?;
        Ok((cursor.into_inner(), self.entries))
    }
}

/// Pack `(name, bytes)` entries, in order, into one zip.
pub fn assemble<I, N, B>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (N, B)>,
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let mut writer = ArchiveWriter::new();
    for (name, data) in entries {
        writer.add(name.as_ref(), data.as_ref())?;
    }
    writer.finish().map(|(bytes, _)| bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_part_file_name() {
        assert_eq!(part_file_name(1, 3), "part_1_of_3.xlsx");
        assert_eq!(part_file_name(12, 12), "part_12_of_12.xlsx");
    }

    #[test]
    fn test_assemble_keeps_order_and_content() {
        let bytes = assemble([("b.xlsx", b"second".as_slice()), ("a.xlsx", b"first".as_slice())])
            .unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["b.xlsx", "a.xlsx"]);

        let mut body = String::new();
        zip.by_name("a.xlsx").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "first");
        assert_eq!(
            zip.by_name("b.xlsx").unwrap().compression(),
            CompressionMethod::Deflated
        );
    }

    #[test]
    fn test_duplicate_entry_is_a_resource_error() {
        let err = assemble([("a.xlsx", b"1".as_slice()), ("a.xlsx", b"2".as_slice())]).unwrap_err();
        assert!(matches!(err, SplitError::Resource(_)));
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let entries = [("part_1_of_1.xlsx", vec![1u8, 2, 3])];
        assert_eq!(assemble(entries.clone()).unwrap(), assemble(entries).unwrap());
    }
}
