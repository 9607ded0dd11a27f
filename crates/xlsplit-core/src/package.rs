//! The xlsx zip package: sheet lookup by name and entry-preserving rewrites.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};

use indexmap::IndexMap;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use xlsplit_structural::strip_elements;
use xlsplit_structural::xml::attr_value;

use crate::error::{Result, SplitError};
use crate::ooxml_util;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Entries to replace or remove when the package is written back out.
#[derive(Debug, Default)]
pub struct PackagePatch {
    replace: HashMap<String, Vec<u8>>,
    remove: HashSet<String>,
}

impl PackagePatch {
    pub fn replace(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.replace.insert(path.into(), data.into());
    }

    pub fn remove(&mut self, path: impl Into<String>) {
        self.remove.insert(path.into());
    }
}

pub struct Package<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
    /// Sheet name → worksheet part path, in workbook order.
    sheets: IndexMap<String, String>,
    active_tab: usize,
}

impl<'a> Package<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| SplitError::MalformedWorkbook(format!("not an xlsx package: {e}")))?;

        let workbook_xml = ooxml_util::zip_read_to_string(&mut zip, WORKBOOK_PART)?;
        let rels_xml = ooxml_util::zip_read_to_string(&mut zip, WORKBOOK_RELS_PART)?;
        let sheet_rids = ooxml_util::parse_workbook_sheet_rids(&workbook_xml)?;
        let rel_targets = ooxml_util::parse_relationship_targets(&rels_xml)?;
        let active_tab = ooxml_util::parse_active_tab(&workbook_xml)?;

        let mut sheets = IndexMap::new();
        for (name, rid) in sheet_rids {
            if let Some(target) = rel_targets.get(&rid) {
                sheets.insert(name, ooxml_util::join_and_normalize("xl/", target));
            }
        }
        if sheets.is_empty() {
            return Err(SplitError::MalformedWorkbook(
                "workbook declares no worksheets".to_string(),
            ));
        }

        Ok(Self {
            zip,
            sheets,
            active_tab,
        })
    }

    /// The requested sheet, or the one the workbook opens on (first sheet as a fallback).
    pub fn resolve_sheet(&self, requested: Option<&str>) -> Result<&str> {
        match requested {
            Some(name) => self
                .sheets
                .get_key_value(name)
                .map(|(k, _)| k.as_str())
                .ok_or_else(|| SplitError::SheetNotFound(name.to_string())),
            None => self
                .sheets
                .get_index(self.active_tab)
                .or_else(|| self.sheets.get_index(0))
                .map(|(k, _)| k.as_str())
                .ok_or_else(|| SplitError::MalformedWorkbook("no worksheets".to_string())),
        }
    }

    pub fn sheet_path(&self, name: &str) -> Result<&str> {
        self.sheets
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SplitError::SheetNotFound(name.to_string()))
    }

    pub fn read_part(&mut self, path: &str) -> Result<String> {
        ooxml_util::zip_read_to_string(&mut self.zip, path)
    }

    pub fn read_part_opt(&mut self, path: &str) -> Result<Option<String>> {
        ooxml_util::zip_read_to_string_opt(&mut self.zip, path)
    }

    /// Resolve the first relationship of `rel_type` from a sheet, e.g. its comments part.
    pub fn sheet_related_part(&mut self, sheet: &str, rel_type: &str) -> Result<Option<String>> {
        let sheet_path = self.sheet_path(sheet)?.to_string();
        let Some(rels_xml) = self.read_part_opt(&ooxml_util::rels_path_for(&sheet_path))? else {
            return Ok(None);
        };
        let target = ooxml_util::find_relationship_target_by_type(&rels_xml, rel_type)?;
        Ok(target.map(|t| ooxml_util::join_and_normalize(ooxml_util::dir_of_path(&sheet_path), &t)))
    }

    /// Queue removal of the calculation chain so spreadsheet apps rebuild it on open.
    pub fn drop_calc_chain(&mut self, patch: &mut PackagePatch) -> Result<()> {
        let rels_xml = self.read_part(WORKBOOK_RELS_PART)?;
        let Some(target) = ooxml_util::find_relationship_target_by_type(&rels_xml, "calcChain")?
        else {
            return Ok(());
        };
        let calc_path = ooxml_util::join_and_normalize("xl/", &target);

        let (rels_out, _) = strip_elements(&rels_xml, |e| {
            e.local_name().as_ref() == b"Relationship"
                && attr_value(e, b"Type").is_some_and(|t| t.ends_with("/calcChain"))
        })?;
        let part_name = format!("/{calc_path}");
        let types_xml = self.read_part(CONTENT_TYPES_PART)?;
        let (types_out, _) = strip_elements(&types_xml, |e| {
            e.local_name().as_ref() == b"Override"
                && attr_value(e, b"PartName").as_deref() == Some(part_name.as_str())
        })?;

        patch.replace(WORKBOOK_RELS_PART, rels_out);
        patch.replace(CONTENT_TYPES_PART, types_out);
        patch.remove(calc_path);
        Ok(())
    }

    /// Copy every entry into a new package, applying `patch`. Entry order, compression
    /// and timestamps are kept so the same input and patch give the same bytes.
    pub fn write_patched(&mut self, patch: &PackagePatch) -> Result<Vec<u8>> {
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));

        for i in 0..self.zip.len() {
            let mut file = self.zip.by_index(i).map_err(|e| {
                SplitError::MalformedWorkbook(format!("failed to read package entry {i}: {e}"))
            })?;
            let name = file.name().to_string();
            if patch.remove.contains(&name) {
                continue;
            }

            let mut opts = SimpleFileOptions::default().compression_method(file.compression());
            if let Some(dt) = file.last_modified() {
                opts = opts.last_modified_time(dt);
            }
            if let Some(mode) = file.unix_mode() {
                opts = opts.unix_permissions(mode);
            }

            if file.is_dir() {
                out.add_directory(name, opts)
                    .map_err(|e| SplitError::Resource(format!("failed to add directory: {e}")))?;
                continue;
            }

            let data = match patch.replace.get(&name) {
                Some(patched) => patched.clone(),
                None => {
                    let mut data: Vec<u8> = Vec::new();
                    file.read_to_end(&mut data).map_err(|e| {
                        SplitError::MalformedWorkbook(format!("failed to read {name}: {e}"))
                    })?;
                    data
                }
            };

            out.start_file(name, opts)
                .map_err(|e| SplitError::Resource(format!("failed to write zip entry: {e}")))?;
            out.write_all(&data)
                .map_err(|e| SplitError::Resource(format!("failed to write zip entry: {e}")))?;
        }

        let cursor = out
            .finish()
            .map_err(|e| SplitError::Resource(format!("failed to finalize xlsx: {e}")))?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn minimal_package(sheet_xml: &str) -> Vec<u8> {
        let parts: [(&str, &str); 5] = [
            (
                CONTENT_TYPES_PART,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#,
            ),
            (
                WORKBOOK_PART,
                r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView activeTab="1"/></bookViews><sheets><sheet name="Cover" sheetId="1" r:id="rId1"/><sheet name="Orders" sheetId="2" r:id="rId2"/></sheets></workbook>"#,
            ),
            (
                WORKBOOK_RELS_PART,
                r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#,
            ),
            ("xl/worksheets/sheet2.xml", sheet_xml),
            ("xl/calcChain.xml", r#"<calcChain><c r="A1" i="2"/></calcChain>"#),
        ];
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            out.start_file(name, SimpleFileOptions::default()).unwrap();
            out.write_all(body.as_bytes()).unwrap();
        }
        out.finish().unwrap().into_inner()
    }

    #[test]
    fn test_resolve_sheet_defaults_to_active_tab() {
        let bytes = minimal_package("<worksheet/>");
        let pkg = Package::open(&bytes).unwrap();
        assert_eq!(pkg.sheets.keys().collect::<Vec<_>>(), vec!["Cover", "Orders"]);
        assert_eq!(pkg.resolve_sheet(None).unwrap(), "Orders");
        assert_eq!(pkg.resolve_sheet(Some("Cover")).unwrap(), "Cover");
        assert_eq!(pkg.sheet_path("Orders").unwrap(), "xl/worksheets/sheet2.xml");
        assert!(matches!(
            pkg.resolve_sheet(Some("Missing")),
            Err(SplitError::SheetNotFound(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_drop_calc_chain() {
        let bytes = minimal_package("<worksheet/>");
        let mut pkg = Package::open(&bytes).unwrap();
        let mut patch = PackagePatch::default();
        pkg.drop_calc_chain(&mut patch).unwrap();
        let out = pkg.write_patched(&patch).unwrap();

        let mut reopened = Package::open(&out).unwrap();
        assert!(reopened.read_part_opt("xl/calcChain.xml").unwrap().is_none());
        let types = reopened.read_part(CONTENT_TYPES_PART).unwrap();
        assert!(!types.contains("calcChain"));
        assert!(types.contains("/xl/workbook.xml"));
        let rels = reopened.read_part(WORKBOOK_RELS_PART).unwrap();
        assert!(!rels.contains("calcChain"));
        assert!(rels.contains("rId2"));
    }

    #[test]
    fn test_write_patched_is_deterministic() {
        let bytes = minimal_package("<worksheet/>");
        let mut patch = PackagePatch::default();
        patch.replace("xl/worksheets/sheet2.xml", "<worksheet><sheetData/></worksheet>");

        let first = Package::open(&bytes).unwrap().write_patched(&patch).unwrap();
        let second = Package::open(&bytes).unwrap().write_patched(&patch).unwrap();
        assert_eq!(first, second);

        let mut reopened = Package::open(&first).unwrap();
        assert_eq!(
            reopened.read_part("xl/worksheets/sheet2.xml").unwrap(),
            "<worksheet><sheetData/></worksheet>"
        );
    }
}
