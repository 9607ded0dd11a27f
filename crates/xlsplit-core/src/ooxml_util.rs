//! Package-level OOXML helpers: zip entry reads, workbook/relationship parsing, part paths.

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use zip::result::ZipError;
use zip::ZipArchive;

use xlsplit_structural::xml::{attr_u32, attr_value};

use crate::error::{Result, SplitError};

pub fn zip_read_to_string<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<String> {
    zip_read_to_string_opt(zip, name)?
        .ok_or_else(|| SplitError::MalformedWorkbook(format!("missing package part {name}")))
}

pub fn zip_read_to_string_opt<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>> {
    let mut file = match zip.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(SplitError::MalformedWorkbook(format!(
                "failed to open {name}: {e}"
            )))
        }
    };
    let mut out = String::new();
    file.read_to_string(&mut out)
        .map_err(|e| SplitError::MalformedWorkbook(format!("failed to read {name}: {e}")))?;
    Ok(Some(out))
}

/// `(sheet name, relationship id)` pairs in workbook order.
pub fn parse_workbook_sheet_rids(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name").unwrap_or_default();
                let rid = attr_value(&e, b"r:id").unwrap_or_default();
                if !name.is_empty() && !rid.is_empty() {
                    out.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Zero-based index of the sheet the workbook opens on (`workbookView/@activeTab`).
pub fn parse_active_tab(xml: &str) -> Result<usize> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                return Ok(attr_u32(&e, b"activeTab").unwrap_or(0) as usize);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(0)
}

/// Relationship id → target, as written (relative or absolute).
pub fn parse_relationship_targets(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut out = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    out.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// First relationship whose `Type` ends with `type_suffix` (e.g. `"comments"`).
pub fn find_relationship_target_by_type(xml: &str, type_suffix: &str) -> Result<Option<String>> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let slashed = format!("/{type_suffix}");

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let rel_type = attr_value(&e, b"Type").unwrap_or_default();
                if rel_type.ends_with(&slashed) {
                    return Ok(attr_value(&e, b"Target"));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// Resolve a relationship `target` against the directory of its source part.
pub fn join_and_normalize(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}{target}"),
    };
    let mut parts: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

pub fn dir_of_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i + 1],
        None => "",
    }
}

/// `xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`.
pub fn rels_path_for(part_path: &str) -> String {
    let dir = dir_of_path(part_path);
    let file = &part_path[dir.len()..];
    format!("{dir}_rels/{file}.rels")
}
