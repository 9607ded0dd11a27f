//! Cell protection from `styles.xml`. calamine-styles resolves fonts, fills, borders and
//! alignment per cell but leaves protection out, so read it straight from `cellXfs`.

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use xlsplit_structural::xml::attr_bool;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub locked: bool,
    pub hidden: bool,
}

impl Default for Protection {
    fn default() -> Self {
        Self {
            locked: true,
            hidden: false,
        }
    }
}

/// Protection per `cellXfs` index.
pub fn parse_cell_protection(xml: &str) -> Result<Vec<Protection>> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf: Vec<u8> = Vec::new();
    let mut out: Vec<Protection> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => out.push(Protection::default()),
                b"protection" if in_cell_xfs => apply_protection(&e, out.last_mut()),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"xf" if in_cell_xfs => out.push(Protection::default()),
                b"protection" if in_cell_xfs => apply_protection(&e, out.last_mut()),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn apply_protection(e: &quick_xml::events::BytesStart<'_>, target: Option<&mut Protection>) {
    if let Some(p) = target {
        if let Some(locked) = attr_bool(e, b"locked") {
            p.locked = locked;
        }
        if let Some(hidden) = attr_bool(e, b"hidden") {
            p.hidden = hidden;
        }
    }
}
