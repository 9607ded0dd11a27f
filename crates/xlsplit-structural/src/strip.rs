//! Drop elements from an XML part, e.g. the calcChain `<Override>` in `[Content_Types].xml`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};

use crate::error::StructuralError;

/// Copy `xml`, leaving out every element (with its subtree) for which `drop` returns true.
/// Returns the new document and how many elements were removed.
pub fn strip_elements<F>(xml: &str, mut drop: F) -> Result<(String, usize), StructuralError>
where
    F: FnMut(&BytesStart<'_>) -> bool,
{
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf: Vec<u8> = Vec::new();
    let mut skip_depth: usize = 0;
    let mut removed = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if drop(&e) {
                    removed += 1;
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Empty(e) => {
                if skip_depth > 0 {
                    // inside a dropped subtree
                } else if drop(&e) {
                    removed += 1;
                } else {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else {
                    writer.write_event(Event::End(e.into_owned()))?;
                }
            }
            other => {
                if skip_depth == 0 {
                    writer.write_event(other.into_owned())?;
                }
            }
        }
        buf.clear();
    }

    Ok((String::from_utf8(writer.into_inner())?, removed))
}
