//! Legacy cell comments (`xl/commentsN.xml`), carried over as notes when a part is rebuilt.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use xlsplit_structural::cell_ref::parse_cell_ref;
use xlsplit_structural::xml::attr_value;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct CellComment {
    pub text: String,
    pub author: Option<String>,
}

/// Comments keyed by 1-based `(row, col)`.
pub fn parse_comments_xml(xml: &str) -> Result<HashMap<(u32, u32), CellComment>> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf: Vec<u8> = Vec::new();

    let mut authors: Vec<String> = Vec::new();
    let mut out = HashMap::new();

    let mut in_author = false;
    let mut in_t = false;
    let mut current: Option<((u32, u32), usize)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"author" => {
                    in_author = true;
                    authors.push(String::new());
                }
                b"comment" => {
                    text.clear();
                    let author_id = attr_value(&e, b"authorId")
                        .and_then(|s| s.parse::<usize>().ok())
                        .unwrap_or(0);
                    current = attr_value(&e, b"ref")
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|pos| (pos, author_id));
                }
                b"t" => in_t = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"author" => in_author = false,
                b"t" => in_t = false,
                b"comment" => {
                    if let Some((pos, author_id)) = current.take() {
                        let author = authors.get(author_id).filter(|a| !a.is_empty()).cloned();
                        out.insert(
                            pos,
                            CellComment {
                                text: text.clone(),
                                author,
                            },
                        );
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                let chunk = t.unescape().unwrap_or_default();
                if in_author {
                    if let Some(last) = authors.last_mut() {
                        last.push_str(&chunk);
                    }
                } else if in_t && current.is_some() {
                    text.push_str(&chunk);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comments_xml() {
        let xml = r#"<comments><authors><author>Ops Team</author><author></author></authors><commentList><comment ref="B1" authorId="0"><text><r><rPr><b/></rPr><t>Ops Team:</t></r><r><t xml:space="preserve"> SKU must be unique</t></r></text></comment><comment ref="C4" authorId="1"><text><t>plain</t></text></comment></commentList></comments>"#;
        let out = parse_comments_xml(xml).unwrap();
        assert_eq!(out.len(), 2);
        let b1 = &out[&(1, 2)];
        assert_eq!(b1.text, "Ops Team: SKU must be unique");
        assert_eq!(b1.author.as_deref(), Some("Ops Team"));
        let c4 = &out[&(4, 3)];
        assert_eq!(c4.text, "plain");
        assert_eq!(c4.author, None);
    }
}
