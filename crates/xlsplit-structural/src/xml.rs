//! Small quick-xml helpers shared by the rewrites and by `xlsplit-core`'s OOXML readers.

use quick_xml::events::BytesStart;

/// Unescaped value of attribute `key`, matched on the full (possibly prefixed) name.
pub fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Attribute parsed as `u32`; malformed values read as absent.
pub fn attr_u32(e: &BytesStart<'_>, key: &[u8]) -> Option<u32> {
    attr_value(e, key).and_then(|s| s.trim().parse().ok())
}

/// OOXML boolean attribute (`1`/`true`).
pub fn attr_bool(e: &BytesStart<'_>, key: &[u8]) -> Option<bool> {
    attr_value(e, key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Namespace prefix of `qname` (`b"x:row"` with local `b"row"` gives `"x:"`).
pub fn prefix_of(qname: &[u8], local: &[u8]) -> String {
    let cut = qname.len().saturating_sub(local.len());
    String::from_utf8_lossy(&qname[..cut]).into_owned()
}

/// Copy of `e` with attribute `key` replaced by `value` (appended when absent).
pub fn with_attr(e: &BytesStart<'_>, key: &str, value: &str) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut replaced = false;
    for attr in e.attributes().with_checks(false).flatten() {
        if attr.key.as_ref() == key.as_bytes() {
            out.push_attribute((key, value));
            replaced = true;
        } else {
            out.push_attribute(attr);
        }
    }
    if !replaced {
        out.push_attribute((key, value));
    }
    out
}
