//! Flattening of metadata file content into path-based text fields.
//!
//! Only content that looks like markup is flattened; anything else
//! contributes no fields. Markup that fails to parse is a hard error.

use std::{collections::BTreeMap, io::Read};

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::{
    error::{Error, Result},
    model::EntityId,
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub trait FieldExtractor {
    /// Flatten `content` into `<prefix><path>` fields plus a catch-all
    /// `text_field`. `file` is the id the content was fetched under.
    fn extract(
        &self,
        file: &EntityId,
        prefix: &str,
        text_field: &str,
        content: &mut dyn Read,
    ) -> Result<BTreeMap<String, String>>;
}

/// Default extractor: element paths joined with `.`, attributes as
/// `<path>@<name>`, namespace prefixes dropped.
///
/// # Examples
///
/// ```
/// use archindex::extract::{FieldExtractor, XmlFlattener};
///
/// let xml = br#"<dc:record><dc:title lang="en">Letters</dc:title></dc:record>"#;
/// let fields = XmlFlattener
///     .extract(&"f1".into(), "md.", "md_text", &mut &xml[..])
///     .unwrap();
/// assert_eq!(fields["md.record.title"], "Letters");
/// assert_eq!(fields["md.record.title@lang"], "en");
/// assert_eq!(fields["md_text"], "Letters");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlFlattener;

impl FieldExtractor for XmlFlattener {
    fn extract(
        &self,
        file: &EntityId,
        prefix: &str,
        text_field: &str,
        content: &mut dyn Read,
    ) -> Result<BTreeMap<String, String>> {
        let mut bytes = Vec::new();
        content.read_to_end(&mut bytes)?;

        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
        let text = std::str::from_utf8(bytes)
            .map_err(|e| extraction_error(file, e))?;
        if !text.trim_start().starts_with('<') {
            return Ok(BTreeMap::new());
        }

        flatten(file, prefix, text_field, text)
    }
}

fn extraction_error(file: &EntityId, reason: impl ToString) -> Error {
    Error::Extraction {
        file: file.to_string(),
        reason: reason.to_string(),
    }
}

fn append(fields: &mut BTreeMap<String, String>, key: String, value: &str) {
    let slot = fields.entry(key).or_default();
    if !slot.is_empty() {
        slot.push(' ');
    }
    slot.push_str(value);
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn flatten(
    file: &EntityId,
    prefix: &str,
    text_field: &str,
    text: &str,
) -> Result<BTreeMap<String, String>> {
    let mut reader = Reader::from_str(text);
    let mut fields = BTreeMap::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(local_name(e.local_name().as_ref()));
                push_attributes(file, prefix, &path, e, &mut fields)?;
            }
            Ok(Event::Empty(ref e)) => {
                path.push(local_name(e.local_name().as_ref()));
                push_attributes(file, prefix, &path, e, &mut fields)?;
                path.pop();
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                let unescaped =
                    e.unescape().map_err(|err| extraction_error(file, err))?;
                push_text(prefix, text_field, &path, &unescaped, &mut fields);
            }
            Ok(Event::CData(ref e)) => {
                let raw = String::from_utf8_lossy(e);
                push_text(prefix, text_field, &path, &raw, &mut fields);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(extraction_error(file, e)),
            _ => {}
        }
    }

    if let Some(open) = path.last() {
        return Err(extraction_error(
            file,
            format!("unexpected end of input inside <{open}>"),
        ));
    }

    Ok(fields)
}

fn push_text(
    prefix: &str,
    text_field: &str,
    path: &[String],
    raw: &str,
    fields: &mut BTreeMap<String, String>,
) {
    let value = raw.trim();
    if value.is_empty() || path.is_empty() {
        return;
    }
    append(fields, format!("{prefix}{}", path.join(".")), value);
    append(fields, text_field.to_string(), value);
}

fn push_attributes(
    file: &EntityId,
    prefix: &str,
    path: &[String],
    element: &BytesStart<'_>,
    fields: &mut BTreeMap<String, String>,
) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| extraction_error(file, e))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| extraction_error(file, e))?;
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let name = local_name(attr.key.local_name().as_ref());
        append(
            fields,
            format!("{prefix}{}@{name}", path.join(".")),
            value,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &[u8]) -> Result<BTreeMap<String, String>> {
        XmlFlattener.extract(&"f1".into(), "md.", "md_text", &mut &content[..])
    }

    #[test]
    fn flattens_nested_paths() {
        let xml = br#"<?xml version="1.0"?>
            <record xmlns="http://purl.org/dc/elements/1.1/">
              <title>Minutes</title>
              <creator>Board</creator>
              <creator>Clerk</creator>
              <date type="issued">1921</date>
            </record>"#;
        let fields = run(xml).unwrap();

        assert_eq!(fields["md.record.title"], "Minutes");
        assert_eq!(fields["md.record.creator"], "Board Clerk");
        assert_eq!(fields["md.record.date@type"], "issued");
        assert_eq!(fields["md_text"], "Minutes Board Clerk 1921");
        assert!(!fields.keys().any(|k| k.contains("xmlns")));
    }

    #[test]
    fn strips_namespace_prefixes() {
        let xml = br#"<ead:ead xmlns:ead="urn:isbn:1-931666-22-9"><ead:unittitle>Deeds</ead:unittitle></ead:ead>"#;
        let fields = run(xml).unwrap();
        assert_eq!(fields["md.ead.unittitle"], "Deeds");
    }

    #[test]
    fn unescapes_entities_and_cdata() {
        let xml = b"<r><a>Smith &amp; Sons</a><b><![CDATA[<raw>]]></b></r>";
        let fields = run(xml).unwrap();
        assert_eq!(fields["md.r.a"], "Smith & Sons");
        assert_eq!(fields["md.r.b"], "<raw>");
    }

    #[test]
    fn bom_and_leading_whitespace_accepted() {
        let mut xml = UTF8_BOM.to_vec();
        xml.extend_from_slice(b"\n  <r><a>x</a></r>");
        let fields = run(&xml).unwrap();
        assert_eq!(fields["md.r.a"], "x");
    }

    #[test]
    fn non_markup_contributes_nothing() {
        assert!(run(b"plain text notes").unwrap().is_empty());
        assert!(run(b"").unwrap().is_empty());
    }

    #[test]
    fn mismatched_tags_are_errors() {
        let err = run(b"<a><b>x</a>").unwrap_err();
        assert!(matches!(err, Error::Extraction { ref file, .. } if file == "f1"));
    }

    #[test]
    fn unclosed_element_is_error() {
        let err = run(b"<a><b>x</b>").unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn invalid_utf8_is_error() {
        let err = run(b"<a>\xff\xfe</a>").unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }
}
