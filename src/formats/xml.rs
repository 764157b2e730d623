// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use crate::error::MError;
use crate::format::FileFormat;
use crate::magazine_data::{normalize, MagazineData};
use log::warn;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufRead, Read, Write};

const FORMAT: &str = "XML";

/// Markup events of one document, with the line each event starts on.
///
/// Comments, processing instructions, the XML declaration and `<!DOCTYPE>`
/// are consumed here and never reach the magazine grammar.
struct Events<'a> {
    text: &'a str,
    reader: Reader<&'a [u8]>,
}

impl<'a> Events<'a> {
    fn new(text: &'a str) -> Self {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        let mut reader = Reader::from_str(text);
        // tag balance is checked by the callers, which know the expected names
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        Events { text, reader }
    }

    fn line_at(&self, offset: u64) -> usize {
        let end = usize::try_from(offset).map_or(self.text.len(), |o| o.min(self.text.len()));
        self.text.as_bytes()[..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    }

    /// Current line of the reader.
    fn line(&self) -> usize {
        self.line_at(self.reader.buffer_position())
    }

    fn next(&mut self) -> Result<Option<(usize, Event<'a>)>, MError> {
        loop {
            let line = self.line();
            match self.reader.read_event() {
                Ok(Event::Eof) => return Ok(None),
                Ok(Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => {}
                Ok(event) => return Ok(Some((line, event))),
                Err(e) => {
                    return Err(MError::invalid(
                        FORMAT,
                        self.line_at(self.reader.error_position()),
                        e.to_string(),
                    ))
                }
            }
        }
    }
}

fn tag_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Decoded `(key, value)` pairs of a start tag.
fn attributes(line: usize, start: &BytesStart<'_>) -> Result<Vec<(String, String)>, MError> {
    start
        .attributes()
        .map(|attribute| {
            let attribute =
                attribute.map_err(|e| MError::invalid(FORMAT, line, e.to_string()))?;
            let value = attribute
                .unescape_value()
                .map_err(|e| MError::invalid(FORMAT, line, e.to_string()))?;
            Ok((tag_name(attribute.key.as_ref()), value.into_owned()))
        })
        .collect()
}

/// Unescaped content of a text or CDATA event, `None` for any other event.
fn char_data(line: usize, event: &Event<'_>) -> Result<Option<String>, MError> {
    match event {
        Event::Text(text) => text
            .unescape()
            .map(|text| Some(text.into_owned()))
            .map_err(|e| MError::invalid(FORMAT, line, e.to_string())),
        Event::CData(data) => Ok(Some(String::from_utf8_lossy(data).into_owned())),
        _ => Ok(None),
    }
}

/// Tag-delimited magazine documents:
///
/// ```xml
/// <magazine name="Rust Monthly">
///     <line>Editorial</line>
///     <line>Borrowing &amp; lifetimes</line>
/// </magazine>
/// ```
///
/// The `name` attribute of the root becomes the magazine name and every
/// `<line>` child one content line. Other children are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct XMLFormat;

impl XMLFormat {
    const ROOT: &'static str = "magazine";
    const LINE: &'static str = "line";
    const NAME: &'static str = "name";

    /// Line on which the first non-whitespace character of `text` sits, if
    /// `text` starts on `line`.
    fn text_line(line: usize, text: &str) -> usize {
        let leading = text.len() - text.trim_start().len();
        line + text[..leading].matches('\n').count()
    }

    fn text_outside_root(line: usize, text: &str) -> Result<(), MError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        Err(MError::invalid(
            FORMAT,
            Self::text_line(line, text),
            "text outside the root element",
        ))
    }

    /// Checks tag balance and that there is exactly one root element.
    fn check_structure(text: &str) -> Result<(), MError> {
        let mut events = Events::new(text);
        let mut open: Vec<String> = Vec::new();
        let mut seen_root = false;

        while let Some((line, event)) = events.next()? {
            let self_closing = matches!(event, Event::Empty(_));
            match event {
                Event::Start(start) | Event::Empty(start) => {
                    let name = tag_name(start.name().as_ref());
                    attributes(line, &start)?;
                    if open.is_empty() {
                        if seen_root {
                            return Err(MError::invalid(
                                FORMAT,
                                line,
                                format!("more than one root element, found <{name}>"),
                            ));
                        }
                        seen_root = true;
                    }
                    if !self_closing {
                        open.push(name);
                    }
                }
                Event::End(end) => {
                    let name = tag_name(end.name().as_ref());
                    match open.pop() {
                        Some(expected) if expected == name => {}
                        Some(expected) => {
                            return Err(MError::invalid(
                                FORMAT,
                                line,
                                format!("mismatched closing tag </{name}>, expected </{expected}>"),
                            ));
                        }
                        None => {
                            return Err(MError::invalid(
                                FORMAT,
                                line,
                                format!("unexpected closing tag </{name}>"),
                            ));
                        }
                    }
                }
                _ => {
                    if let Some(text) = char_data(line, &event)? {
                        if open.is_empty() {
                            Self::text_outside_root(line, &text)?;
                        }
                    }
                }
            }
        }

        if let Some(name) = open.last() {
            return Err(MError::invalid(
                FORMAT,
                events.line(),
                format!("unterminated element <{name}>"),
            ));
        }
        if !seen_root {
            return Err(MError::invalid(
                FORMAT,
                events.line(),
                "missing root element",
            ));
        }
        Ok(())
    }

    /// Finds the `<magazine>` start tag, returning its `name` attribute and
    /// whether the tag was self-closing.
    fn read_root(events: &mut Events<'_>) -> Result<(String, bool), MError> {
        while let Some((line, event)) = events.next()? {
            let self_closing = matches!(event, Event::Empty(_));
            match event {
                Event::Start(start) | Event::Empty(start) => {
                    let name = tag_name(start.name().as_ref());
                    if name != Self::ROOT {
                        return Err(MError::invalid(
                            FORMAT,
                            line,
                            format!("expected root element <{}>, found <{name}>", Self::ROOT),
                        ));
                    }
                    let magazine_name = attributes(line, &start)?
                        .into_iter()
                        .find(|(k, _)| k == Self::NAME)
                        .map(|(_, v)| normalize(&v))
                        .unwrap_or_default();
                    return Ok((magazine_name, self_closing));
                }
                Event::End(end) => {
                    return Err(MError::invalid(
                        FORMAT,
                        line,
                        format!("unexpected closing tag </{}>", tag_name(end.name().as_ref())),
                    ))
                }
                _ => {
                    if let Some(text) = char_data(line, &event)? {
                        Self::text_outside_root(line, &text)?;
                    }
                }
            }
        }
        Err(MError::invalid(
            FORMAT,
            events.line(),
            format!("missing root element <{}>", Self::ROOT),
        ))
    }

    /// Collects the text of a `<line>` element up to its closing tag.
    fn read_line_element(events: &mut Events<'_>) -> Result<String, MError> {
        let mut text = String::new();
        while let Some((line, event)) = events.next()? {
            match event {
                Event::End(end) => {
                    let name = tag_name(end.name().as_ref());
                    if name == Self::LINE {
                        return Ok(normalize(&text));
                    }
                    return Err(MError::invalid(
                        FORMAT,
                        line,
                        format!("mismatched closing tag </{name}>, expected </{}>", Self::LINE),
                    ));
                }
                Event::Start(start) | Event::Empty(start) => {
                    return Err(MError::invalid(
                        FORMAT,
                        line,
                        format!(
                            "element <{}> is not allowed inside <{}>",
                            tag_name(start.name().as_ref()),
                            Self::LINE
                        ),
                    ))
                }
                _ => {
                    if let Some(t) = char_data(line, &event)? {
                        text.push_str(&t);
                    }
                }
            }
        }
        Err(MError::invalid(
            FORMAT,
            events.line(),
            format!("unterminated element <{}>", Self::LINE),
        ))
    }

    /// Skips everything up to and including the closing tag of `element`.
    fn skip_element(events: &mut Events<'_>, element: String) -> Result<(), MError> {
        let mut open = vec![element];
        while let Some(expected) = open.last().cloned() {
            let Some((line, event)) = events.next()? else {
                return Err(MError::invalid(
                    FORMAT,
                    events.line(),
                    format!("unterminated element <{expected}>"),
                ));
            };
            match event {
                Event::Start(start) => open.push(tag_name(start.name().as_ref())),
                Event::End(end) => {
                    let name = tag_name(end.name().as_ref());
                    if name != expected {
                        return Err(MError::invalid(
                            FORMAT,
                            line,
                            format!("mismatched closing tag </{name}>, expected </{expected}>"),
                        ));
                    }
                    open.pop();
                }
                _ => {
                    char_data(line, &event)?;
                }
            }
        }
        Ok(())
    }

    /// Makes sure nothing but whitespace follows the root element.
    fn read_epilog(events: &mut Events<'_>) -> Result<(), MError> {
        while let Some((line, event)) = events.next()? {
            match event {
                Event::Start(start) | Event::Empty(start) => {
                    return Err(MError::invalid(
                        FORMAT,
                        line,
                        format!(
                            "more than one root element, found <{}>",
                            tag_name(start.name().as_ref())
                        ),
                    ))
                }
                Event::End(end) => {
                    return Err(MError::invalid(
                        FORMAT,
                        line,
                        format!("unexpected closing tag </{}>", tag_name(end.name().as_ref())),
                    ))
                }
                _ => {
                    if let Some(text) = char_data(line, &event)? {
                        Self::text_outside_root(line, &text)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Builds a [`MagazineData`] from a whole XML document.
    pub fn parse_document(text: &str) -> Result<MagazineData, MError> {
        let mut events = Events::new(text);
        let (name, self_closing) = Self::read_root(&mut events)?;
        let mut data = MagazineData::with_name(name);

        if !self_closing {
            loop {
                let Some((line, event)) = events.next()? else {
                    return Err(MError::invalid(
                        FORMAT,
                        events.line(),
                        format!("unterminated element <{}>", Self::ROOT),
                    ));
                };
                let self_closing = matches!(event, Event::Empty(_));
                match event {
                    Event::End(end) => {
                        let name = tag_name(end.name().as_ref());
                        if name == Self::ROOT {
                            break;
                        }
                        return Err(MError::invalid(
                            FORMAT,
                            line,
                            format!(
                                "mismatched closing tag </{name}>, expected </{}>",
                                Self::ROOT
                            ),
                        ));
                    }
                    Event::Start(start) | Event::Empty(start) => {
                        let name = tag_name(start.name().as_ref());
                        attributes(line, &start)?;
                        if name == Self::LINE {
                            if self_closing {
                                data.add_line("");
                            } else {
                                data.add_line(Self::read_line_element(&mut events)?);
                            }
                        } else {
                            warn!("ignoring unknown element <{name}> at line {line}");
                            if !self_closing {
                                Self::skip_element(&mut events, name)?;
                            }
                        }
                    }
                    _ => {
                        if let Some(text) = char_data(line, &event)? {
                            if !text.trim().is_empty() {
                                return Err(MError::invalid(
                                    FORMAT,
                                    Self::text_line(line, &text),
                                    format!("unexpected text directly inside <{}>", Self::ROOT),
                                ));
                            }
                        }
                    }
                }
            }
        }

        Self::read_epilog(&mut events)?;
        Ok(data)
    }

    /// Reads the whole input, rejecting bytes that are not UTF-8.
    fn read_document<R: BufRead>(reader: &mut R) -> Result<String, MError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| {
            let valid = e.utf8_error().valid_up_to();
            let line = e.as_bytes()[..valid].iter().filter(|&&b| b == b'\n').count() + 1;
            MError::invalid(FORMAT, line, "invalid UTF-8")
        })
    }
}

impl FileFormat for XMLFormat {
    fn read_next<R: BufRead>(&mut self, reader: &mut R) -> Result<MagazineData, MError> {
        XMLFormat::parse_document(&Self::read_document(reader)?)
    }

    fn validate<R: BufRead>(&self, reader: &mut R) -> Result<(), MError> {
        XMLFormat::check_structure(&Self::read_document(reader)?)
    }

    fn write_next<W: Write>(&mut self, writer: &mut W, data: &MagazineData) -> Result<(), MError> {
        writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        if data.content.is_empty() {
            writeln!(writer, r#"<{} name="{}"/>"#, Self::ROOT, escape(&data.name))?;
            return Ok(());
        }

        writeln!(writer, r#"<{} name="{}">"#, Self::ROOT, escape(&data.name))?;
        for line in &data.content {
            if line.is_empty() {
                writeln!(writer, "\t<{}/>", Self::LINE)?;
            } else {
                writeln!(writer, "\t<{0}>{1}</{0}>", Self::LINE, escape(line))?;
            }
        }
        writeln!(writer, "</{}>", Self::ROOT)?;
        Ok(())
    }

    fn finalize<W: Write>(&self, writer: &mut W) -> Result<(), MError> {
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::magazine::Magazine;

    const RUST_MONTHLY: &str = "./src/tests-data/xml/rust_monthly.xml";

    fn parse(text: &str) -> Result<MagazineData, MError> {
        XMLFormat::parse_document(text)
    }

    fn validate(text: &str) -> Result<(), MError> {
        let mut reader = text.as_bytes();
        XMLFormat.validate(&mut reader)
    }

    #[test]
    fn read_rust_monthly() {
        let text = fs::read_to_string(RUST_MONTHLY).unwrap();
        let data = parse(&text).unwrap();

        assert_eq!(data.name, "Rust Monthly");
        assert_eq!(data.size(), 5);
        assert_eq!(data[0], "Editorial: ownership explained");
        assert_eq!(data[1], "Borrowing & lifetimes");
        assert_eq!(data[2], "Raw <markup> stays raw");
        assert_eq!(data[3], "");
        assert_eq!(data[4], "A line that was wrapped over several lines");
    }

    #[test]
    fn read_through_magazine() {
        let path = Path::new(RUST_MONTHLY);
        let mut magazine = Magazine::new(path).unwrap();
        magazine.open().unwrap();
        let data = magazine.load().unwrap();
        assert_eq!(data.name, "Rust Monthly");
        assert_eq!(data.size(), 5);
    }

    #[test]
    fn self_closing_root() {
        let data = parse(r#"<magazine name="Empty"/>"#).unwrap();
        assert_eq!(data, MagazineData::with_name("Empty"));
    }

    #[test]
    fn missing_name_attribute_is_empty() {
        let data = parse("<magazine><line>only</line></magazine>").unwrap();
        assert_eq!(data.name, "");
        assert_eq!(data.content, ["only"]);
    }

    #[test]
    fn name_is_normalized() {
        let data = parse("<magazine name=\"  Rust&#10;\tMonthly \"/>").unwrap();
        assert_eq!(data.name, "Rust Monthly");
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let data = parse(
            "<magazine name=\"m\"><cover><image src=\"a.png\"/><caption>x</caption></cover>\
             <line>kept</line><ad/></magazine>",
        )
        .unwrap();
        assert_eq!(data.content, ["kept"]);
    }

    #[test]
    fn line_numbers_in_errors() {
        let err = parse("<magazine>\n  <line>ok</line>\n  stray\n</magazine>").unwrap_err();
        match err {
            MError::InvalidFormat { format, line, .. } => {
                assert_eq!(format, "XML");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn write_then_read() {
        let mut data = MagazineData::with_name("Tom & \"Jerry\"");
        data.add_line("1 < 2");
        data.add_line("");
        data.add_line("it's <fine>");

        let mut buffer = Vec::new();
        let mut format = XMLFormat;
        format.write_next(&mut buffer, &data).unwrap();
        format.finalize(&mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(text.contains("\t<line>1 &lt; 2</line>\n"));
        assert!(text.contains("\t<line/>\n"));
        assert_eq!(parse(&text).unwrap(), data);
    }

    #[test]
    fn write_empty_document() {
        let mut buffer = Vec::new();
        XMLFormat
            .write_next(&mut buffer, &MagazineData::with_name("Empty"))
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.ends_with("<magazine name=\"Empty\"/>\n"));
        assert_eq!(parse(&text).unwrap(), MagazineData::with_name("Empty"));
    }

    #[test]
    fn validate_accepts_any_well_formed_root() {
        // well-formed, so `open` accepts it; `load` rejects the root name
        validate("<newspaper><line>x</line></newspaper>").unwrap();
        validate(&fs::read_to_string(RUST_MONTHLY).unwrap()).unwrap();
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let text = "\u{FEFF}<?xml version=\"1.0\"?>\n<magazine name=\"M\"><line>a</line></magazine>";
        validate(text).unwrap();
        assert_eq!(parse(text).unwrap().content, ["a"]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.xml");
        fs::write(&path, text).unwrap();
        let mut magazine = Magazine::new(&path).unwrap();
        magazine.open().unwrap();
        assert_eq!(magazine.load().unwrap().name, "M");
    }

    #[test]
    fn doctype_with_internal_subset() {
        let text = "<?xml version=\"1.0\"?>\n\
                    <!DOCTYPE magazine [\n  <!ELEMENT magazine (line*)>\n  <!ENTITY x \"y\">\n]>\n\
                    <magazine name=\"M\"><line>a</line></magazine>\n";
        validate(text).unwrap();
        assert_eq!(parse(text).unwrap().content, ["a"]);
    }

    #[test]
    fn invalid_utf8_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.xml");
        fs::write(&path, b"<?xml version=\"1.0\"?>\n<magazine name=\"\xff\"/>\n").unwrap();

        let mut magazine = Magazine::new(&path).unwrap();
        match magazine.open().unwrap_err() {
            MError::InvalidFormat {
                format,
                line,
                reason,
            } => {
                assert_eq!(format, "XML");
                assert_eq!(line, 2);
                assert_eq!(reason, "invalid UTF-8");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!magazine.is_open());
    }

    #[test]
    fn escape_error_line() {
        let err = validate("<magazine>\n<line>ok</line>\n<line>&nbsp;</line>\n</magazine>").unwrap_err();
        match err {
            MError::InvalidFormat { line, reason, .. } => {
                assert_eq!(line, 3);
                assert!(reason.contains("unrecognized entity `nbsp`"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    macro_rules! assert_validate_fails {
        ($text:expr) => {
            validate($text).unwrap();
        };
    }

    macro_rules! assert_parse_fails {
        ($text:expr) => {
            parse($text).unwrap();
        };
    }

    #[test]
    #[should_panic(expected = "mismatched closing tag </magazine>, expected </line>")]
    fn validate_mismatched() {
        assert_validate_fails!("<magazine><line>x</magazine></line>");
    }
    #[test]
    #[should_panic(expected = "unterminated element <magazine>")]
    fn validate_unterminated() {
        assert_validate_fails!("<magazine><line>x</line>");
    }
    #[test]
    #[should_panic(expected = "more than one root element, found <magazine>")]
    fn validate_two_roots() {
        assert_validate_fails!("<magazine/><magazine/>");
    }
    #[test]
    #[should_panic(expected = "missing root element")]
    fn validate_empty() {
        assert_validate_fails!("<?xml version=\"1.0\"?>\n<!-- nothing -->\n");
    }
    #[test]
    #[should_panic(expected = "text outside the root element")]
    fn validate_stray_text() {
        assert_validate_fails!("hello <magazine/>");
    }
    #[test]
    #[should_panic(expected = "unexpected closing tag </line>")]
    fn validate_leading_end_tag() {
        assert_validate_fails!("</line><magazine/>");
    }

    #[test]
    #[should_panic(expected = "unexpected number sign")]
    fn validate_signed_char_ref() {
        assert_validate_fails!("<magazine><line>&#+65;</line></magazine>");
    }
    #[test]
    #[should_panic(expected = "0x0 character is not permitted in XML")]
    fn validate_nul_char_ref() {
        assert_validate_fails!("<magazine><line>&#0;</line></magazine>");
    }
    #[test]
    #[should_panic(expected = "0x0 character is not permitted in XML")]
    fn parse_nul_char_ref_in_name() {
        assert_parse_fails!("<magazine name=\"&#x0;\"/>");
    }
    #[test]
    #[should_panic(expected = "duplicated attribute")]
    fn validate_duplicate_attribute() {
        assert_validate_fails!("<magazine name=\"a\" name=\"b\"/>");
    }
    #[test]
    #[should_panic(expected = "text outside the root element")]
    fn validate_text_after_internal_subset() {
        assert_validate_fails!("<!DOCTYPE magazine [ <!ENTITY x \"y\"> ]> ]>\n<magazine/>");
    }

    #[test]
    #[should_panic(expected = "expected root element <magazine>, found <newspaper>")]
    fn parse_wrong_root() {
        assert_parse_fails!("<newspaper/>");
    }
    #[test]
    #[should_panic(expected = "element <b> is not allowed inside <line>")]
    fn parse_nested_line() {
        assert_parse_fails!("<magazine><line>a <b>bold</b></line></magazine>");
    }
    #[test]
    #[should_panic(expected = "unexpected text directly inside <magazine>")]
    fn parse_text_in_root() {
        assert_parse_fails!("<magazine>loose words</magazine>");
    }
    #[test]
    #[should_panic(expected = "unterminated element <line>")]
    fn parse_unterminated_line() {
        assert_parse_fails!("<magazine><line>never closed");
    }
    #[test]
    #[should_panic(expected = "mismatched closing tag </cover>, expected </image>")]
    fn parse_mismatched_in_skipped_element() {
        assert_parse_fails!("<magazine><cover><image></cover></magazine>");
    }
    #[test]
    #[should_panic(expected = "more than one root element, found <magazine>")]
    fn parse_two_roots() {
        assert_parse_fails!("<magazine/>\n<magazine/>");
    }
}
