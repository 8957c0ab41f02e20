//! Software version payload (`<query xmlns="jabber:iq:version"/>`).
//!
//! Encoding rules:
//! - children are emitted in the fixed order `name`, `version`, `os`;
//! - a `None` field emits nothing (not an empty element);
//! - text escaping is left to `quick-xml`.
//!
//! Decoding is a forward-only scan: it captures the text that follows the
//! `name`/`version`/`os` start tags, skips unknown children, and stops at the
//! end tag of the enclosing `query`. Running out of input first is
//! `MalformedPayload`.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, VersionError};

/// Protocol namespace.
pub const NAMESPACE: &str = "jabber:iq:version";
/// Local name of the payload element.
pub const ELEMENT: &str = "query";

const NAME: &[u8] = b"name";
const VERSION: &[u8] = b"version";
const OS: &[u8] = b"os";

/// Software identity advertised by (or learned about) an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftwareVersion {
    /// Natural-language software name. Required in a result.
    pub name: Option<String>,
    /// Software version. Required in a result.
    pub version: Option<String>,
    /// Operating system. Optional.
    pub os: Option<String>,
}

impl SoftwareVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: Some(version.into()),
            os: None,
        }
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    /// True when both required result fields are present.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.version.is_some()
    }
}

/// Encode the payload as a standalone `<query/>` fragment.
pub fn encode(payload: &SoftwareVersion) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_query(&mut writer, payload)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| VersionError::Internal(format!("utf8 invalid: {e}")))
}

/// Write the `<query/>` element into an existing document.
pub fn write_query<W: Write>(writer: &mut Writer<W>, payload: &SoftwareVersion) -> Result<()> {
    let mut start = BytesStart::new(ELEMENT);
    start.push_attribute(("xmlns", NAMESPACE));
    emit(writer, Event::Start(start))?;

    for (tag, value) in [
        ("name", &payload.name),
        ("version", &payload.version),
        ("os", &payload.os),
    ] {
        if let Some(text) = value {
            emit(writer, Event::Start(BytesStart::new(tag)))?;
            emit(writer, Event::Text(BytesText::new(text)))?;
            emit(writer, Event::End(BytesEnd::new(tag)))?;
        }
    }

    emit(writer, Event::End(BytesEnd::new(ELEMENT)))
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| VersionError::Internal(format!("xml write failed: {e}")))
}

/// Decode a standalone `<query/>` fragment.
pub fn decode(fragment: &str) -> Result<SoftwareVersion> {
    let mut reader = Reader::from_str(fragment);
    loop {
        match next(&mut reader)? {
            Event::Start(e) if e.local_name().as_ref() == ELEMENT.as_bytes() => {
                return decode_query(&mut reader);
            }
            Event::Empty(e) if e.local_name().as_ref() == ELEMENT.as_bytes() => {
                return Ok(SoftwareVersion::default());
            }
            Event::Start(e) | Event::Empty(e) => {
                return Err(VersionError::MalformedPayload(format!(
                    "expected <{ELEMENT}>, found <{}>",
                    String::from_utf8_lossy(e.local_name().as_ref())
                )));
            }
            Event::Eof => {
                return Err(VersionError::MalformedPayload(format!(
                    "no <{ELEMENT}> element"
                )));
            }
            // prolog, comments, whitespace
            _ => {}
        }
    }
}

/// Scan the body of a `<query>` whose start tag has already been consumed.
///
/// Returns once the matching `</query>` is read; the reader is left just
/// past it.
pub fn decode_query(reader: &mut Reader<&[u8]>) -> Result<SoftwareVersion> {
    let mut out = SoftwareVersion::default();
    let mut depth = 0usize;

    loop {
        match next(reader)? {
            Event::Start(e) if depth == 0 => match e.local_name().as_ref() {
                NAME => out.name = Some(read_text(reader)?),
                VERSION => out.version = Some(read_text(reader)?),
                OS => out.os = Some(read_text(reader)?),
                _ => depth += 1,
            },
            Event::Start(_) => depth += 1,
            Event::Empty(e) if depth == 0 => match e.local_name().as_ref() {
                NAME => out.name = Some(String::new()),
                VERSION => out.version = Some(String::new()),
                OS => out.os = Some(String::new()),
                _ => {}
            },
            Event::End(e) if depth == 0 => {
                if e.local_name().as_ref() == ELEMENT.as_bytes() {
                    return Ok(out);
                }
                return Err(VersionError::MalformedPayload(format!(
                    "unexpected </{}> inside <{ELEMENT}>",
                    String::from_utf8_lossy(e.local_name().as_ref())
                )));
            }
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(VersionError::MalformedPayload(format!(
                    "input ended before </{ELEMENT}>"
                )));
            }
            _ => {}
        }
    }
}

/// Text content up to the end tag of the element just opened.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();
    loop {
        match next(reader)? {
            Event::Text(t) => {
                let s = t
                    .unescape()
                    .map_err(|e| VersionError::MalformedPayload(format!("bad text: {e}")))?;
                text.push_str(&s);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(_) => return Ok(text),
            Event::Start(e) | Event::Empty(e) => {
                return Err(VersionError::MalformedPayload(format!(
                    "unexpected <{}> inside text field",
                    String::from_utf8_lossy(e.local_name().as_ref())
                )));
            }
            Event::Eof => {
                return Err(VersionError::MalformedPayload(
                    "input ended inside text field".into(),
                ));
            }
            _ => {}
        }
    }
}

pub(crate) fn next<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>> {
    reader
        .read_event()
        .map_err(|e| VersionError::MalformedPayload(format!("xml error: {e}")))
}
