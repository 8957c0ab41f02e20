//! Inbound stanza union.
//!
//! The transport hands raw XML to `Stanza::parse`; dispatch then matches on
//! the variant instead of on a type hierarchy. Only `jabber:iq:version` IQs
//! are fully decoded, everything else is summarized for filtering.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ErrorCondition, Result, VersionError};
use crate::protocol::iq::{IqType, VersionIq};
use crate::protocol::jid::Jid;
use crate::protocol::version::{self, next, SoftwareVersion, ELEMENT, NAMESPACE};

/// Parsed inbound stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stanza {
    /// IQ carrying a `jabber:iq:version` query.
    Version(VersionIq),
    /// Any other IQ.
    Iq {
        id: String,
        kind: IqType,
        /// Namespace of the first child element, if any.
        namespace: Option<String>,
    },
    /// `<message/>`, `<presence/>`, or anything else.
    Other { name: String },
}

impl Stanza {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        loop {
            match next(&mut reader)? {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"iq" {
                        let head = IqHead::read(&e)?;
                        return parse_iq_body(&mut reader, head);
                    }
                    return Ok(Stanza::Other { name: local_name(&e) });
                }
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"iq" {
                        let head = IqHead::read(&e)?;
                        return Ok(Stanza::Iq {
                            id: head.id,
                            kind: head.kind,
                            namespace: None,
                        });
                    }
                    return Ok(Stanza::Other { name: local_name(&e) });
                }
                Event::Eof => {
                    return Err(VersionError::MalformedPayload("empty stanza".into()));
                }
                _ => {}
            }
        }
    }

    pub fn as_version(&self) -> Option<&VersionIq> {
        match self {
            Stanza::Version(iq) => Some(iq),
            _ => None,
        }
    }

    /// IQ type, for IQ stanzas.
    pub fn iq_kind(&self) -> Option<IqType> {
        match self {
            Stanza::Version(iq) => Some(iq.kind),
            Stanza::Iq { kind, .. } => Some(*kind),
            Stanza::Other { .. } => None,
        }
    }
}

struct IqHead {
    id: String,
    kind: IqType,
    from: Option<Jid>,
    to: Option<Jid>,
}

impl IqHead {
    fn read(e: &BytesStart<'_>) -> Result<Self> {
        let mut id = None;
        let mut kind = None;
        let mut from = None;
        let mut to = None;

        for attr in e.attributes() {
            let attr =
                attr.map_err(|e| VersionError::MalformedPayload(format!("bad attribute: {e}")))?;
            let value = attr
                .unescape_value()
                .map_err(|e| VersionError::MalformedPayload(format!("bad attribute: {e}")))?;
            match attr.key.as_ref() {
                b"id" => id = Some(value.into_owned()),
                b"type" => kind = Some(IqType::parse(&value)?),
                b"from" => from = Some(Jid::new(value.into_owned())?),
                b"to" => to = Some(Jid::new(value.into_owned())?),
                _ => {}
            }
        }

        Ok(Self {
            id: id.ok_or_else(|| VersionError::BadRequest("iq without id".into()))?,
            kind: kind.ok_or_else(|| VersionError::BadRequest("iq without type".into()))?,
            from,
            to,
        })
    }
}

fn parse_iq_body(reader: &mut Reader<&[u8]>, head: IqHead) -> Result<Stanza> {
    let mut namespace: Option<String> = None;
    let mut payload: Option<SoftwareVersion> = None;
    let mut error: Option<ErrorCondition> = None;

    loop {
        match next(reader)? {
            Event::Start(e) => {
                let ns = xmlns(&e)?;
                let name = e.local_name();
                if name.as_ref() == ELEMENT.as_bytes() && ns.as_deref() == Some(NAMESPACE) {
                    payload = Some(version::decode_query(reader)?);
                } else if name.as_ref() == b"error" {
                    error = Some(read_error(reader)?);
                } else {
                    skip_element(reader)?;
                }
                if namespace.is_none() {
                    namespace = ns;
                }
            }
            Event::Empty(e) => {
                let ns = xmlns(&e)?;
                if e.local_name().as_ref() == ELEMENT.as_bytes() && ns.as_deref() == Some(NAMESPACE)
                {
                    payload = Some(SoftwareVersion::default());
                } else if e.local_name().as_ref() == b"error" {
                    error = Some(ErrorCondition::InternalServerError);
                }
                if namespace.is_none() {
                    namespace = ns;
                }
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(VersionError::MalformedPayload("input ended before </iq>".into()));
            }
            _ => {}
        }
    }

    // An error reply may omit the echoed request; with no other namespace in
    // play it is surfaced as a version error and correlated by id.
    let bare_error = head.kind == IqType::Error && namespace.is_none();
    if namespace.as_deref() != Some(NAMESPACE) && payload.is_none() && !bare_error {
        return Ok(Stanza::Iq {
            id: head.id,
            kind: head.kind,
            namespace,
        });
    }

    // The query element is echoed on errors and empty on gets; only results
    // carry a meaningful payload.
    let payload = match head.kind {
        IqType::Result => Some(payload.unwrap_or_default()),
        _ => None,
    };

    Ok(Stanza::Version(VersionIq {
        id: head.id,
        kind: head.kind,
        from: head.from,
        to: head.to,
        payload,
        error: match head.kind {
            IqType::Error => Some(error.unwrap_or(ErrorCondition::InternalServerError)),
            _ => None,
        },
    }))
}

/// Condition name inside `<error/>`; leaves the reader past `</error>`.
fn read_error(reader: &mut Reader<&[u8]>) -> Result<ErrorCondition> {
    let mut cond = None;
    loop {
        match next(reader)? {
            Event::Empty(e) => {
                if cond.is_none() && xmlns(&e)?.as_deref() == Some(super::iq::STANZAS_NS) {
                    cond = Some(ErrorCondition::from_name(&local_name(&e)));
                }
            }
            Event::Start(e) => {
                if cond.is_none() && xmlns(&e)?.as_deref() == Some(super::iq::STANZAS_NS) {
                    cond = Some(ErrorCondition::from_name(&local_name(&e)));
                }
                skip_element(reader)?;
            }
            Event::End(_) => {
                return Ok(cond.unwrap_or(ErrorCondition::InternalServerError));
            }
            Event::Eof => {
                return Err(VersionError::MalformedPayload(
                    "input ended before </error>".into(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip to the end of an element whose start tag was just read.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        match next(reader)? {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(()),
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(VersionError::MalformedPayload(
                    "input ended inside element".into(),
                ));
            }
            _ => {}
        }
    }
}

fn xmlns(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr =
            attr.map_err(|e| VersionError::MalformedPayload(format!("bad attribute: {e}")))?;
        if attr.key.as_ref() == b"xmlns" {
            let v = attr
                .unescape_value()
                .map_err(|e| VersionError::MalformedPayload(format!("bad attribute: {e}")))?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}
