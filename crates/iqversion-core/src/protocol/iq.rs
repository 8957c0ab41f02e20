//! Version request/result envelope.
//!
//! A `VersionIq` is the typed view of an `<iq/>` stanza whose child is the
//! `jabber:iq:version` query. Replies are always built from the triggering
//! query so the correlation id and swapped addresses cannot drift.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::{ErrorCondition, Result, VersionError};
use crate::protocol::jid::Jid;
use crate::protocol::version::{self, SoftwareVersion, ELEMENT, NAMESPACE};

/// Namespace of stanza error conditions.
pub const STANZAS_NS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// IQ semantics (`type` attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IqType {
    /// A query ("what are you running?").
    Get,
    /// Never answered by this protocol; kept so parsing is total.
    Set,
    Result,
    Error,
}

impl IqType {
    pub fn as_str(self) -> &'static str {
        match self {
            IqType::Get => "get",
            IqType::Set => "set",
            IqType::Result => "result",
            IqType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "get" => Ok(IqType::Get),
            "set" => Ok(IqType::Set),
            "result" => Ok(IqType::Result),
            "error" => Ok(IqType::Error),
            other => Err(VersionError::BadRequest(format!("unknown iq type: {other}"))),
        }
    }
}

impl fmt::Display for IqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static ID_SEQ: AtomicU64 = AtomicU64::new(1);

/// Fresh correlation id, unique within the process.
pub fn next_id() -> String {
    let n = ID_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("ver{:x}-{n}", std::process::id())
}

/// Typed `jabber:iq:version` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIq {
    /// Correlation id.
    pub id: String,
    pub kind: IqType,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    /// Present on results (and on inbound queries that carried children).
    pub payload: Option<SoftwareVersion>,
    /// Present on error replies.
    pub error: Option<ErrorCondition>,
}

impl VersionIq {
    /// Outbound query with a fresh correlation id.
    pub fn query(to: Jid) -> Self {
        Self {
            id: next_id(),
            kind: IqType::Get,
            from: None,
            to: Some(to),
            payload: None,
            error: None,
        }
    }

    /// Result answering `query`: same id, addresses swapped.
    pub fn result_for(query: &VersionIq, payload: SoftwareVersion) -> Self {
        Self {
            id: query.id.clone(),
            kind: IqType::Result,
            from: query.to.clone(),
            to: query.from.clone(),
            payload: Some(payload),
            error: None,
        }
    }

    /// Error answering `query`: same id, addresses swapped.
    pub fn error_for(query: &VersionIq, condition: ErrorCondition) -> Self {
        Self {
            id: query.id.clone(),
            kind: IqType::Error,
            from: query.to.clone(),
            to: query.from.clone(),
            payload: None,
            error: Some(condition),
        }
    }

    pub fn is_query(&self) -> bool {
        self.kind == IqType::Get
    }

    /// Serialize the full `<iq/>` stanza.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());

        let mut iq = BytesStart::new("iq");
        iq.push_attribute(("type", self.kind.as_str()));
        iq.push_attribute(("id", self.id.as_str()));
        if let Some(from) = &self.from {
            iq.push_attribute(("from", from.as_str()));
        }
        if let Some(to) = &self.to {
            iq.push_attribute(("to", to.as_str()));
        }
        emit(&mut writer, Event::Start(iq))?;

        match &self.payload {
            Some(p) => version::write_query(&mut writer, p)?,
            None => {
                let mut q = BytesStart::new(ELEMENT);
                q.push_attribute(("xmlns", NAMESPACE));
                emit(&mut writer, Event::Empty(q))?;
            }
        }

        if let Some(cond) = self.error {
            write_error(&mut writer, cond)?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("iq")))?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| VersionError::Internal(format!("utf8 invalid: {e}")))
    }
}

fn write_error<W: Write>(writer: &mut Writer<W>, cond: ErrorCondition) -> Result<()> {
    let mut err = BytesStart::new("error");
    err.push_attribute(("type", "cancel"));
    emit(writer, Event::Start(err))?;
    let mut c = BytesStart::new(cond.as_str());
    c.push_attribute(("xmlns", STANZAS_NS));
    emit(writer, Event::Empty(c))?;
    emit(writer, Event::End(BytesEnd::new("error")))
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| VersionError::Internal(format!("xml write failed: {e}")))
}
