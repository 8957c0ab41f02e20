use iqversion_core::protocol::version::NAMESPACE;
use iqversion_core::protocol::{IqType, Stanza};

/// Receives inbound stanzas matching its subscription filter.
///
/// Called from whichever thread delivered the stanza; must not block.
pub trait StanzaListener: Send + Sync {
    fn process(&self, stanza: &Stanza);
}

impl<F> StanzaListener for F
where
    F: Fn(&Stanza) + Send + Sync,
{
    fn process(&self, stanza: &Stanza) {
        self(stanza)
    }
}

/// Predicate over inbound stanzas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StanzaFilter {
    Any,
    /// Any IQ of this type.
    Kind(IqType),
    /// IQ whose first child is in this namespace.
    Namespace(String),
    /// `jabber:iq:version` IQ, optionally of one type only.
    Version(Option<IqType>),
    And(Box<StanzaFilter>, Box<StanzaFilter>),
    Or(Box<StanzaFilter>, Box<StanzaFilter>),
}

impl StanzaFilter {
    /// Inbound version queries.
    pub fn version_query() -> Self {
        StanzaFilter::Version(Some(IqType::Get))
    }

    /// Replies to version queries we issued.
    pub fn version_reply() -> Self {
        StanzaFilter::Version(Some(IqType::Result)).or(StanzaFilter::Version(Some(IqType::Error)))
    }

    pub fn and(self, other: StanzaFilter) -> Self {
        StanzaFilter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: StanzaFilter) -> Self {
        StanzaFilter::Or(Box::new(self), Box::new(other))
    }

    pub fn matches(&self, stanza: &Stanza) -> bool {
        match self {
            StanzaFilter::Any => true,
            StanzaFilter::Kind(kind) => stanza.iq_kind() == Some(*kind),
            StanzaFilter::Namespace(ns) => match stanza {
                Stanza::Version(_) => ns == NAMESPACE,
                Stanza::Iq { namespace, .. } => namespace.as_deref() == Some(ns.as_str()),
                Stanza::Other { .. } => false,
            },
            StanzaFilter::Version(kind) => match stanza {
                Stanza::Version(iq) => kind.map_or(true, |k| iq.kind == k),
                _ => false,
            },
            StanzaFilter::And(a, b) => a.matches(stanza) && b.matches(stanza),
            StanzaFilter::Or(a, b) => a.matches(stanza) || b.matches(stanza),
        }
    }
}
