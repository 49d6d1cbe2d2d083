//! Scalability-protocol pattern enumeration.

use std::fmt;

/// The ten socket patterns of the scalability-protocols family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Exclusive bidirectional link
    Pair,
    /// Broadcast publisher
    Pub,
    /// Filtering subscriber
    Sub,
    /// Request side of request/reply
    Req,
    /// Reply side of request/reply
    Rep,
    /// Load-balancing producer
    Push,
    /// Fan-in consumer
    Pull,
    /// Broadcast questioner with a response window
    Surveyor,
    /// Survey answerer
    Respondent,
    /// Symmetric many-to-many
    Bus,
}

impl Pattern {
    /// Uppercase protocol name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
            Self::Surveyor => "SURVEYOR",
            Self::Respondent => "RESPONDENT",
            Self::Bus => "BUS",
        }
    }

    /// Whether the pattern has a send direction at all.
    #[must_use]
    pub const fn can_send(&self) -> bool {
        !matches!(self, Self::Sub | Self::Pull)
    }

    /// Whether the pattern has a receive direction at all.
    #[must_use]
    pub const fn can_recv(&self) -> bool {
        !matches!(self, Self::Pub | Self::Push)
    }

    /// Whether datagrams carry a correlation header.
    #[must_use]
    pub const fn is_correlated(&self) -> bool {
        matches!(
            self,
            Self::Req | Self::Rep | Self::Surveyor | Self::Respondent
        )
    }

    /// Maximum simultaneous peers, when the pattern bounds them.
    #[must_use]
    pub const fn peer_cap(&self) -> Option<usize> {
        match self {
            Self::Pair => Some(1),
            _ => None,
        }
    }

    /// The peer pattern this pattern talks to.
    #[must_use]
    pub const fn counterpart(&self) -> Self {
        match self {
            Self::Pair => Self::Pair,
            Self::Pub => Self::Sub,
            Self::Sub => Self::Pub,
            Self::Req => Self::Rep,
            Self::Rep => Self::Req,
            Self::Push => Self::Pull,
            Self::Pull => Self::Push,
            Self::Surveyor => Self::Respondent,
            Self::Respondent => Self::Surveyor,
            Self::Bus => Self::Bus,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
