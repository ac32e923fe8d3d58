use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Isolated community scope (a guild/server).
pub type TenantId = u64;
/// The actor behind an event.
pub type SubjectId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;

/// Tracked event type. Each store holds exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Message,
    Join,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Join => "join",
        }
    }

    /// Backing table name in the durable store.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Message => "message_activity",
            Self::Join => "join_activity",
        }
    }

    /// Attributes every record of this kind carries.
    pub fn attributes(&self) -> &'static [Attribute] {
        match self {
            Self::Message => &[Attribute::Subject, Attribute::Channel, Attribute::Message],
            Self::Join => &[Attribute::Subject],
        }
    }

    pub fn supports(&self, attribute: Attribute) -> bool {
        self.attributes().contains(&attribute)
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record attribute usable in an equality filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Subject,
    Channel,
    Message,
}

impl Attribute {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Subject => "user_id",
            Self::Channel => "channel_id",
            Self::Message => "message_id",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Event payload. Carries every id needed to act on the record later,
/// so enforcement never depends on a live platform object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
    MessagePosted {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    MemberJoined,
}

impl Activity {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Self::MessagePosted { .. } => ActivityKind::Message,
            Self::MemberJoined => ActivityKind::Join,
        }
    }
}

/// One observed event. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Insert time, microsecond precision.
    pub timestamp: DateTime<Utc>,
    /// Guild or group the event belongs to.
    pub tenant_id: TenantId,
    /// Member who posted or joined.
    pub subject_id: SubjectId,
    pub activity: Activity,
}

impl Record {
    pub fn attribute(&self, attribute: Attribute) -> Option<u64> {
        match (attribute, self.activity) {
            (Attribute::Subject, _) => Some(self.subject_id),
            (Attribute::Channel, Activity::MessagePosted { channel_id, .. }) => Some(channel_id),
            (Attribute::Message, Activity::MessagePosted { message_id, .. }) => Some(message_id),
            _ => None,
        }
    }
}

/// Equality match over record attributes. Empty matches the whole tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    conditions: Vec<(Attribute, u64)>,
}

impl Filter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn subject(subject_id: SubjectId) -> Self {
        Self::any().and(Attribute::Subject, subject_id)
    }

    /// Add a condition. Conditions stay sorted so equal filters share a cursor.
    #[must_use]
    pub fn and(mut self, attribute: Attribute, value: u64) -> Self {
        let at = self
            .conditions
            .partition_point(|(existing, _)| *existing <= attribute);
        self.conditions.insert(at, (attribute, value));
        self
    }

    pub fn conditions(&self) -> &[(Attribute, u64)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|&(attribute, value)| record.attribute(attribute) == Some(value))
    }

    /// Reject conditions on attributes the given kind does not carry.
    pub fn check_supported(&self, kind: ActivityKind) -> StoreResult<()> {
        match self
            .conditions
            .iter()
            .find(|(attribute, _)| !kind.supports(*attribute))
        {
            Some(&(attribute, _)) => Err(StoreError::UnsupportedFilter { kind, attribute }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("*");
        }
        for (i, (attribute, value)) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{attribute}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(subject_id: u64, channel_id: u64, message_id: u64) -> Record {
        Record {
            timestamp: Utc::now(),
            tenant_id: 1,
            subject_id,
            activity: Activity::MessagePosted {
                channel_id,
                message_id,
            },
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::any().matches(&message(1, 2, 3)));
        assert_eq!(Filter::any().to_string(), "*");
    }

    #[test]
    fn filter_requires_every_condition() {
        let filter = Filter::subject(7).and(Attribute::Channel, 9);
        assert!(filter.matches(&message(7, 9, 1)));
        assert!(!filter.matches(&message(7, 8, 1)));
        assert!(!filter.matches(&message(6, 9, 1)));
    }

    #[test]
    fn filter_signature_ignores_condition_order() {
        let a = Filter::any()
            .and(Attribute::Channel, 9)
            .and(Attribute::Subject, 7);
        let b = Filter::subject(7).and(Attribute::Channel, 9);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "user_id=7|channel_id=9");
    }

    #[test]
    fn join_records_reject_channel_filters() {
        let filter = Filter::any().and(Attribute::Channel, 1);
        assert!(filter.check_supported(ActivityKind::Message).is_ok());
        match filter.check_supported(ActivityKind::Join) {
            Err(StoreError::UnsupportedFilter { attribute, .. }) => {
                assert_eq!(attribute, Attribute::Channel);
            }
            other => panic!("expected unsupported filter, got {other:?}"),
        }
    }

    #[test]
    fn join_record_has_no_channel() {
        let record = Record {
            timestamp: Utc::now(),
            tenant_id: 1,
            subject_id: 5,
            activity: Activity::MemberJoined,
        };
        assert_eq!(record.attribute(Attribute::Subject), Some(5));
        assert_eq!(record.attribute(Attribute::Channel), None);
    }
}
