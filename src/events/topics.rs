use serde::{Deserialize, Serialize};

/// The three event shapes every aggregate publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

/// Topic names for one aggregate family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub created: String,
    pub updated: String,
    pub deleted: String,
}

impl TopicSet {
    /// `<prefix>-created`, `<prefix>-updated`, `<prefix>-deleted`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            created: format!("{prefix}-created"),
            updated: format!("{prefix}-updated"),
            deleted: format!("{prefix}-deleted"),
        }
    }

    pub fn for_kind(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Created => &self.created,
            EventKind::Updated => &self.updated,
            EventKind::Deleted => &self.deleted,
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.created, &self.updated, &self.deleted]
    }
}

/// Topic names for every aggregate the service publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub account: TopicSet,
    pub customer: TopicSet,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            account: TopicSet::with_prefix("account"),
            customer: TopicSet::with_prefix("customer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topic_names() {
        let topics = Topics::default();
        assert_eq!(topics.account.for_kind(EventKind::Created), "account-created");
        assert_eq!(topics.customer.for_kind(EventKind::Deleted), "customer-deleted");
        assert_eq!(topics.account.all(), ["account-created", "account-updated", "account-deleted"]);
    }
}
