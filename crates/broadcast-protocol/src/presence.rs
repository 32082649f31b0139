use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A presence-member identity. Pusher-style presence channels key members by
/// either a numeric or string user id; callers decide which at authorization
/// time, so this stays untagged on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresenceId {
    Str(String),
    Num(i64),
}

impl std::fmt::Display for PresenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceId::Str(s) => write!(f, "{s}"),
            PresenceId::Num(n) => write!(f, "{n}"),
        }
    }
}

/// `{id, info}` supplied by the authorizer on subscribe to a presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub id: PresenceId,
    pub info: serde_json::Value,
}

/// The `data.presence` payload attached to a presence channel's
/// `subscription_succeeded` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceData {
    pub ids: Vec<PresenceId>,
    pub hash: HashMap<String, serde_json::Value>,
    pub count: usize,
}

impl PresenceData {
    pub fn from_members<'a>(members: impl Iterator<Item = &'a PresenceMember>) -> Self {
        let mut ids = Vec::new();
        let mut hash = HashMap::new();
        for member in members {
            ids.push(member.id.clone());
            hash.insert(member.id.to_string(), member.info.clone());
        }
        let count = ids.len();
        PresenceData { ids, hash, count }
    }
}
