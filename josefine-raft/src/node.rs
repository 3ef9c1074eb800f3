use std::fmt;

/// Identifies a node within a single Raft group. Transport is assumed to
/// deliver messages to whatever this resolves to; the driver never
/// interprets the contents beyond equality and ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// A bare logical name, unique within the group.
    Name(String),
    /// A name paired with the host it is reachable at.
    NameHost(String, String),
}

impl NodeId {
    pub fn name(&self) -> &str {
        match self {
            NodeId::Name(name) => name,
            NodeId::NameHost(name, _) => name,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            NodeId::Name(_) => None,
            NodeId::NameHost(_, host) => Some(host),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Name(name) => write!(f, "{}", name),
            NodeId::NameHost(name, host) => write!(f, "{}@{}", name, host),
        }
    }
}
