use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a node type name against the local census.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeClass {
    Builtin,
    Custom { package: String },
    Unknown,
}

impl NodeClass {
    pub fn is_known(&self) -> bool {
        !matches!(self, NodeClass::Unknown)
    }

    pub fn package(&self) -> Option<&str> {
        match self {
            NodeClass::Custom { package } => Some(package),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeClass::Builtin => "builtin",
            NodeClass::Custom { .. } => "custom",
            NodeClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeClass::Custom { package } => write!(f, "custom ({})", package),
            other => f.write_str(other.label()),
        }
    }
}

/// A remote package, identified by its repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageRef {
    url: String,
}

impl PackageRef {
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last path segment, also used as the install directory name.
    pub fn name(&self) -> &str {
        let trimmed = self.url.strip_suffix(".git").unwrap_or(&self.url);
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Second-to-last path segment (the owner on hosted forges).
    pub fn author(&self) -> Option<&str> {
        let mut segments = self.url.rsplit('/');
        segments.next()?;
        segments.next().filter(|s| !s.is_empty() && !s.contains(':'))
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Short stable hex digest used to key per-root cache directories.
pub fn path_digest(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}
