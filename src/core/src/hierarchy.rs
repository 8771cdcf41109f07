//! Team hierarchy via materialized paths
//!
//! A team's position in its organization tree is stored as a
//! dot-separated chain of team ids ending in the team's own id, e.g.
//! `root.child.leaf`. Ancestor lookup is a prefix scan over these
//! strings, and moving a subtree is a prefix rewrite applied to the
//! moved team and every descendant in one transaction.

use std::fmt;
use std::str::FromStr;

/// Result type for path operations
pub type PathResult<T> = Result<T, PathError>;

/// Errors that can occur while building or rebasing a team path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Empty path string provided
    EmptyPath,
    /// A path segment is empty (`a..b`)
    EmptySegment,
    /// A team id contains the segment separator
    InvalidSegment(String),
    /// Rebase prefix does not match the path
    PrefixMismatch { path: String, prefix: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "Team path cannot be empty"),
            Self::EmptySegment => write!(f, "Team path segment cannot be empty"),
            Self::InvalidSegment(seg) => {
                write!(f, "Team id may not contain '.': '{}'", seg)
            }
            Self::PrefixMismatch { path, prefix } => {
                write!(f, "'{}' is not a prefix of '{}'", prefix, path)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Materialized path of a team within its organization
///
/// # Examples
///
/// ```
/// use warden_core::hierarchy::TeamPath;
///
/// let path: TeamPath = "root.child.leaf".parse().unwrap();
/// assert_eq!(path.team_id(), "leaf");
/// assert_eq!(path.ancestors(), ["root", "child"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamPath {
    /// Original path string
    raw: String,
    /// Parsed segments, outermost ancestor first
    segments: Vec<String>,
}

impl TeamPath {
    /// Parses a stored path string
    pub fn new(s: &str) -> PathResult<Self> {
        if s.is_empty() {
            return Err(PathError::EmptyPath);
        }

        let segments: Vec<String> = s.split('.').map(|s| s.to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::EmptySegment);
        }

        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }

    /// Builds the path of a team under an optional parent
    ///
    /// A root team's path is just its own id.
    pub fn for_team(parent: Option<&TeamPath>, team_id: &str) -> PathResult<Self> {
        if team_id.is_empty() {
            return Err(PathError::EmptySegment);
        }
        if team_id.contains('.') {
            return Err(PathError::InvalidSegment(team_id.to_string()));
        }

        match parent {
            Some(p) => Self::new(&format!("{}.{}", p.raw, team_id)),
            None => Self::new(team_id),
        }
    }

    /// Returns the raw path string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the path segments, outermost ancestor first
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the id of the team the path belongs to (last segment)
    pub fn team_id(&self) -> &str {
        self.segments
            .last()
            .expect("validated path has at least one segment")
    }

    /// Returns ancestor team ids, outermost first, excluding the team itself
    pub fn ancestors(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// Returns the parent path if the team is not a root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }

        let parent = self.segments[..self.segments.len() - 1].join(".");
        Self::new(&parent).ok()
    }

    /// Returns the depth of the team (number of segments)
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Checks whether `other` sits strictly inside this team's subtree
    ///
    /// Used to reject moves that would parent a team under one of its
    /// own descendants.
    pub fn is_ancestor_of(&self, other: &TeamPath) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Checks whether this path is the given path or inside its subtree
    pub fn is_within(&self, other: &TeamPath) -> bool {
        self == other || other.is_ancestor_of(self)
    }

    /// Rewrites this path after its subtree root moved
    ///
    /// `old_prefix` is the subtree root's previous path and
    /// `new_prefix` its path after the move; every stored descendant
    /// path is rebased with the same pair.
    pub fn rebase(&self, old_prefix: &TeamPath, new_prefix: &TeamPath) -> PathResult<Self> {
        if !self.is_within(old_prefix) {
            return Err(PathError::PrefixMismatch {
                path: self.raw.clone(),
                prefix: old_prefix.raw.clone(),
            });
        }

        let tail = &self.segments[old_prefix.segments.len()..];
        let mut segments = new_prefix.segments.clone();
        segments.extend_from_slice(tail);
        Self::new(&segments.join("."))
    }
}

impl FromStr for TeamPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for TeamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
