use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Characters the Realtime Database refuses inside a key.
const FORBIDDEN: &[char] = &['/', '.', '#', '$', '[', ']'];

/// Slash-delimited location in the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The tree root (empty path).
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Parse `a/b/c`, ignoring leading and trailing slashes.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let mut path = Self::root();
        for segment in raw.trim_matches('/').split('/').filter(|s| !s.is_empty()) {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn child(&self, segment: impl AsRef<str>) -> CoreResult<Self> {
        let segment = segment.as_ref();
        validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

fn validate_segment(segment: &str) -> CoreResult<()> {
    if segment.is_empty() {
        return Err(CoreError::invalid("path segment must not be empty"));
    }
    if let Some(c) = segment.chars().find(|c| FORBIDDEN.contains(c) || c.is_control()) {
        return Err(CoreError::invalid(format!(
            "path segment {:?} contains forbidden character {:?}",
            segment, c
        )));
    }
    Ok(())
}

/// Builders for every location the core touches, anchored at a configurable root.
///
/// Layout: `{root}/{community}/data`, `{root}/{community}/users/{member}`,
/// `{root}/{community}/polls/{poll}/votes/{member}`, `{root}/{community}/tickets/{member}`.
#[derive(Debug, Clone)]
pub struct Paths {
    root: StorePath,
}

impl Paths {
    pub fn new(root: &str) -> CoreResult<Self> {
        Ok(Self { root: StorePath::parse(root)? })
    }

    pub fn communities(&self) -> StorePath {
        self.root.clone()
    }

    pub fn community(&self, community_id: &str) -> CoreResult<StorePath> {
        self.root.child(community_id)
    }

    pub fn data(&self, community_id: &str) -> CoreResult<StorePath> {
        self.community(community_id)?.child("data")
    }

    pub fn levels(&self, community_id: &str) -> CoreResult<StorePath> {
        self.data(community_id)?.child("levels")
    }

    pub fn users(&self, community_id: &str) -> CoreResult<StorePath> {
        self.community(community_id)?.child("users")
    }

    pub fn user(&self, community_id: &str, member_id: &str) -> CoreResult<StorePath> {
        self.users(community_id)?.child(member_id)
    }

    pub fn polls(&self, community_id: &str) -> CoreResult<StorePath> {
        self.community(community_id)?.child("polls")
    }

    pub fn poll(&self, community_id: &str, poll_id: &str) -> CoreResult<StorePath> {
        self.polls(community_id)?.child(poll_id)
    }

    pub fn vote(&self, community_id: &str, poll_id: &str, member_id: &str) -> CoreResult<StorePath> {
        self.poll(community_id, poll_id)?.child("votes")?.child(member_id)
    }

    /// Open support ticket of `member_id`, at most one per member.
    pub fn ticket(&self, community_id: &str, member_id: &str) -> CoreResult<StorePath> {
        self.community(community_id)?.child("tickets")?.child(member_id)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            root: StorePath { segments: vec!["communities".to_string()] },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        let p = StorePath::parse("/communities/42/users/7/").unwrap();
        assert_eq!(p.segments().len(), 4);
        assert_eq!(p.to_string(), "communities/42/users/7");
        assert!(StorePath::parse("").unwrap().is_root());
    }

    #[test]
    fn test_forbidden_segments_rejected() {
        let root = StorePath::root();
        assert!(matches!(root.child(""), Err(CoreError::InvalidInput(_))));
        assert!(root.child("a.b").is_err());
        assert!(root.child("a/b").is_err());
        assert!(root.child("$x").is_err());
        assert!(root.child("ok_id-1").is_ok());
    }

    #[test]
    fn test_domain_paths() {
        let paths = Paths::default();
        assert_eq!(paths.levels("g1").unwrap().to_string(), "communities/g1/data/levels");
        assert_eq!(
            paths.vote("g1", "Ab12Cd34", "u9").unwrap().to_string(),
            "communities/g1/polls/Ab12Cd34/votes/u9"
        );
        assert_eq!(paths.ticket("g1", "u9").unwrap().to_string(), "communities/g1/tickets/u9");
    }
}
