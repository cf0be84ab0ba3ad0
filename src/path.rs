use std::fmt;
use std::path::PathBuf;

/// A validated, normalized artifact path: slash-separated segments beneath
/// the store root, guaranteed to contain no `..` or empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactPath(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// No path segments at all (e.g. a bare `/`). The Request Bridge treats
    /// this as "not my request" rather than a client error.
    #[error("path has no segments")]
    Empty,
    /// Contains `..` or a doubled slash; a genuine client error.
    #[error("path contains an invalid segment")]
    Invalid,
}

impl ArtifactPath {
    /// Parses a raw request path (already percent-decoded, with any query
    /// string stripped) into a canonical artifact path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| *s == ".." || s.is_empty()) {
            return Err(PathError::Invalid);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The relative filesystem path under the store root, one component per
    /// segment.
    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dot_dot_segment() {
        assert_eq!(ArtifactPath::parse("a/../secret"), Err(PathError::Invalid));
        assert_eq!(ArtifactPath::parse("../secret"), Err(PathError::Invalid));
    }

    #[test]
    fn rejects_doubled_slash() {
        assert_eq!(ArtifactPath::parse("a//b"), Err(PathError::Invalid));
    }

    #[test]
    fn rejects_empty_path() {
        assert_eq!(ArtifactPath::parse(""), Err(PathError::Empty));
        assert_eq!(ArtifactPath::parse("/"), Err(PathError::Empty));
    }

    #[test]
    fn accepts_normal_path() {
        let p = ArtifactPath::parse("a/b/c.jar").unwrap();
        assert_eq!(p.as_str(), "a/b/c.jar");
        assert_eq!(p.to_relative_path(), PathBuf::from("a/b/c.jar"));
    }

    #[test]
    fn strips_leading_and_trailing_slashes() {
        let p = ArtifactPath::parse("/a/b.jar/").unwrap();
        assert_eq!(p.as_str(), "a/b.jar");
    }
}
