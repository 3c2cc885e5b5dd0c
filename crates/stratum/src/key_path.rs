//! key paths into contexts and values
use std::fmt::{Display, Formatter};

/// A single step of a lookup, `.name` or `[0]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

pub type KeyPath = Vec<PathSegment>;

impl PathSegment {
    /// Key to use when looking up this segment in a mapping
    pub fn as_key(&self) -> std::borrow::Cow<'_, str> {
        match self {
            PathSegment::Key(key) => key.as_str().into(),
            PathSegment::Index(index) => index.to_string().into(),
        }
    }

    /// Index to use when looking up this segment in a list
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Key(key) => key.parse().ok(),
            PathSegment::Index(index) => Some(*index),
        }
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        PathSegment::Key(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        PathSegment::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        PathSegment::Index(value)
    }
}

/// Render a key path as `a.b[0].c`
pub fn render_key_path(path: &[PathSegment]) -> String {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            PathSegment::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
            PathSegment::Index(index) => {
                rendered.push_str(&format!("[{index}]"));
            }
        }
    }
    rendered
}

/// Parse a dotted path (`a.b.0`) as accepted on the command line
///
/// Purely numeric segments become indices.
pub fn parse_dotted(path: &str) -> KeyPath {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(segment.to_string()),
        })
        .collect()
}

/// Build a [KeyPath] from a list of segments
///
/// ```
/// # use stratum::key_path;
/// let path = key_path!["var", "items", 0usize];
/// assert_eq!(stratum::key_path::render_key_path(&path), "var.items[0]");
/// ```
#[macro_export]
macro_rules! key_path {
    ($($segment:expr),* $(,)?) => {
        vec![$($crate::key_path::PathSegment::from($segment)),*]
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_indices_in_brackets() {
        assert_eq!(render_key_path(&key_path!["a", 0usize, "b"]), "a[0].b");
        assert_eq!(render_key_path(&[]), "");
    }

    #[test]
    fn dotted_paths() {
        assert_eq!(parse_dotted("var.list.1"), key_path!["var", "list", 1usize]);
    }
}
