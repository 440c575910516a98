//! JSON response paths and value utilities.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object as returned by a subgraph, with insertion order preserved.
pub type Object = Map<ByteString, Value>;

/// One segment of a response path: a field response key or a list index.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// A list index.
    Index(usize),
    /// A field response key.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(i) => write!(f, "{i}"),
            PathElement::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<&str> for PathElement {
    fn from(s: &str) -> Self {
        PathElement::Key(s.to_string())
    }
}

impl From<usize> for PathElement {
    fn from(i: usize) -> Self {
        PathElement::Index(i)
    }
}

/// The JSON path to a position in response data, as reported in the `path`
/// entry of a GraphQL error. Serialized as an array of keys and indices.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Self {
        Path(Vec::new())
    }

    pub fn from_response_key(key: &str) -> Self {
        Path(vec![PathElement::Key(key.to_string())])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&PathElement> {
        self.0.first()
    }

    pub fn push(&mut self, element: impl Into<PathElement>) {
        self.0.push(element.into());
    }

    /// Returns a new path with `other` appended to `self`.
    pub fn join(&self, other: &Path) -> Path {
        let mut elements = Vec::with_capacity(self.0.len() + other.0.len());
        elements.extend(self.0.iter().cloned());
        elements.extend(other.0.iter().cloned());
        Path(elements)
    }

    /// Drops the leading segment, rebasing the remainder one level down.
    /// Slicing an empty path yields an empty path.
    pub fn sliced(&self) -> Path {
        Path(self.0.iter().skip(1).cloned().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for element in &self.0 {
            if !first {
                write!(f, "/")?;
            }
            write!(f, "{element}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Path::from(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path(
            s.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl<T: Into<PathElement>> FromIterator<T> for Path {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Path(iter.into_iter().map(Into::into).collect())
    }
}

/// Extension methods on JSON values.
pub trait ValueExt {
    /// Recursively merges `other` into `self`: objects merge per key, arrays
    /// merge positionally, anything else is replaced by `other`.
    fn deep_merge(&mut self, other: Value);
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Value) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b {
                    match a.get_mut(&key) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                for (index, value) in b.into_iter().enumerate() {
                    match a.get_mut(index) {
                        Some(existing) => existing.deep_merge(value),
                        None => a.push(value),
                    }
                }
            }
            (a, b) => {
                *a = b;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn path_roundtrips_through_json() {
        let path = Path::from("hero/heroFriends/1/name");
        assert_eq!(
            serde_json_bytes::to_value(&path).unwrap(),
            json!(["hero", "heroFriends", 1, "name"]),
        );
        let back: Path =
            serde_json_bytes::from_value(json!(["hero", "heroFriends", 1, "name"])).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn path_slicing() {
        let path = Path::from("a/b/c");
        assert_eq!(path.sliced(), Path::from("b/c"));
        assert_eq!(path.sliced().sliced().sliced(), Path::empty());
        assert_eq!(Path::empty().sliced(), Path::empty());
    }

    #[test]
    fn deep_merge_objects_and_arrays() {
        let mut a = json!({"user": {"id": 1, "reviews": [{"id": "r1"}]}});
        a.deep_merge(json!({"user": {"name": "Ada", "reviews": [{"body": "ok"}]}}));
        assert_eq!(
            a,
            json!({"user": {"id": 1, "reviews": [{"id": "r1", "body": "ok"}], "name": "Ada"}}),
        );
    }
}
