//! Types related to GraphQL sub-requests, responses and errors.

pub(crate) mod request;
mod response;

use std::fmt;

pub use request::OperationKind;
pub use request::Request;
pub use response::Response;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;
use uuid::Uuid;

use crate::json_ext::Object;
use crate::json_ext::Path;

/// The error location in the GraphQL document of the originating request.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors) as may
/// be found in the `errors` field of a subgraph response.
///
/// Every error carries a non-serialized unique id so that the same error can
/// be recognized when it is reachable through more than one code path during
/// result reconciliation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the originating document.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in the response
    /// data. While an error travels through delegation layers the path is
    /// relative to the object currently holding it, and is only rebased to
    /// the operation root when the final response is assembled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,

    #[serde(skip)]
    id: Uuid,
}

impl Default for Error {
    fn default() -> Self {
        Self {
            message: String::new(),
            locations: Vec::new(),
            path: None,
            extensions: Object::new(),
            id: Uuid::new_v4(),
        }
    }
}

#[buildstructor::buildstructor]
impl Error {
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        extension_code: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        mut extensions: JsonMap<ByteString, Value>,
        id: Option<Uuid>,
    ) -> Self {
        if let Some(code) = extension_code {
            extensions
                .entry("code")
                .or_insert(Value::String(ByteString::from(code)));
        }
        Self {
            message,
            locations,
            path,
            extensions,
            id: id.unwrap_or_else(Uuid::new_v4),
        }
    }

    /// The identity of this error, preserved across relocation and slicing.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns an equivalent error whose reported path is `path`. Message,
    /// locations and extensions are left intact.
    pub fn relocate(&self, path: Path) -> Error {
        let mut relocated = self.clone();
        relocated.path = Some(path);
        relocated
    }

    /// Drops the first path segment, used when an object one level up hands a
    /// sub-object down: the leading segment pointed at the sub-object itself,
    /// the remainder is relative to it. An error whose path becomes empty
    /// turns into an unpathed error.
    pub fn sliced(&self) -> Error {
        let mut sliced = self.clone();
        sliced.path = match &self.path {
            Some(path) if path.len() > 1 => Some(path.sliced()),
            _ => None,
        };
        sliced
    }

    /// True when this error cannot be attributed to a specific field at its
    /// reporting level.
    pub fn is_unpathed(&self) -> bool {
        self.path.as_ref().map_or(true, |path| path.is_empty())
    }

    /// Combines several errors into one that preserves every child error
    /// under `extensions.errors`.
    pub fn aggregate(errors: Vec<Error>) -> Error {
        let message = errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let children = serde_json_bytes::to_value(&errors).unwrap_or_default();
        let mut extensions = Object::new();
        extensions.insert("errors", children);
        Error {
            message,
            locations: Vec::new(),
            path: None,
            extensions,
            id: Uuid::new_v4(),
        }
    }

    /// Parses an error entry from a subgraph response `errors` array. Only
    /// `message` is required; anything unrecognized lands in `extensions`.
    pub(crate) fn from_value(value: Value) -> Result<Error, String> {
        let mut object = match value {
            Value::Object(object) => object,
            other => return Err(format!("invalid error within `errors`: {other:?}")),
        };

        let message = match object.remove("message") {
            Some(Value::String(s)) => s.as_str().to_string(),
            Some(other) => return Err(format!("invalid `message` within error: {other:?}")),
            None => return Err("missing required `message` property within error".to_string()),
        };
        let locations = match object.remove("locations") {
            Some(value) => serde_json_bytes::from_value(value)
                .map_err(|err| format!("invalid `locations` within error: {err}"))?,
            None => Vec::new(),
        };
        let path = match object.remove("path") {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json_bytes::from_value(value)
                    .map_err(|err| format!("invalid `path` within error: {err}"))?,
            ),
        };
        let extensions = match object.remove("extensions") {
            Some(Value::Object(extensions)) => extensions,
            _ => Object::new(),
        };

        Ok(Error::new(message, locations, path, None, extensions, None))
    }
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// Collapses the errors associated with a null result into the value that
/// should stand in its place: nothing for zero errors, the error itself for
/// exactly one, a single aggregate preserving all of them otherwise.
pub fn collapse_errors(mut errors: Vec<Error>) -> Option<Error> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(Error::aggregate(errors)),
    }
}
