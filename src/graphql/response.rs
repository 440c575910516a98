use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::error::DelegationError;
use crate::graphql::Error;
use crate::json_ext::Object;

/// A GraphQL response as returned by a subgraph executor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The GraphQL errors encountered, if any.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional GraphQL extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(
        data: Option<Value>,
        errors: Vec<Error>,
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// Builds a [`Response`] from a raw JSON value, identifying the faulty
    /// subschema on malformed input.
    pub fn from_value(service: &str, value: Value) -> Result<Response, DelegationError> {
        let malformed = |reason: String| DelegationError::SubrequestMalformedResponse {
            service: service.to_string(),
            reason,
        };

        let mut object = match value {
            Value::Object(object) => object,
            other => return Err(malformed(format!("not an object: {other:?}"))),
        };

        let data = object.remove("data");
        let errors = match object.remove("errors") {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .map(|entry| Error::from_value(entry).map_err(&malformed))
                .collect::<Result<Vec<Error>, DelegationError>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(malformed(format!("invalid `errors`: {other:?}"))),
        };
        let extensions = match object.remove("extensions") {
            Some(Value::Object(extensions)) => extensions,
            _ => Object::new(),
        };

        // GraphQL spec: a response without data must contain at least one error.
        if data.is_none() && errors.is_empty() {
            return Err(malformed(
                "graphql response without data must contain at least one error".to_string(),
            ));
        }

        Ok(Response {
            data,
            errors,
            extensions,
        })
    }
}
