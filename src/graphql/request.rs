use std::fmt;
use std::fmt::Display;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::spec::write_selection_set;
use crate::spec::Selection;

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub const fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }

    pub(crate) const fn keyword(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_type_name())
    }
}

/// An outgoing sub-request: one operation containing exactly one root field
/// with its arguments and requested selection set.
///
/// The structured form is what transforms and validation operate on; the
/// serialized document is derived on demand for the executor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    pub operation_kind: OperationKind,
    pub operation_name: Option<String>,
    pub field_name: String,
    pub arguments: Object,
    pub selection_set: Vec<Selection>,
    pub variables: Object,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        operation_kind: Option<OperationKind>,
        operation_name: Option<String>,
        field_name: String,
        arguments: JsonMap<ByteString, Value>,
        selections: Vec<Selection>,
        variables: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            operation_kind: operation_kind.unwrap_or_default(),
            operation_name,
            field_name,
            arguments,
            selection_set: selections,
            variables,
        }
    }

    /// Prints the operation as a GraphQL document. Argument values are
    /// inlined as literals.
    pub fn to_document(&self) -> String {
        let mut out = String::new();
        out.push_str(self.operation_kind.keyword());
        if let Some(name) = &self.operation_name {
            let _ = write!(out, " {name}");
        }
        out.push_str(" { ");
        out.push_str(&self.field_name);
        if !self.arguments.is_empty() {
            out.push('(');
            let mut first = true;
            for (key, value) in &self.arguments {
                if !first {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", key.as_str());
                write_graphql_literal(&mut out, value);
                first = false;
            }
            out.push(')');
        }
        if !self.selection_set.is_empty() {
            out.push(' ');
            write_selection_set(&mut out, &self.selection_set);
        }
        out.push_str(" }");
        out
    }
}

/// Prints a JSON value as a GraphQL input literal.
pub(crate) fn write_graphql_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            // serde_json string rendering matches GraphQL string escaping
            let _ = write!(out, "{}", serde_json::Value::from(s.as_str()));
        }
        Value::Array(values) => {
            out.push('[');
            let mut first = true;
            for value in values {
                if !first {
                    out.push_str(", ");
                }
                write_graphql_literal(out, value);
                first = false;
            }
            out.push(']');
        }
        Value::Object(object) => {
            out.push('{');
            let mut first = true;
            for (key, value) in object {
                if !first {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", key.as_str());
                write_graphql_literal(out, value);
                first = false;
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::spec::Field;

    #[test]
    fn prints_a_minimal_query_document() {
        let request = Request::builder()
            .field_name("userById")
            .arguments(json!({"id": "1", "limit": 3}).as_object().cloned().unwrap())
            .selections(vec![
                Selection::field(Field::leaf("id")),
                Selection::field(Field::leaf("email")),
            ])
            .build();
        assert_eq!(
            request.to_document(),
            r#"query { userById(id: "1", limit: 3) { id email } }"#,
        );
    }

    #[test]
    fn prints_mutations_and_nested_literals() {
        let request = Request::builder()
            .operation_kind(OperationKind::Mutation)
            .field_name("upsert")
            .arguments(
                json!({"input": {"tags": ["a", "b"], "active": true}})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .selections(vec![Selection::field(Field::leaf("ok"))])
            .build();
        assert_eq!(
            request.to_document(),
            r#"mutation { upsert(input: {tags: ["a", "b"], active: true}) { ok } }"#,
        );
    }
}
