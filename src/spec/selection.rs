use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

use crate::graphql::request::write_graphql_literal;
use crate::json_ext::Object;
use crate::spec::Schema;

pub const TYPENAME_FIELD: &str = "__typename";

/// A selection that is part of a sub-request.
///
/// Named fragments from the ambient operation are assumed to have been
/// inlined by the document utilities that produced these nodes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),
}

impl Selection {
    pub fn field(field: Field) -> Self {
        Selection::Field(field)
    }

    pub fn inline_fragment(type_condition: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::InlineFragment(InlineFragment {
            type_condition: Some(type_condition.into()),
            selections,
        })
    }
}

/// A selected field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// An optional alias for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// The name of the field.
    pub name: String,

    /// Inline argument values for the field.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub arguments: Object,

    /// The selections for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selections: Option<Vec<Selection>>,
}

impl Field {
    /// A leaf field with no alias, arguments or sub-selection.
    pub fn leaf(name: impl Into<String>) -> Self {
        Field {
            alias: None,
            name: name.into(),
            arguments: Object::new(),
            selections: None,
        }
    }

    pub fn composite(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Field {
            alias: None,
            name: name.into(),
            arguments: Object::new(),
            selections: Some(selections),
        }
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The key under which this field appears in response data.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.name.as_str())
    }

    pub fn is_typename(&self) -> bool {
        self.name == TYPENAME_FIELD
    }

    pub fn selection_set(&self) -> &[Selection] {
        self.selections.as_deref().unwrap_or_default()
    }
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// The required fragment type.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_condition: Option<String>,

    /// The selections from the fragment.
    pub selections: Vec<Selection>,
}

/// Collects the fields actually selected for objects of concrete type
/// `type_name`, flattening inline fragments whose condition applies. Fields
/// repeated under the same response key have their sub-selections merged.
pub fn collect_fields(selections: &[Selection], type_name: &str, schema: &Schema) -> Vec<Field> {
    let mut collected: Vec<Field> = Vec::new();
    collect_fields_inner(selections, type_name, schema, &mut collected);
    collected
}

fn collect_fields_inner(
    selections: &[Selection],
    type_name: &str,
    schema: &Schema,
    collected: &mut Vec<Field>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                match collected
                    .iter_mut()
                    .find(|existing| existing.response_key() == field.response_key())
                {
                    Some(existing) => {
                        if let Some(extra) = &field.selections {
                            existing
                                .selections
                                .get_or_insert_with(Vec::new)
                                .extend(extra.iter().cloned());
                        }
                    }
                    None => collected.push(field.clone()),
                }
            }
            Selection::InlineFragment(fragment) => {
                let applies = match &fragment.type_condition {
                    None => true,
                    Some(condition) => {
                        condition == type_name || schema.is_subtype(condition, type_name)
                    }
                };
                if applies {
                    collect_fields_inner(&fragment.selections, type_name, schema, collected);
                }
            }
        }
    }
}

/// Projects a selection set onto already-resolved data, used to derive the
/// merge-key object handed to a merge target's argument function.
pub fn execute_selection_set(input: &Value, selections: &[Selection], schema: &Schema) -> Value {
    let content = match input.as_object() {
        Some(object) => object,
        None => return Value::Null,
    };

    let mut output = Object::with_capacity(selections.len());
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let key = field.response_key();
                match content.get(key) {
                    None => return Value::Null,
                    Some(value) => {
                        if let Some(elements) = value.as_array() {
                            let selected = elements
                                .iter()
                                .map(|element| match &field.selections {
                                    Some(selections) => {
                                        execute_selection_set(element, selections, schema)
                                    }
                                    None => element.clone(),
                                })
                                .collect::<Vec<_>>();
                            output.insert(key.to_string(), Value::Array(selected));
                        } else if let Some(selections) = &field.selections {
                            output.insert(
                                key.to_string(),
                                execute_selection_set(value, selections, schema),
                            );
                        } else {
                            output.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
            Selection::InlineFragment(fragment) => {
                let applies = match &fragment.type_condition {
                    None => true,
                    Some(condition) => is_object_of_type(content, condition, schema),
                };
                if applies {
                    if let Value::Object(selected) =
                        execute_selection_set(input, &fragment.selections, schema)
                    {
                        for (key, value) in selected {
                            output.insert(key, value);
                        }
                    }
                }
            }
        }
    }

    Value::Object(output)
}

/// Whether the object's advertised `__typename` satisfies a type condition.
pub(crate) fn is_object_of_type(object: &Object, condition: &str, schema: &Schema) -> bool {
    let typename = match object.get(TYPENAME_FIELD).and_then(|v| v.as_str()) {
        None => return false,
        Some(t) => t,
    };
    typename == condition || schema.is_subtype(condition, typename)
}

/// Prints a selection set in GraphQL syntax, fields in declared order.
pub fn write_selection_set(out: &mut String, selections: &[Selection]) {
    out.push('{');
    for selection in selections {
        out.push(' ');
        match selection {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    let _ = write!(out, "{alias}: ");
                }
                out.push_str(&field.name);
                if !field.arguments.is_empty() {
                    out.push('(');
                    let mut first = true;
                    for (key, value) in &field.arguments {
                        if !first {
                            out.push_str(", ");
                        }
                        let _ = write!(out, "{}: ", key.as_str());
                        write_graphql_literal(out, value);
                        first = false;
                    }
                    out.push(')');
                }
                if let Some(selections) = &field.selections {
                    out.push(' ');
                    write_selection_set(out, selections);
                }
            }
            Selection::InlineFragment(fragment) => {
                match &fragment.type_condition {
                    Some(condition) => {
                        let _ = write!(out, "... on {condition} ");
                    }
                    None => out.push_str("... "),
                }
                write_selection_set(out, &fragment.selections);
            }
        }
    }
    out.push_str(" }");
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::spec::FieldType;

    fn schema() -> Schema {
        Schema::new()
            .with_query_type("Query")
            .with_object("Query", [("user", FieldType::named("User"))])
            .with_object(
                "User",
                [
                    ("id", FieldType::Id),
                    ("name", FieldType::String),
                    ("pet", FieldType::named("Pet")),
                ],
            )
            .with_interface("Pet", [("name", FieldType::String)], ["Dog"])
            .with_object("Dog", [("name", FieldType::String)])
    }

    #[test]
    fn collect_fields_flattens_matching_fragments() {
        let selections = vec![
            Selection::field(Field::leaf("id")),
            Selection::inline_fragment("User", vec![Selection::field(Field::leaf("name"))]),
            Selection::inline_fragment("Ghost", vec![Selection::field(Field::leaf("boo"))]),
        ];
        let fields = collect_fields(&selections, "User", &schema());
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn collect_fields_respects_abstract_conditions() {
        let selections = vec![Selection::inline_fragment(
            "Pet",
            vec![Selection::field(Field::leaf("name"))],
        )];
        let fields = collect_fields(&selections, "Dog", &schema());
        assert_eq!(fields.len(), 1);
        let fields = collect_fields(&selections, "User", &schema());
        assert!(fields.is_empty());
    }

    #[test]
    fn merge_key_projection() {
        let data = json!({
            "__typename": "User",
            "id": "1",
            "name": "Ada",
            "pet": { "__typename": "Dog", "name": "Rex" },
        });
        let selections = vec![
            Selection::field(Field::leaf("id")),
            Selection::field(Field::composite(
                "pet",
                vec![Selection::field(Field::leaf("name"))],
            )),
        ];
        assert_eq!(
            execute_selection_set(&data, &selections, &schema()),
            json!({ "id": "1", "pet": { "name": "Rex" } }),
        );
        // a missing key field nullifies the whole projection
        let missing = json!({ "name": "Ada" });
        let key = vec![Selection::field(Field::leaf("id"))];
        assert_eq!(
            execute_selection_set(&missing, &key, &schema()),
            Value::Null,
        );
    }

    #[test]
    fn printed_selection_sets_keep_declared_order() {
        let mut out = String::new();
        write_selection_set(
            &mut out,
            &[
                Selection::field(Field::leaf("id").aliased("ident")),
                Selection::inline_fragment("Dog", vec![Selection::field(Field::leaf("name"))]),
            ],
        );
        assert_eq!(out, "{ ident: id ... on Dog { name } }");
    }
}
