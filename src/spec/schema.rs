use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json_bytes::Value;

use crate::graphql::OperationKind;
use crate::spec::FieldType;
use crate::spec::InvalidValue;

/// Parses a raw leaf value returned by a backend into its final form.
pub type LeafParser = Arc<dyn Fn(Value) -> Result<Value, InvalidValue> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Scalar,
    Enum,
}

/// One named type of a subschema, reduced to what delegation needs: its
/// kind, its field map and, for abstract types, its possible concrete types.
#[derive(Clone)]
pub struct TypeDef {
    pub kind: TypeKind,
    pub fields: IndexMap<String, FieldType>,
    pub possible_types: Vec<String>,
}

impl TypeDef {
    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Union)
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Object | TypeKind::Interface | TypeKind::Union
        )
    }
}

/// The introspection surface of one subschema: a type map, root type names
/// and leaf value parsers. This is the narrow interface the delegation
/// engine consumes; schema building itself happens elsewhere.
#[derive(Clone, Default)]
pub struct Schema {
    types: IndexMap<String, TypeDef>,
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    leaf_parsers: HashMap<String, LeafParser>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = Some(name.into());
        self
    }

    pub fn with_mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    pub fn with_subscription_type(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = Some(name.into());
        self
    }

    pub fn with_object(
        mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (&'static str, FieldType)>,
    ) -> Self {
        self.types.insert(
            name.into(),
            TypeDef {
                kind: TypeKind::Object,
                fields: fields
                    .into_iter()
                    .map(|(name, ty)| (name.to_string(), ty))
                    .collect(),
                possible_types: Vec::new(),
            },
        );
        self
    }

    pub fn with_interface(
        mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (&'static str, FieldType)>,
        possible_types: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.types.insert(
            name.into(),
            TypeDef {
                kind: TypeKind::Interface,
                fields: fields
                    .into_iter()
                    .map(|(name, ty)| (name.to_string(), ty))
                    .collect(),
                possible_types: possible_types.into_iter().map(str::to_string).collect(),
            },
        );
        self
    }

    pub fn with_union(
        mut self,
        name: impl Into<String>,
        possible_types: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.types.insert(
            name.into(),
            TypeDef {
                kind: TypeKind::Union,
                fields: IndexMap::new(),
                possible_types: possible_types.into_iter().map(str::to_string).collect(),
            },
        );
        self
    }

    pub fn with_scalar(mut self, name: impl Into<String>, parser: Option<LeafParser>) -> Self {
        let name = name.into();
        if let Some(parser) = parser {
            self.leaf_parsers.insert(name.clone(), parser);
        }
        self.types.insert(
            name,
            TypeDef {
                kind: TypeKind::Scalar,
                fields: IndexMap::new(),
                possible_types: Vec::new(),
            },
        );
        self
    }

    pub fn with_enum(mut self, name: impl Into<String>) -> Self {
        self.types.insert(
            name.into(),
            TypeDef {
                kind: TypeKind::Enum,
                fields: IndexMap::new(),
                possible_types: Vec::new(),
            },
        );
        self
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// The declared type of `field_name` on type `type_name`, if both exist.
    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<&FieldType> {
        self.types.get(type_name)?.fields.get(field_name)
    }

    /// The root type for a given operation kind.
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => self.query_type.as_deref(),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Whether the field's declared type resolves to a leaf (scalar or enum)
    /// in this schema.
    pub fn is_leaf(&self, field_type: &FieldType) -> bool {
        if field_type.nullable().is_builtin_scalar() {
            return true;
        }
        match field_type.inner_type_name() {
            Some(name) => self
                .types
                .get(name)
                .map(|def| matches!(def.kind, TypeKind::Scalar | TypeKind::Enum))
                .unwrap_or(false),
            None => true,
        }
    }

    /// Applies the named type's leaf parse function to a raw backend value.
    /// Types without a registered parser pass values through unchanged.
    pub fn parse_leaf(&self, type_name: Option<&str>, value: Value) -> Result<Value, InvalidValue> {
        match type_name.and_then(|name| self.leaf_parsers.get(name)) {
            Some(parser) => parser(value),
            None => Ok(value),
        }
    }

    /// Whether `concrete` is a member/implementation of abstract type `name`.
    pub fn is_subtype(&self, name: &str, concrete: &str) -> bool {
        self.types
            .get(name)
            .map(|def| def.possible_types.iter().any(|ty| ty == concrete))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("subscription_type", &self.subscription_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn leaf_detection_covers_scalars_and_enums() {
        let schema = Schema::new()
            .with_query_type("Query")
            .with_object("Query", [("user", FieldType::named("User"))])
            .with_object("User", [("id", FieldType::Id)])
            .with_scalar("DateTime", None)
            .with_enum("Role");

        assert!(schema.is_leaf(&FieldType::Id));
        assert!(schema.is_leaf(&FieldType::named("DateTime")));
        assert!(schema.is_leaf(&FieldType::named("Role")));
        assert!(!schema.is_leaf(&FieldType::named("User")));
        assert!(schema.is_leaf(&FieldType::non_null(FieldType::String)));
    }

    #[test]
    fn leaf_parsers_are_applied_by_type_name() {
        let schema = Schema::new().with_scalar(
            "Upper",
            Some(Arc::new(|value: Value| match value.as_str() {
                Some(s) => Ok(Value::String(s.to_uppercase().into())),
                None => Err(InvalidValue),
            })),
        );
        assert_eq!(
            schema.parse_leaf(Some("Upper"), json!("ok")).unwrap(),
            json!("OK"),
        );
        assert!(schema.parse_leaf(Some("Upper"), json!(3)).is_err());
        assert_eq!(schema.parse_leaf(None, json!(3)).unwrap(), json!(3));
    }
}
