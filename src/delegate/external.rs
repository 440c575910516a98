//! Annotation of backend-produced objects with their origin and errors.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json_bytes::Value;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::PathElement;
use crate::subschema::Subschema;

/// A value after reconciliation against its declared return type.
///
/// The discriminant is how callers tell an annotated delegation result from a
/// plain value: only [`ResolvedValue::Object`] carries merge bookkeeping, and
/// that bookkeeping never appears in serialized response data.
#[derive(Clone, Debug)]
pub enum ResolvedValue {
    /// A null position with no associated error.
    Null,

    /// A null position standing in for the error(s) that produced it.
    Error(Box<Error>),

    /// A parsed leaf value, or a plain (non-delegated) parent value.
    Leaf(Value),

    /// A list, each element reconciled independently.
    List(Vec<ResolvedValue>),

    /// A composite object fetched through delegation.
    Object(ExternalObject),
}

impl ResolvedValue {
    /// Whether this value carries delegation annotations.
    pub fn is_external_object(&self) -> bool {
        matches!(self, ResolvedValue::Object(_))
    }
}

/// An object produced by resolving a field through delegation, carrying the
/// subschema that produced it and the errors pertaining to its own fields.
///
/// Error paths are relative to this object: segment 0 names one of its
/// fields. After a merge, `field_subschemas` records which subschema supplied
/// each individual field.
#[derive(Clone)]
pub struct ExternalObject {
    data: Object,
    errors: Vec<Error>,
    subschema: Arc<Subschema>,
    field_subschemas: HashMap<String, Arc<Subschema>>,
}

impl ExternalObject {
    pub fn new(data: Object, errors: Vec<Error>, subschema: Arc<Subschema>) -> Self {
        Self {
            data,
            errors,
            subschema,
            field_subschemas: HashMap::new(),
        }
    }

    /// The object's visible fields, exactly as the backend returned them.
    pub fn data(&self) -> &Object {
        &self.data
    }

    /// The raw value held at a response key, if any.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Every error attached to this object, paths relative to it.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The subschema that produced the object's own (non-merged) fields.
    pub fn subschema(&self) -> &Arc<Subschema> {
        &self.subschema
    }

    /// The concrete type advertised by the object, if the backend was asked
    /// for it.
    pub fn typename(&self) -> Option<&str> {
        self.data.get(crate::spec::TYPENAME_FIELD).and_then(Value::as_str)
    }

    /// The attached errors whose first path segment is `key`, already sliced
    /// so their paths are relative to the value held at that key. Unpathed
    /// errors and errors for other keys stay with this object.
    pub fn errors_for_key(&self, key: &str) -> Vec<Error> {
        self.errors
            .iter()
            .filter(|error| match error.path.as_ref().and_then(|path| path.first()) {
                Some(PathElement::Key(first)) => first == key,
                _ => false,
            })
            .map(Error::sliced)
            .collect()
    }

    /// The attached errors not attributable to any specific field.
    pub fn unpathed_errors(&self) -> Vec<&Error> {
        self.errors.iter().filter(|error| error.is_unpathed()).collect()
    }

    /// The attached errors no field in `resolved_keys` will claim: unpathed
    /// errors plus errors whose leading segment names a field outside the
    /// resolving selection. These stay associated with the object itself so
    /// they are reported rather than dropped.
    pub fn stranded_errors(&self, resolved_keys: &[&str]) -> Vec<&Error> {
        self.errors
            .iter()
            .filter(|error| match error.path.as_ref().and_then(|path| path.first()) {
                Some(PathElement::Key(first)) => {
                    !resolved_keys.iter().any(|key| *key == first.as_str())
                }
                _ => true,
            })
            .collect()
    }

    /// The subschema that supplied the value at `key`: the per-field
    /// attribution recorded during merging when present, the object's own
    /// subschema otherwise.
    pub fn subschema_for_key(&self, key: &str) -> Arc<Subschema> {
        self.field_subschemas
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.subschema.clone())
    }

    /// Folds a partial result fetched from a merge target into this object.
    ///
    /// The partial's fields overwrite or extend this object's data, each
    /// incoming key is attributed to the partial's subschema, and the
    /// partial's errors (already relative to the shared object) are appended.
    /// Errors already present are recognized by identity and never
    /// duplicated.
    pub(crate) fn merge_partial(&mut self, partial: ExternalObject) {
        for (key, value) in partial.data {
            self.field_subschemas
                .insert(key.as_str().to_string(), partial.subschema.clone());
            self.data.insert(key, value);
        }
        self.append_errors(partial.errors);
    }

    /// Appends errors, skipping any already attached (by identity).
    pub(crate) fn append_errors(&mut self, errors: impl IntoIterator<Item = Error>) {
        for error in errors {
            if !self.errors.iter().any(|existing| existing.id() == error.id()) {
                self.errors.push(error);
            }
        }
    }
}

impl std::fmt::Debug for ExternalObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalObject")
            .field("data", &self.data)
            .field("errors", &self.errors)
            .field("subschema", &self.subschema.name())
            .field(
                "field_subschemas",
                &self
                    .field_subschemas
                    .iter()
                    .map(|(key, subschema)| (key.as_str(), subschema.name()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Path;
    use crate::spec::FieldType;
    use crate::spec::Schema;
    use crate::test_harness::MockExecutor;

    fn subschema(name: &str) -> Arc<Subschema> {
        Arc::new(
            Subschema::builder()
                .name(name)
                .schema(
                    Schema::new()
                        .with_query_type("Query")
                        .with_object("Query", [("user", FieldType::named("User"))])
                        .with_object("User", [("id", FieldType::Id)]),
                )
                .executor(Arc::new(MockExecutor::new(name)) as Arc<dyn crate::Executor>)
                .build(),
        )
    }

    fn object_data() -> Object {
        json!({ "id": "1", "name": null })
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn errors_are_selected_and_sliced_by_key() {
        let errors = vec![
            Error::builder().message("a").path(Path::from("name/first")).build(),
            Error::builder().message("b").path(Path::from("other")).build(),
            Error::builder().message("c").build(),
        ];
        let object = ExternalObject::new(object_data(), errors, subschema("users"));

        let for_name = object.errors_for_key("name");
        assert_eq!(for_name.len(), 1);
        assert_eq!(for_name[0].path, Some(Path::from("first")));
        assert!(object.errors_for_key("id").is_empty());
        assert_eq!(object.unpathed_errors().len(), 1);
    }

    #[test]
    fn errors_nobody_claims_are_stranded_with_the_object() {
        let errors = vec![
            Error::builder().message("claimed").path(Path::from("name")).build(),
            Error::builder().message("orphan").path(Path::from("ghost/deep")).build(),
            Error::builder().message("general").build(),
        ];
        let object = ExternalObject::new(object_data(), errors, subschema("users"));

        let stranded = object.stranded_errors(&["id", "name"]);
        let messages: Vec<&str> =
            stranded.iter().map(|error| error.message.as_str()).collect();
        assert_eq!(messages, vec!["orphan", "general"]);
        // a selection that resolves the key claims the error back
        assert_eq!(object.stranded_errors(&["id", "name", "ghost"]).len(), 1);
    }

    #[test]
    fn merging_attributes_fields_and_never_duplicates_errors() {
        let shared = Error::builder().message("shared").build();
        let users = subschema("users");
        let reviews = subschema("reviews");

        let mut object =
            ExternalObject::new(object_data(), vec![shared.clone()], users.clone());
        let partial = ExternalObject::new(
            json!({ "email": "a@b.c" }).as_object().cloned().unwrap_or_default(),
            vec![shared, Error::builder().message("new").build()],
            reviews.clone(),
        );
        object.merge_partial(partial.clone());
        // merging the same partial again changes nothing
        object.merge_partial(partial);

        assert_eq!(object.field("email"), Some(&json!("a@b.c")));
        assert_eq!(object.field("id"), Some(&json!("1")));
        assert_eq!(object.errors().len(), 2);
        assert_eq!(object.subschema_for_key("email").name(), "reviews");
        assert_eq!(object.subschema_for_key("id").name(), "users");
    }
}
