//! The default resolver for fields of a merged schema, and completion of
//! reconciled values into final response data.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::delegate::external::ResolvedValue;
use crate::delegate::resolve::resolve_external_value;
use crate::delegate::DelegationContext;
use crate::error::DelegationError;
use crate::graphql;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::spec::collect_fields;
use crate::spec::Field;
use crate::spec::FieldType;
use crate::spec::Selection;

/// The default resolver for one field of a merged schema.
///
/// When the parent was produced by delegation, the pre-fetched value at the
/// field's response key is handed to reconciliation together with its
/// per-field errors and owning subschema, which may trigger further merge
/// delegation for composite children. A plain parent (some custom resolver
/// replaced the delegated object) falls back to ordinary field access.
pub async fn resolve_merged_field(
    parent: &ResolvedValue,
    field: &Field,
    field_type: &FieldType,
    ctx: &DelegationContext,
) -> Result<ResolvedValue, DelegationError> {
    let key = field.response_key();
    match parent {
        // nothing to resolve from; the parent's error was already reported
        ResolvedValue::Null | ResolvedValue::Error(_) | ResolvedValue::List(_) => {
            Ok(ResolvedValue::Null)
        }
        ResolvedValue::Leaf(value) => Ok(value
            .as_object()
            .and_then(|object| object.get(key))
            .cloned()
            .map(ResolvedValue::Leaf)
            .unwrap_or(ResolvedValue::Null)),
        ResolvedValue::Object(object) => {
            let value = object.field(key).cloned().unwrap_or(Value::Null);
            let errors = object.errors_for_key(key);
            let subschema = object.subschema_for_key(key);
            resolve_external_value(
                value,
                errors,
                subschema,
                field_type.clone(),
                field.selection_set().to_vec(),
                ctx.clone(),
            )
            .await
        }
    }
}

/// Completes a reconciled value into response data, collecting every error
/// with its path rebased to the overall operation root.
pub fn complete_value(
    value: ResolvedValue,
    type_name: Option<String>,
    selections: Vec<Selection>,
    path: Path,
    ctx: DelegationContext,
) -> BoxFuture<'static, Result<(Value, Vec<graphql::Error>), DelegationError>> {
    async move {
        match value {
            ResolvedValue::Null => Ok((Value::Null, Vec::new())),
            ResolvedValue::Error(error) => {
                let rebased = match &error.path {
                    Some(relative) => path.join(relative),
                    None => path,
                };
                Ok((Value::Null, vec![error.relocate(rebased)]))
            }
            ResolvedValue::Leaf(value) => Ok((value, Vec::new())),
            ResolvedValue::List(items) => {
                let mut completed = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (index, item) in items.into_iter().enumerate() {
                    let mut item_path = path.clone();
                    item_path.push(index);
                    let (value, item_errors) = complete_value(
                        item,
                        type_name.clone(),
                        selections.clone(),
                        item_path,
                        ctx.clone(),
                    )
                    .await?;
                    completed.push(value);
                    errors.extend(item_errors);
                }
                Ok((Value::Array(completed), errors))
            }
            ResolvedValue::Object(object) => {
                let concrete = match object.typename().map(str::to_string).or(type_name) {
                    Some(concrete) => concrete,
                    // without a type there is nothing to walk; expose the
                    // data exactly as fetched
                    None => {
                        return Ok((Value::Object(object.data().clone()), Vec::new()));
                    }
                };

                let fields = collect_fields(&selections, &concrete, object.subschema().schema());
                let resolved_keys: Vec<&str> =
                    fields.iter().map(Field::response_key).collect();
                // errors no resolving field will claim surface here, unpathed
                let mut errors: Vec<graphql::Error> = object
                    .stranded_errors(&resolved_keys)
                    .into_iter()
                    .map(|error| error.relocate(path.clone()))
                    .collect();
                let mut completed = Object::new();
                let parent = ResolvedValue::Object(object.clone());
                for field in fields {
                    let key = field.response_key();
                    if field.is_typename() {
                        completed.insert(
                            ByteString::from(key),
                            Value::String(ByteString::from(concrete.as_str())),
                        );
                        continue;
                    }
                    let field_type = match ctx.supergraph.field_type(&concrete, &field.name) {
                        Some(field_type) => field_type,
                        None => {
                            completed.insert(ByteString::from(key), Value::Null);
                            continue;
                        }
                    };
                    let child = resolve_merged_field(&parent, &field, &field_type, &ctx).await?;
                    let mut child_path = path.clone();
                    child_path.push(key);
                    let (value, child_errors) = complete_value(
                        child,
                        field_type.inner_type_name().map(str::to_string),
                        field.selection_set().to_vec(),
                        child_path,
                        ctx.clone(),
                    )
                    .await?;
                    completed.insert(ByteString::from(key), value);
                    errors.extend(child_errors);
                }
                Ok((Value::Object(completed), errors))
            }
        }
    }
    .boxed()
}

/// Assembles a final response for a reconciled root value: data shaped by the
/// selection set, errors rebased to the operation root and reported at most
/// once each.
pub async fn assemble(
    root: ResolvedValue,
    type_name: &str,
    selections: &[Selection],
    root_path: Path,
    ctx: &DelegationContext,
) -> Result<Response, DelegationError> {
    let (data, errors) = complete_value(
        root,
        Some(type_name.to_string()),
        selections.to_vec(),
        root_path,
        ctx.clone(),
    )
    .await?;

    let mut deduplicated: Vec<graphql::Error> = Vec::with_capacity(errors.len());
    for error in errors {
        if !deduplicated.iter().any(|seen| seen.id() == error.id()) {
            deduplicated.push(error);
        }
    }
    Ok(Response::builder()
        .data(data)
        .errors(deduplicated)
        .build())
}
