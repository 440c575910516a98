//! Recursive reconciliation of raw backend values against their declared
//! return types.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json_bytes::Value;

use crate::delegate::external::ExternalObject;
use crate::delegate::external::ResolvedValue;
use crate::delegate::merge::merge_fields;
use crate::delegate::DelegationContext;
use crate::error::ConfigurationError;
use crate::error::DelegationError;
use crate::graphql;
use crate::graphql::collapse_errors;
use crate::json_ext::PathElement;
use crate::spec::collect_fields;
use crate::spec::FieldType;
use crate::spec::Selection;
use crate::subschema::Subschema;

/// Reconciles one raw value returned by a backend for a field of declared
/// type `field_type`.
///
/// The recursion is driven by the type shape: nulls collapse with their
/// errors, leaves go through the type's parse function, lists distribute
/// errors by index and recurse per element, and composite objects are
/// annotated and, when other subschemas can still contribute requested
/// fields, merged to a fixed point.
pub fn resolve_external_value(
    value: Value,
    errors: Vec<graphql::Error>,
    subschema: Arc<Subschema>,
    field_type: FieldType,
    selections: Vec<Selection>,
    ctx: DelegationContext,
) -> BoxFuture<'static, Result<ResolvedValue, DelegationError>> {
    async move {
        if value.is_null() {
            return Ok(match collapse_errors(errors) {
                None => ResolvedValue::Null,
                Some(error) => ResolvedValue::Error(Box::new(error)),
            });
        }

        if subschema.schema().is_leaf(&field_type) {
            return Ok(
                match subschema
                    .schema()
                    .parse_leaf(field_type.inner_type_name(), value)
                {
                    Ok(parsed) => ResolvedValue::Leaf(parsed),
                    Err(_) => ResolvedValue::Error(Box::new(
                        graphql::Error::builder()
                            .message(format!(
                                "subschema '{}' returned an invalid value for type '{field_type}'",
                                subschema.name(),
                            ))
                            .extension_code("INVALID_LEAF_VALUE")
                            .build(),
                    )),
                },
            );
        }

        if let FieldType::List(element_type) = field_type.nullable() {
            return resolve_list(value, errors, subschema, element_type, selections, ctx).await;
        }

        resolve_object(value, errors, subschema, &field_type, selections, ctx).await
    }
    .boxed()
}

async fn resolve_list(
    value: Value,
    errors: Vec<graphql::Error>,
    subschema: Arc<Subschema>,
    element_type: &FieldType,
    selections: Vec<Selection>,
    ctx: DelegationContext,
) -> Result<ResolvedValue, DelegationError> {
    let elements = match value {
        Value::Array(elements) => elements,
        other => {
            return Ok(shape_mismatch(&subschema, "a list", &other));
        }
    };

    let mut resolved = Vec::with_capacity(elements.len());
    for (index, element) in elements.into_iter().enumerate() {
        let element_errors = errors
            .iter()
            .filter(|error| {
                matches!(
                    error.path.as_ref().and_then(|path| path.first()),
                    Some(PathElement::Index(i)) if *i == index
                )
            })
            .map(graphql::Error::sliced)
            .collect();
        resolved.push(
            resolve_external_value(
                element,
                element_errors,
                subschema.clone(),
                element_type.clone(),
                selections.clone(),
                ctx.clone(),
            )
            .await?,
        );
    }
    Ok(ResolvedValue::List(resolved))
}

async fn resolve_object(
    value: Value,
    errors: Vec<graphql::Error>,
    subschema: Arc<Subschema>,
    field_type: &FieldType,
    selections: Vec<Selection>,
    ctx: DelegationContext,
) -> Result<ResolvedValue, DelegationError> {
    let data = match value {
        Value::Object(data) => data,
        other => {
            return Ok(shape_mismatch(&subschema, "an object", &other));
        }
    };
    let object = ExternalObject::new(data, errors, subschema.clone());
    if ctx.skip_merge {
        return Ok(ResolvedValue::Object(object));
    }

    // abstract types fold into the concrete case through `__typename`
    let declared = field_type.inner_type_name();
    let type_name = match object.typename() {
        Some(advertised) => {
            if !ctx.supergraph.knows_type(advertised) {
                return Err(ConfigurationError::UnknownTypename {
                    typename: advertised.to_string(),
                }
                .into());
            }
            advertised.to_string()
        }
        None => match declared {
            Some(declared) => declared.to_string(),
            None => return Ok(ResolvedValue::Object(object)),
        },
    };

    let info = match ctx.supergraph.merged_type_info(&type_name) {
        Some(info) => info.clone(),
        None => return Ok(ResolvedValue::Object(object)),
    };
    let targets = info.targets_for(subschema.name()).to_vec();
    if targets.is_empty() {
        return Ok(ResolvedValue::Object(object));
    }

    // the fields this round must fetch elsewhere: requested but absent from
    // the source subschema's version of the type
    let unresolved: Vec<_> = collect_fields(&selections, &type_name, subschema.schema())
        .into_iter()
        .filter(|field| {
            !field.is_typename()
                && subschema
                    .schema()
                    .field_type(&type_name, &field.name)
                    .is_none()
        })
        .collect();
    if unresolved.is_empty() {
        return Ok(ResolvedValue::Object(object));
    }

    let merged = merge_fields(object, info, unresolved, vec![subschema], targets, ctx).await?;
    Ok(ResolvedValue::Object(merged))
}

fn shape_mismatch(subschema: &Subschema, expected: &str, got: &Value) -> ResolvedValue {
    ResolvedValue::Error(Box::new(
        graphql::Error::builder()
            .message(format!(
                "subschema '{}' returned {got:?} where {expected} was expected",
                subschema.name(),
            ))
            .extension_code("SUBREQUEST_MALFORMED_RESPONSE")
            .build(),
    ))
}
