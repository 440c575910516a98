//! The merge fixed-point: fetching the fields other subschemas can still
//! contribute to one object and folding them into it.

use std::sync::Arc;

use futures::future::join_all;
use serde_json_bytes::Value;

use crate::delegate::delegate_request;
use crate::delegate::external::ExternalObject;
use crate::delegate::external::ResolvedValue;
use crate::delegate::plan::MergedTypeInfo;
use crate::delegate::Delegated;
use crate::delegate::DelegationContext;
use crate::error::ConfigurationError;
use crate::error::DelegationError;
use crate::graphql;
use crate::graphql::OperationKind;
use crate::graphql::Request;
use crate::json_ext::Path;
use crate::spec::Field;
use crate::spec::FieldType;
use crate::spec::Selection;
use crate::subschema::Subschema;

/// What one merge target contributed for one round.
enum Partial {
    /// A partial object to fold into the accumulator.
    Object(ExternalObject),

    /// The target resolved the key to nothing.
    Missing,

    /// The fetch failed with a data-level error; it lands on the
    /// accumulator instead of aborting the round.
    Failed(graphql::Error),
}

/// Drives merge rounds to a fixed point.
///
/// Each round plans the still-unresolved fields against the remaining
/// targets, issues every fetch of the round concurrently, folds the partial
/// results in, and then retries the leftover fields with the sources extended
/// by the subschemas just queried. Terminates because the target set strictly
/// shrinks each round. Sibling fetch failures never abort the round; only
/// configuration errors and cancellation propagate.
pub(crate) async fn merge_fields(
    mut object: ExternalObject,
    info: Arc<MergedTypeInfo>,
    mut fields: Vec<Field>,
    mut sources: Vec<Arc<Subschema>>,
    mut targets: Vec<Arc<Subschema>>,
    ctx: DelegationContext,
) -> Result<ExternalObject, DelegationError> {
    while !fields.is_empty() && !targets.is_empty() {
        let plan = ctx.supergraph.plan(&info, &fields, &sources, &targets);
        if plan.delegation_map.is_empty() {
            break;
        }
        tracing::debug!(
            type_name = info.type_name(),
            round_targets = plan.delegation_map.len(),
            "merge round",
        );

        // true fan-out: every fetch of the round is issued before any is awaited
        let round = plan.delegation_map.iter().map(|(target, selections)| {
            fetch_partial(&object, &info, target.clone(), selections.clone(), &ctx)
        });
        let results = join_all(round).await;
        for (result, (_, selections)) in results.into_iter().zip(&plan.delegation_map) {
            match result {
                Ok(Partial::Object(partial)) => object.merge_partial(partial),
                Ok(Partial::Missing) => {}
                Ok(Partial::Failed(error)) => attach_failure(&mut object, &error, selections),
                Err(error) if error.is_configuration() => return Err(error),
                Err(DelegationError::Cancelled) => return Err(DelegationError::Cancelled),
                Err(error) => {
                    attach_failure(&mut object, &error.to_graphql_error(None), selections);
                }
            }
        }

        fields = plan.unproxiable_fields.clone();
        sources.extend(plan.proxiable_subschemas.iter().cloned());
        targets = plan.non_proxiable_subschemas.clone();
    }
    Ok(object)
}

/// Records a failed merge fetch on the accumulator, one located error per
/// field the failed target was supposed to supply, so that each of those
/// fields resolves to null with the failure at its own response path.
fn attach_failure(
    object: &mut ExternalObject,
    error: &graphql::Error,
    selections: &[Selection],
) {
    let mut attached = false;
    for selection in selections {
        if let Selection::Field(field) = selection {
            object.append_errors([graphql::Error::builder()
                .message(error.message.clone())
                .path(Path::from_response_key(field.response_key()))
                .extensions(error.extensions.clone())
                .build()]);
            attached = true;
        }
    }
    if !attached {
        object.append_errors([error.clone()]);
    }
}

/// Fetches one target's assigned selection set, deriving the root field
/// arguments from the accumulator through the target's merge configuration.
async fn fetch_partial(
    object: &ExternalObject,
    info: &MergedTypeInfo,
    target: Arc<Subschema>,
    selections: Vec<Selection>,
    ctx: &DelegationContext,
) -> Result<Partial, DelegationError> {
    let type_name = info.type_name();
    let config = target.merged_type_config(type_name).ok_or_else(|| {
        ConfigurationError::MissingMergeConfig {
            type_name: type_name.to_string(),
            service: target.name().to_string(),
        }
    })?;
    let root_field_known = target
        .schema()
        .root_type(OperationKind::Query)
        .and_then(|root| target.schema().field_type(root, &config.field_name))
        .is_some();
    if !root_field_known {
        return Err(ConfigurationError::InvalidMergeConfig {
            type_name: type_name.to_string(),
            service: target.name().to_string(),
            field_name: config.field_name.clone(),
        }
        .into());
    }

    let key = crate::spec::execute_selection_set(
        &Value::Object(object.data().clone()),
        &config.selection_set,
        target.schema(),
    );
    let key = match key {
        Value::Object(key) => key,
        _ => {
            return Err(DelegationError::SubrequestError {
                service: target.name().to_string(),
                reason: format!(
                    "merge key for type '{type_name}' could not be derived from available data"
                ),
            });
        }
    };

    let request = Request::builder()
        .operation_kind(OperationKind::Query)
        .field_name(config.field_name.clone())
        .arguments((config.key_args)(&key))
        .selections(selections)
        .variables(ctx.variables.clone())
        .build();

    // the fetched partial must not itself start merging; this round's caller
    // owns the fixed point
    let delegated =
        delegate_request(&ctx.for_merge(), &target, request, &FieldType::named(type_name)).await?;
    match delegated {
        Delegated::Value(ResolvedValue::Object(partial)) => Ok(Partial::Object(partial)),
        Delegated::Value(ResolvedValue::Null) => Ok(Partial::Missing),
        Delegated::Value(ResolvedValue::Error(error)) => Ok(Partial::Failed(*error)),
        Delegated::Value(_) | Delegated::Stream(_) => {
            Err(DelegationError::SubrequestMalformedResponse {
                service: target.name().to_string(),
                reason: format!("merge fetch for type '{type_name}' did not return an object"),
            })
        }
    }
}
