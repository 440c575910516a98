//! Assignment of merged-type fields to the subschemas that can supply them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::spec::Field;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::subschema::Subschema;

/// Static merge metadata for one composite type, built once at composition
/// time and shared read-only across every request.
pub struct MergedTypeInfo {
    type_name: String,

    /// For each source subschema, the other subschemas able to contribute
    /// more fields to objects originating from it, in declared order.
    target_subschemas: HashMap<String, Vec<Arc<Subschema>>>,

    /// Fields of the merged type owned by exactly one subschema.
    unique_fields: HashMap<String, Arc<Subschema>>,

    /// Fields resolvable by several subschemas, in declared preference order.
    non_unique_fields: HashMap<String, Vec<Arc<Subschema>>>,

    /// Whether a source subschema's version of the type carries enough fields
    /// to satisfy a target's merge key selection.
    contains: HashMap<(String, String), bool>,
}

impl MergedTypeInfo {
    /// Builds the merge metadata for `type_name` across the composed
    /// subschemas. Returns `None` when fewer than two subschemas declare the
    /// type or none of them declares a merge configuration for it.
    pub(crate) fn build(type_name: &str, subschemas: &[Arc<Subschema>]) -> Option<MergedTypeInfo> {
        let declaring: Vec<&Arc<Subschema>> = subschemas
            .iter()
            .filter(|subschema| {
                subschema
                    .schema()
                    .type_def(type_name)
                    .map(|def| def.is_composite())
                    .unwrap_or(false)
            })
            .collect();
        if declaring.len() < 2
            || !declaring
                .iter()
                .any(|subschema| subschema.merged_type_config(type_name).is_some())
        {
            return None;
        }

        let mut target_subschemas: HashMap<String, Vec<Arc<Subschema>>> = HashMap::new();
        let mut contains = HashMap::new();
        for source in &declaring {
            let targets: Vec<Arc<Subschema>> = declaring
                .iter()
                .filter(|target| {
                    target.name() != source.name()
                        && target.merged_type_config(type_name).is_some()
                })
                .map(|target| Arc::clone(target))
                .collect();
            for target in &targets {
                let satisfied = target
                    .merged_type_config(type_name)
                    .map(|config| {
                        satisfies_selection_set(
                            source.schema(),
                            type_name,
                            &config.selection_set,
                        )
                    })
                    .unwrap_or(false);
                contains.insert(
                    (source.name().to_string(), target.name().to_string()),
                    satisfied,
                );
            }
            target_subschemas.insert(source.name().to_string(), targets);
        }

        let mut unique_fields = HashMap::new();
        let mut non_unique_fields: HashMap<String, Vec<Arc<Subschema>>> = HashMap::new();
        let mut field_names: Vec<String> = Vec::new();
        for subschema in &declaring {
            if let Some(def) = subschema.schema().type_def(type_name) {
                for field_name in def.fields.keys() {
                    if !field_names.iter().any(|name| name == field_name) {
                        field_names.push(field_name.clone());
                    }
                }
            }
        }
        for field_name in field_names {
            let owners: Vec<Arc<Subschema>> = declaring
                .iter()
                .filter(|subschema| {
                    subschema
                        .schema()
                        .field_type(type_name, &field_name)
                        .is_some()
                })
                .map(|subschema| Arc::clone(subschema))
                .collect();
            match owners.len() {
                1 => {
                    unique_fields.insert(field_name, owners.into_iter().next()?);
                }
                _ => {
                    non_unique_fields.insert(field_name, owners);
                }
            }
        }

        Some(MergedTypeInfo {
            type_name: type_name.to_string(),
            target_subschemas,
            unique_fields,
            non_unique_fields,
            contains,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The merge targets for objects originating from `source`, the source
    /// itself excluded.
    pub fn targets_for(&self, source: &str) -> &[Arc<Subschema>] {
        self.target_subschemas
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn contains(&self, source: &str, target: &str) -> bool {
        self.contains
            .get(&(source.to_string(), target.to_string()))
            .copied()
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for MergedTypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedTypeInfo")
            .field("type_name", &self.type_name)
            .field(
                "unique_fields",
                &self
                    .unique_fields
                    .iter()
                    .map(|(field, owner)| (field.as_str(), owner.name()))
                    .collect::<HashMap<_, _>>(),
            )
            .field(
                "non_unique_fields",
                &self
                    .non_unique_fields
                    .iter()
                    .map(|(field, owners)| {
                        (
                            field.as_str(),
                            owners.iter().map(|owner| owner.name()).collect::<Vec<_>>(),
                        )
                    })
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

/// Whether `schema`'s version of `type_name` declares every field named by a
/// merge key selection set, recursively.
fn satisfies_selection_set(schema: &Schema, type_name: &str, selections: &[Selection]) -> bool {
    selections.iter().all(|selection| match selection {
        Selection::Field(field) => {
            if field.is_typename() {
                return true;
            }
            match schema.field_type(type_name, &field.name) {
                None => false,
                Some(field_type) => match &field.selections {
                    None => true,
                    Some(nested) => field_type
                        .inner_type_name()
                        .map(|inner| satisfies_selection_set(schema, inner, nested))
                        .unwrap_or(false),
                },
            }
        }
        Selection::InlineFragment(fragment) => {
            let on = fragment.type_condition.as_deref().unwrap_or(type_name);
            schema.has_type(on) && satisfies_selection_set(schema, on, &fragment.selections)
        }
    })
}

/// The outcome of one planning round.
#[derive(Clone, Debug)]
pub struct DelegationPlan {
    /// Target subschema and the selection set to request from it.
    pub delegation_map: Vec<(Arc<Subschema>, Vec<Selection>)>,

    /// Fields no eligible target can supply this round.
    pub unproxiable_fields: Vec<Field>,

    /// Targets reachable from the current sources' key data.
    pub proxiable_subschemas: Vec<Arc<Subschema>>,

    /// Targets whose key requirements the current sources cannot satisfy.
    pub non_proxiable_subschemas: Vec<Arc<Subschema>>,
}

/// Cache key for memoized plans. The planner is pure, so a plan can be reused
/// whenever all four inputs match by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PlanKey {
    type_name: String,
    fields: String,
    sources: Vec<String>,
    targets: Vec<String>,
}

impl PlanKey {
    pub(crate) fn new(
        info: &MergedTypeInfo,
        fields: &[Field],
        sources: &[Arc<Subschema>],
        targets: &[Arc<Subschema>],
    ) -> Self {
        let mut printed = String::new();
        crate::spec::write_selection_set(
            &mut printed,
            &fields
                .iter()
                .cloned()
                .map(Selection::Field)
                .collect::<Vec<_>>(),
        );
        PlanKey {
            type_name: info.type_name().to_string(),
            fields: printed,
            sources: sources.iter().map(|s| s.name().to_string()).collect(),
            targets: targets.iter().map(|s| s.name().to_string()).collect(),
        }
    }
}

/// Assigns each requested field to a target subschema able to resolve it.
///
/// Fields owned by a single subschema go to that owner or wait for a later
/// round if its key cannot yet be satisfied. Fields with several candidates
/// prefer a target already receiving fields this round, falling back to the
/// first candidate in declared order. Deterministic for identical inputs.
pub fn plan_delegation(
    info: &MergedTypeInfo,
    fields: &[Field],
    sources: &[Arc<Subschema>],
    targets: &[Arc<Subschema>],
) -> DelegationPlan {
    let mut proxiable_subschemas = Vec::new();
    let mut non_proxiable_subschemas = Vec::new();
    for target in targets {
        let reachable = sources
            .iter()
            .any(|source| info.contains(source.name(), target.name()));
        if reachable {
            proxiable_subschemas.push(Arc::clone(target));
        } else {
            non_proxiable_subschemas.push(Arc::clone(target));
        }
    }
    let proxiable = |name: &str| {
        proxiable_subschemas
            .iter()
            .find(|subschema| subschema.name() == name)
            .cloned()
    };

    let mut buckets: Vec<(Arc<Subschema>, Vec<Field>)> = Vec::new();
    let mut unproxiable_fields = Vec::new();
    for field in fields {
        // a type's own name is always locally resolvable
        if field.is_typename() {
            continue;
        }
        let chosen = if let Some(owner) = info.unique_fields.get(&field.name) {
            proxiable(owner.name())
        } else {
            match info.non_unique_fields.get(&field.name) {
                None => None,
                Some(candidates) => {
                    let eligible: Vec<Arc<Subschema>> = candidates
                        .iter()
                        .filter_map(|candidate| proxiable(candidate.name()))
                        .collect();
                    // keep one response together where possible
                    eligible
                        .iter()
                        .find(|candidate| {
                            buckets
                                .iter()
                                .any(|(target, _)| target.name() == candidate.name())
                        })
                        .or_else(|| eligible.first())
                        .cloned()
                }
            }
        };
        match chosen {
            None => unproxiable_fields.push(field.clone()),
            Some(target) => {
                match buckets
                    .iter_mut()
                    .find(|(existing, _)| existing.name() == target.name())
                {
                    Some((_, bucket)) => bucket.push(field.clone()),
                    None => buckets.push((target, vec![field.clone()])),
                }
            }
        }
    }

    DelegationPlan {
        delegation_map: buckets
            .into_iter()
            .map(|(target, fields)| {
                (
                    target,
                    fields.into_iter().map(Selection::Field).collect(),
                )
            })
            .collect(),
        unproxiable_fields,
        proxiable_subschemas,
        non_proxiable_subschemas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FieldType;
    use crate::spec::Schema;
    use crate::subschema::MergedTypeConfig;
    use crate::test_harness::MockExecutor;

    fn user_subschema(
        name: &str,
        fields: Vec<(&'static str, FieldType)>,
        merge: bool,
    ) -> Arc<Subschema> {
        let schema = Schema::new()
            .with_query_type("Query")
            .with_object("Query", [("userById", FieldType::named("User"))])
            .with_object("User", fields);
        let mut builder = Subschema::builder()
            .name(name)
            .schema(schema)
            .executor(Arc::new(MockExecutor::new(name)) as Arc<dyn crate::Executor>);
        if merge {
            builder = builder.merged_type(
                "User".to_string(),
                MergedTypeConfig::new(
                    "userById",
                    vec![Selection::field(Field::leaf("id"))],
                    Arc::new(|key| key.clone()),
                ),
            );
        }
        Arc::new(builder.build())
    }

    fn three_subschemas() -> (Arc<Subschema>, Arc<Subschema>, Arc<Subschema>) {
        (
            user_subschema(
                "a",
                vec![("id", FieldType::Id), ("name", FieldType::String)],
                true,
            ),
            user_subschema(
                "b",
                vec![
                    ("id", FieldType::Id),
                    ("email", FieldType::String),
                    ("phone", FieldType::String),
                ],
                true,
            ),
            user_subschema(
                "c",
                vec![("id", FieldType::Id), ("phone", FieldType::String)],
                true,
            ),
        )
    }

    fn info(subschemas: &[Arc<Subschema>]) -> MergedTypeInfo {
        MergedTypeInfo::build("User", subschemas).expect("merged type")
    }

    #[test]
    fn every_field_lands_in_exactly_one_place() {
        let (a, b, c) = three_subschemas();
        let all = vec![a.clone(), b.clone(), c.clone()];
        let info = info(&all);
        let fields = vec![
            Field::leaf("__typename"),
            Field::leaf("email"),
            Field::leaf("phone"),
            Field::leaf("nowhere"),
        ];
        let plan = plan_delegation(&info, &fields, &[a], &[b, c]);

        let mut placed: Vec<&str> = Vec::new();
        for (_, selections) in &plan.delegation_map {
            for selection in selections {
                if let Selection::Field(field) = selection {
                    placed.push(&field.name);
                }
            }
        }
        for field in &fields {
            if field.is_typename() {
                continue;
            }
            let in_map = placed.iter().filter(|name| **name == field.name).count();
            let in_unproxiable = plan
                .unproxiable_fields
                .iter()
                .filter(|f| f.name == field.name)
                .count();
            assert_eq!(in_map + in_unproxiable, 1, "field {}", field.name);
        }
        assert!(!placed.contains(&"__typename"));
    }

    #[test]
    fn non_unique_fields_prefer_an_already_chosen_target() {
        let (a, b, c) = three_subschemas();
        let all = vec![a.clone(), b.clone(), c.clone()];
        let info = info(&all);
        // email is unique to b; phone lives on both b and c, with c first in
        // declared order only after b already has a bucket
        let fields = vec![Field::leaf("email"), Field::leaf("phone")];
        let plan = plan_delegation(&info, &fields, &[a.clone()], &[b.clone(), c.clone()]);
        assert_eq!(plan.delegation_map.len(), 1);
        assert_eq!(plan.delegation_map[0].0.name(), "b");
        assert_eq!(plan.delegation_map[0].1.len(), 2);

        // without the email field, the first declared candidate wins
        let plan = plan_delegation(&info, &[Field::leaf("phone")], &[a], &[b, c]);
        assert_eq!(plan.delegation_map.len(), 1);
        assert_eq!(plan.delegation_map[0].0.name(), "b");
    }

    #[test]
    fn unique_fields_wait_for_their_owner_to_become_reachable() {
        // d owns age but its merge key is email, which a does not have
        let d = {
            let schema = Schema::new()
                .with_query_type("Query")
                .with_object("Query", [("userByEmail", FieldType::named("User"))])
                .with_object(
                    "User",
                    [("email", FieldType::String), ("age", FieldType::Int)],
                );
            Arc::new(
                Subschema::builder()
                    .name("d")
                    .schema(schema)
                    .executor(Arc::new(MockExecutor::new("d")) as Arc<dyn crate::Executor>)
                    .merged_type(
                        "User".to_string(),
                        MergedTypeConfig::new(
                            "userByEmail",
                            vec![Selection::field(Field::leaf("email"))],
                            Arc::new(|key| key.clone()),
                        ),
                    )
                    .build(),
            )
        };
        let (a, b, _) = three_subschemas();
        let all = vec![a.clone(), b.clone(), d.clone()];
        let info = info(&all);

        let fields = vec![Field::leaf("email"), Field::leaf("age")];
        let plan = plan_delegation(&info, &fields, &[a], &[b.clone(), d.clone()]);
        // age must wait: d's key (email) is not yet available from a
        assert_eq!(plan.unproxiable_fields.len(), 1);
        assert_eq!(plan.unproxiable_fields[0].name, "age");
        assert_eq!(plan.delegation_map.len(), 1);
        assert_eq!(plan.delegation_map[0].0.name(), "b");
        assert_eq!(
            plan.non_proxiable_subschemas
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>(),
            vec!["d"],
        );
    }

    #[test]
    fn planning_is_deterministic() {
        let (a, b, c) = three_subschemas();
        let all = vec![a.clone(), b.clone(), c.clone()];
        let info = info(&all);
        let fields = vec![Field::leaf("email"), Field::leaf("phone")];
        let first = plan_delegation(&info, &fields, &[a.clone()], &[b.clone(), c.clone()]);
        let second = plan_delegation(&info, &fields, &[a], &[b, c]);
        assert_eq!(
            format!("{:?}", first.delegation_map.iter().map(|(s, sel)| (s.name(), sel)).collect::<Vec<_>>()),
            format!("{:?}", second.delegation_map.iter().map(|(s, sel)| (s.name(), sel)).collect::<Vec<_>>()),
        );
        assert_eq!(first.unproxiable_fields, second.unproxiable_fields);
    }
}
