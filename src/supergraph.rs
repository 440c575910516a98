//! The composed schema: every subschema plus the merge metadata built from
//! them at composition time.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::batching::Batcher;
use crate::delegate::plan::plan_delegation;
use crate::delegate::plan::DelegationPlan;
use crate::delegate::plan::MergedTypeInfo;
use crate::delegate::plan::PlanKey;
use crate::spec::Field;
use crate::spec::FieldType;
use crate::subschema::Subschema;

/// The composed supergraph. Merge metadata and batchers are built once here
/// and shared read-only across every request; the only per-request state
/// lives in [`crate::delegate::DelegationContext`].
pub struct Supergraph {
    subschemas: IndexMap<String, Arc<Subschema>>,
    merged_types: HashMap<String, Arc<MergedTypeInfo>>,
    batchers: HashMap<String, Batcher>,

    // memoized planner results, keyed by the planner's four inputs
    plan_cache: Mutex<HashMap<PlanKey, Arc<DelegationPlan>>>,
}

impl Supergraph {
    /// Composes the given subschemas, in declared preference order.
    pub fn new(subschemas: Vec<Subschema>) -> Self {
        let subschemas: IndexMap<String, Arc<Subschema>> = subschemas
            .into_iter()
            .map(|subschema| (subschema.name().to_string(), Arc::new(subschema)))
            .collect();
        let ordered: Vec<Arc<Subschema>> = subschemas.values().cloned().collect();

        let mut merged_types = HashMap::new();
        for subschema in &ordered {
            for type_name in subschema.merged_type_names() {
                if merged_types.contains_key(type_name) {
                    continue;
                }
                if let Some(info) = MergedTypeInfo::build(type_name, &ordered) {
                    tracing::debug!(type_name, "composed merged type");
                    merged_types.insert(type_name.to_string(), Arc::new(info));
                }
            }
        }

        let batchers = ordered
            .iter()
            .filter_map(|subschema| {
                subschema.batching().map(|config| {
                    (
                        subschema.name().to_string(),
                        Batcher::new(subschema.clone(), config.clone()),
                    )
                })
            })
            .collect();

        Self {
            subschemas,
            merged_types,
            batchers,
            plan_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn subschema(&self, name: &str) -> Option<&Arc<Subschema>> {
        self.subschemas.get(name)
    }

    pub fn subschemas(&self) -> impl Iterator<Item = &Arc<Subschema>> {
        self.subschemas.values()
    }

    pub fn merged_type_info(&self, type_name: &str) -> Option<&Arc<MergedTypeInfo>> {
        self.merged_types.get(type_name)
    }

    /// Whether any composed subschema declares the type.
    pub fn knows_type(&self, type_name: &str) -> bool {
        self.subschemas
            .values()
            .any(|subschema| subschema.schema().has_type(type_name))
    }

    /// The declared type of a field in the composed schema: the first
    /// subschema (in declared order) whose version of the type carries it.
    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<FieldType> {
        self.subschemas
            .values()
            .find_map(|subschema| subschema.schema().field_type(type_name, field_name))
            .cloned()
    }

    /// Computes (or reuses) a delegation plan. The planner is pure, so the
    /// result is memoized for the lifetime of the composed schema.
    pub(crate) fn plan(
        &self,
        info: &MergedTypeInfo,
        fields: &[Field],
        sources: &[Arc<Subschema>],
        targets: &[Arc<Subschema>],
    ) -> Arc<DelegationPlan> {
        let key = PlanKey::new(info, fields, sources, targets);
        if let Some(plan) = self.plan_cache.lock().get(&key) {
            return plan.clone();
        }
        let plan = Arc::new(plan_delegation(info, fields, sources, targets));
        self.plan_cache
            .lock()
            .entry(key)
            .or_insert(plan)
            .clone()
    }

    pub(crate) fn batcher(&self, subschema_name: &str) -> Option<&Batcher> {
        self.batchers.get(subschema_name)
    }
}

impl std::fmt::Debug for Supergraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supergraph")
            .field("subschemas", &self.subschemas.keys().collect::<Vec<_>>())
            .field("merged_types", &self.merged_types.keys().collect::<Vec<_>>())
            .finish()
    }
}
