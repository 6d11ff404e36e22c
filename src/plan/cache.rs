use super::FlattenPlan;
use crate::error::{FlatsheetError, FlatsheetResult};
use crate::schema::{schema_of, Record, Schema, SchemaRef};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Plans of registered record types, shared process-wide
static RECORD_PLANS: Lazy<PlanCache<TypeId>> = Lazy::new(PlanCache::new);

/// Compute-once store of flatten plans
///
/// Concurrent first requests for one key build the plan once; the others wait
/// on the shard lock and receive the same `Arc`. Failed builds are not stored.
#[derive(Debug)]
pub struct PlanCache<K: Eq + Hash> {
    plans: DashMap<K, Arc<FlattenPlan>>,
}

impl<K: Eq + Hash> Default for PlanCache<K> {
    fn default() -> Self {
        Self {
            plans: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash> PlanCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<F>(&self, key: K, build: F) -> FlatsheetResult<Arc<FlattenPlan>>
    where
        F: FnOnce() -> FlatsheetResult<FlattenPlan>,
    {
        if let Some(plan) = self.plans.get(&key) {
            return Ok(Arc::clone(plan.value()));
        }

        match self.plans.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let plan = Arc::new(build()?);
                debug!(record = %plan.type_name, "cached flatten plan");
                entry.insert(Arc::clone(&plan));
                Ok(plan)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Flatten plan of a registered record type, analyzed on first use
pub fn analyze<T: Record>() -> FlatsheetResult<Arc<FlattenPlan>> {
    RECORD_PLANS.get_or_build(TypeId::of::<T>(), || {
        FlattenPlan::build(&schema_of::<T>(), &resolve_registered)
    })
}

fn resolve_registered(reference: &SchemaRef) -> FlatsheetResult<Schema> {
    match reference {
        SchemaRef::Record(schema) => Ok(schema()),
        SchemaRef::Named(name) => Err(FlatsheetError::InvalidSchema(format!(
            "type '{}' is only known to a catalog",
            name
        ))),
    }
}
