//! Declarative mapping of remote records into local field sets.
//!
//! A [`Mapper`] is an ordered list of named [`MappingRule`]s. Each rule reads the
//! remote record and returns a partial [`FieldSet`]; the mapper unions them.
//! Rules declare the keys they write up front, so overlapping rules are
//! rejected when the mapper is built instead of silently overwriting each other.

use std::collections::HashMap;

use futures::future::LocalBoxFuture;

use crate::binder::Binder;
use crate::error::AppError;
use crate::models::{Backend, FieldSet, Model, RemoteRecord};
use crate::ports::{BindingStore, ImageResizer};

/// Everything a mapping rule may consult besides the record itself.
pub struct MapContext<'a, S> {
    pub backend: &'a Backend,
    pub store: &'a S,
    pub resizer: &'a dyn ImageResizer,
}

impl<'a, S: BindingStore> MapContext<'a, S> {
    pub fn new(backend: &'a Backend, store: &'a S, resizer: &'a dyn ImageResizer) -> Self {
        Self {
            backend,
            store,
            resizer,
        }
    }

    /// Binder for `model`, scoped to this context's backend.
    pub fn binder_for(&self, model: Model) -> Binder<'a, S> {
        Binder::new(self.store, self.backend.id, model)
    }
}

pub type MapFuture<'a> = LocalBoxFuture<'a, Result<FieldSet, AppError>>;

/// Signature of a mapping rule.
pub type RuleFn<S> = for<'a> fn(&'a RemoteRecord, &'a MapContext<'a, S>) -> MapFuture<'a>;

/// A named rule and the keys it is allowed to write.
pub struct MappingRule<S> {
    pub name: &'static str,
    pub keys: &'static [&'static str],
    pub apply: RuleFn<S>,
}

/// Ordered set of key-disjoint mapping rules for one model.
pub struct Mapper<S> {
    model: Model,
    rules: Vec<MappingRule<S>>,
}

impl<S> std::fmt::Debug for Mapper<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("model", &self.model)
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<S> Mapper<S> {
    /// Builds a mapper, failing if two rules declare the same key.
    pub fn new(model: Model, rules: Vec<MappingRule<S>>) -> Result<Self, AppError> {
        let mut owners: HashMap<&'static str, &'static str> = HashMap::new();
        for rule in &rules {
            for key in rule.keys {
                if let Some(first) = owners.insert(key, rule.name) {
                    return Err(AppError::MapperConflict {
                        key: key.to_string(),
                        first: first.to_string(),
                        second: rule.name.to_string(),
                    });
                }
            }
        }
        Ok(Self { model, rules })
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Keys this mapper may produce, in rule order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().flat_map(|r| r.keys.iter().copied())
    }

    /// Runs every rule in order and unions their output.
    ///
    /// The first failing rule aborts the mapping.
    pub async fn map(
        &self,
        record: &RemoteRecord,
        ctx: &MapContext<'_, S>,
    ) -> Result<FieldSet, AppError> {
        let mut fields = FieldSet::new();
        for rule in &self.rules {
            let partial = (rule.apply)(record, ctx).await?;
            for (key, value) in partial {
                if !rule.keys.contains(&key.as_str()) {
                    return Err(AppError::Generic(format!(
                        "mapping rule `{}` wrote undeclared key `{}`",
                        rule.name, key
                    )));
                }
                fields.insert(key, value);
            }
        }
        tracing::trace!("Mapped {} record into {} fields", self.model, fields.len());
        Ok(fields)
    }
}
