use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::MetadataError;
use crate::table::Table;

/// The read-only façade over whatever the host application uses to store
/// table metadata. This is the boundary the spec calls out as an external
/// collaborator: the core only ever needs `getTable`/`listTables`, so it is
/// expressed here as a trait rather than a concrete cache implementation.
pub trait MetadataProvider: Send + Sync {
    fn get_table(&self, name: &str) -> Option<Arc<Table>>;
    fn list_tables(&self) -> Vec<Arc<Table>>;
}

/// Read-only façade the rest of the core is built against. Wraps whatever
/// [`MetadataProvider`] the host supplies and adds the lookups the planner
/// and walker need on top of raw table access.
pub struct MetadataView {
    provider: Arc<dyn MetadataProvider>,
}

impl MetadataView {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>, MetadataError> {
        self.provider
            .get_table(name)
            .ok_or_else(|| MetadataError::TableNotFound(name.to_string()))
    }

    pub fn list_tables(&self) -> Vec<Arc<Table>> {
        self.provider.list_tables()
    }

    /// Resolves the junction table for a many-to-many relation, preferring
    /// metadata that already carries the triple and falling back to the
    /// naming convention otherwise.
    pub fn junction_for(
        &self,
        table: &Table,
        property_name: &str,
    ) -> Result<crate::relation::JunctionTable, MetadataError> {
        let relation = table
            .relation(property_name)
            .ok_or_else(|| MetadataError::PropertyNotFound {
                table: table.name.clone(),
                property: property_name.to_string(),
            })?;
        match relation.junction() {
            Some(j) => Ok(j.clone()),
            None => Ok(crate::relation::JunctionTable::by_convention(
                &table.name,
                property_name,
                &relation.target_table,
            )),
        }
    }

    /// Locates the inverse relation for an inverse-side relation (one-to-many
    /// or inverse one-to-one), i.e. the `Owner` relation on the target table
    /// whose `inverse_property_name` points back at us, or whose own
    /// `inverse_property_name` matches our property name.
    pub fn inverse_owner<'a>(
        &self,
        source_table: &Table,
        relation: &'a crate::relation::Relation,
    ) -> Result<Arc<Table>, MetadataError> {
        let target = self.table(&relation.target_table)?;

        let found = target.owned_relations().any(|candidate| {
            candidate.target_table == source_table.name
                && (candidate.inverse_property_name.as_deref() == Some(relation.property_name.as_str())
                    || relation.inverse_property_name.as_deref() == Some(candidate.property_name.as_str()))
        });

        if found {
            Ok(target)
        } else {
            Err(MetadataError::UnresolvableInverse {
                table: source_table.name.clone(),
                relation: relation.property_name.clone(),
                target: relation.target_table.clone(),
            })
        }
    }

    /// Finds the owner-side relation on `target` whose foreign key points
    /// back to `source_table`, used to resolve the FK column for O2M/inverse
    /// O2O relations whose own metadata carries no column.
    pub fn owner_relation_on<'a>(
        &self,
        target: &'a Table,
        source_table: &str,
        inverse_property_name: Option<&str>,
    ) -> Option<&'a crate::relation::Relation> {
        target.owned_relations().find(|candidate| {
            candidate.target_table == source_table
                && inverse_property_name
                    .map(|name| candidate.inverse_property_name.as_deref() == Some(name))
                    .unwrap_or(true)
        })
    }
}

struct CacheEntry {
    table: Arc<Table>,
    fetched_at: Instant,
}

/// A TTL-based, read-mostly cache over a [`MetadataProvider`]. Readers may
/// observe a snapshot up to `ttl` old during a background refresh, but never
/// a torn/inconsistent one, matching the shared-resource guarantee in the
/// concurrency design.
pub struct InMemoryMetadataCache<P> {
    inner: P,
    ttl: Duration,
    entries: RwLock<hashbrown::HashMap<String, CacheEntry>>,
}

impl<P: MetadataProvider> InMemoryMetadataCache<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(hashbrown::HashMap::new()),
        }
    }

    fn refresh(&self, name: &str) -> Option<Arc<Table>> {
        let table = self.inner.get_table(name)?;
        self.entries.write().insert(
            name.to_string(),
            CacheEntry {
                table: table.clone(),
                fetched_at: Instant::now(),
            },
        );
        Some(table)
    }
}

impl<P: MetadataProvider> MetadataProvider for InMemoryMetadataCache<P> {
    fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        if let Some(entry) = self.entries.read().get(name) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.table.clone());
            }
        }
        self.refresh(name)
    }

    fn list_tables(&self) -> Vec<Arc<Table>> {
        self.inner.list_tables()
    }
}
