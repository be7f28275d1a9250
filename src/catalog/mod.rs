//! Shared OID catalogs.
//!
//! One catalog per device *type*, built once from a walk file and then
//! shared read-only by every agent of that type. Lookups are binary
//! searches over the sorted OID list; `get_next` descends correctly
//! from internal tree nodes because ordering is numeric per component.

pub mod behavior;
pub mod walk;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::snmp::{Oid, TypedValue, ValueKind};
use behavior::{Behavior, BehaviorOverride, BehaviorParams};
use walk::ParsedWalk;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error reading walk file: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk file {0} produced no usable entries")]
    Empty(String),
}

/// What a device type knows about one OID.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub declared_type: ValueKind,
    pub base_value: TypedValue,
    pub behavior: Behavior,
    pub params: BehaviorParams,
}

/// Exact-lookup outcome. The two miss variants map onto the v2c
/// exception markers.
#[derive(Debug, Clone, Copy)]
pub enum GetOutcome<'a> {
    Found(&'a CatalogEntry),
    NoSuchInstance,
    NoSuchObject,
}

/// Immutable, shared catalog for one device type.
#[derive(Debug)]
pub struct DeviceTypeCatalog {
    device_type: String,
    sorted_oids: Vec<Oid>,
    entries: HashMap<Oid, CatalogEntry>,
}

pub type SharedCatalog = Arc<DeviceTypeCatalog>;

impl DeviceTypeCatalog {
    /// Build a catalog from a parsed walk, applying configured behavior
    /// overrides (first matching prefix wins) on top of inference.
    pub fn from_walk(
        device_type: &str,
        parsed: ParsedWalk,
        overrides: &[BehaviorOverride],
    ) -> Result<Self, CatalogError> {
        let mut entries: HashMap<Oid, CatalogEntry> = HashMap::with_capacity(parsed.records.len());
        let mut sorted_oids: Vec<Oid> = Vec::with_capacity(parsed.records.len());

        for record in parsed.records {
            // A NULL can never appear in a clean GetResponse; walk
            // lines carrying one are unusable.
            if record.declared_type == ValueKind::Null {
                debug!("dropping NULL entry {} from {} walk", record.oid, device_type);
                continue;
            }
            let (behavior, params) = match overrides.iter().find(|o| record.oid.starts_with(&o.prefix))
            {
                Some(o) => (
                    o.behavior,
                    o.params.clone().unwrap_or_else(|| o.behavior.default_params()),
                ),
                None => {
                    let inferred = behavior::infer(&record.oid, record.declared_type);
                    (inferred, inferred.default_params())
                }
            };
            if entries.contains_key(&record.oid) {
                debug!(
                    "duplicate OID {} in walk for {}, keeping last",
                    record.oid, device_type
                );
            } else {
                sorted_oids.push(record.oid.clone());
            }
            entries.insert(
                record.oid,
                CatalogEntry {
                    declared_type: record.declared_type,
                    base_value: record.value,
                    behavior,
                    params,
                },
            );
        }

        if entries.is_empty() {
            return Err(CatalogError::Empty(device_type.to_string()));
        }

        sorted_oids.sort_unstable();

        info!(
            "catalog for {} loaded: {} OIDs, {} parse warnings",
            device_type,
            sorted_oids.len(),
            parsed.warnings.len()
        );

        Ok(DeviceTypeCatalog {
            device_type: device_type.to_string(),
            sorted_oids,
            entries,
        })
    }

    pub fn load(
        device_type: &str,
        walk_path: &Path,
        overrides: &[BehaviorOverride],
    ) -> Result<Self, CatalogError> {
        let parsed = walk::parse_file(walk_path)?;
        Self::from_walk(device_type, parsed, overrides)
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn len(&self) -> usize {
        self.sorted_oids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_oids.is_empty()
    }

    pub fn oids(&self) -> &[Oid] {
        &self.sorted_oids
    }

    /// Exact lookup. A miss is `NoSuchInstance` when some leaf shares
    /// the queried OID's parent, `NoSuchObject` otherwise.
    pub fn get(&self, oid: &Oid) -> GetOutcome<'_> {
        if let Some(entry) = self.entries.get(oid) {
            return GetOutcome::Found(entry);
        }
        match oid.parent() {
            Some(parent) if self.first_descendant(&parent).is_some() => GetOutcome::NoSuchInstance,
            _ => GetOutcome::NoSuchObject,
        }
    }

    /// The entry with the smallest OID strictly greater than `oid`, or
    /// `None` at the end of the MIB view. Works for internal nodes: the
    /// first leaf under `1.3.6.1.2.1` follows it in sort order.
    pub fn get_next(&self, oid: &Oid) -> Option<(&Oid, &CatalogEntry)> {
        let idx = self.sorted_oids.partition_point(|o| o <= oid);
        let next = self.sorted_oids.get(idx)?;
        Some((next, &self.entries[next]))
    }

    /// Up to `max` successive `get_next` steps from `start`, stopping
    /// at the end of the view.
    pub fn get_bulk(&self, start: &Oid, max: usize) -> Vec<(&Oid, &CatalogEntry)> {
        let first = self.sorted_oids.partition_point(|o| o <= start);
        self.sorted_oids[first..]
            .iter()
            .take(max)
            .map(|oid| (oid, &self.entries[oid]))
            .collect()
    }

    /// First leaf at or under `prefix`, by component-wise prefix match.
    pub fn first_descendant(&self, prefix: &Oid) -> Option<&Oid> {
        let idx = self.sorted_oids.partition_point(|o| o < prefix);
        let candidate = self.sorted_oids.get(idx)?;
        candidate.starts_with(prefix).then_some(candidate)
    }

    /// Direct entry access for the ingress hot path.
    pub fn entry(&self, oid: &Oid) -> Option<&CatalogEntry> {
        self.entries.get(oid)
    }
}
