//! Stop Resolver: merges stop-place and quay reference data into one
//! canonical identity table.
//!
//! Raw arrival rows reference stops by either a quay id or a stop-place
//! id; both resolve here. Stop-place name/geolocation wins over the quay's
//! when both are present. A reference with no geolocation in either source
//! silently fails to resolve; rows pointing at it get dropped downstream.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::model::{Quay, StopIdentity, StopPlace};
use crate::store;

/// Lookup from a raw stop reference (quay id or stop-place id) to its
/// canonical identity. Rebuilt wholesale on each pipeline run.
#[derive(Debug, Default)]
pub struct StopRegistry {
    by_ref: HashMap<String, StopIdentity>,
}

impl StopRegistry {
    /// Reads `stops.csv` and `quays.csv` under the data root and builds
    /// the merged lookup.
    pub fn load(root: &Path) -> Result<Self> {
        let stops: Vec<StopPlace> = store::read_csv(&root.join("stops.csv"))
            .context("reading stop-place reference data")?;
        let quays: Vec<Quay> =
            store::read_csv(&root.join("quays.csv")).context("reading quay reference data")?;

        let registry = Self::build(&stops, &quays);
        info!(
            stop_places = stops.len(),
            quays = quays.len(),
            resolvable_refs = registry.len(),
            "Stop registry built"
        );
        Ok(registry)
    }

    /// Merges the two reference tables. Quays are processed in id order so
    /// that the stop-place entry (which can only hold one representative
    /// quay) is deterministic.
    pub fn build(stops: &[StopPlace], quays: &[Quay]) -> Self {
        let places: HashMap<&str, &StopPlace> =
            stops.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut sorted: Vec<&Quay> = quays.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut by_ref: HashMap<String, StopIdentity> = HashMap::new();
        for quay in sorted {
            let Some(place) = places.get(quay.stop_place_ref.as_str()) else {
                continue;
            };

            let lat = place.lat.or(quay.lat);
            let lon = place.lon.or(quay.lon);
            let name = place.name.clone().or_else(|| quay.name.clone());
            let (Some(lat), Some(lon), Some(name)) = (lat, lon, name) else {
                continue;
            };

            let identity = StopIdentity {
                quay_id: quay.id.clone(),
                stop_id: place.id.clone(),
                lat,
                lon,
                name,
            };
            by_ref
                .entry(place.id.clone())
                .or_insert_with(|| identity.clone());
            by_ref.entry(quay.id.clone()).or_insert(identity);
        }

        StopRegistry { by_ref }
    }

    /// Resolves a raw stop reference, by quay id or stop-place id.
    pub fn resolve(&self, stop_ref: &str) -> Option<&StopIdentity> {
        self.by_ref.get(stop_ref)
    }

    /// Number of distinct resolvable references.
    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }
}
