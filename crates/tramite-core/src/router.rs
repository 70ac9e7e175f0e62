//! Location Routing
//!
//! Finds the nearest office for every institution type a procedure needs and
//! orders the visits with a nearest-neighbor tour from the applicant's
//! position.
//!
//! Route types without any known office stay in the plan with no location
//! and a 0.0 km leg. They take no part in the greedy choice and are placed
//! last, in route-table order.

use serde::Serialize;
use std::sync::Arc;

use crate::catalog::{Catalog, Coordinate, Location, RouteStop};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometres
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

fn round_km(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

/// One stop of a visit plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitPlanEntry {
    pub institution_type: String,
    pub description: String,
    /// Nearest office of this type; `None` when the directory has none
    pub location: Option<Location>,
    /// Leg distance from the previous stop, one decimal
    pub distance_km: f64,
    /// 1-based visiting order
    pub order: u32,
}

impl VisitPlanEntry {
    pub fn is_resolved(&self) -> bool {
        self.location.is_some()
    }
}

/// Ordered visits plus the total route distance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisitPlan {
    pub entries: Vec<VisitPlanEntry>,
    pub total_distance_km: f64,
}

impl VisitPlan {
    fn from_entries(entries: Vec<VisitPlanEntry>) -> Self {
        let total_distance_km = entries.iter().map(|e| e.distance_km).sum();
        Self {
            entries,
            total_distance_km,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &VisitPlanEntry> {
        self.entries.iter().filter(|e| !e.is_resolved())
    }
}

/// Stateless router over an injected catalog
pub struct LocationRouter {
    catalog: Arc<Catalog>,
}

impl LocationRouter {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Nearest office of a type, with its distance
    pub fn nearest_location(
        &self,
        institution_type: &str,
        from: Coordinate,
    ) -> Option<(&Location, f64)> {
        self.catalog
            .locations_of_type(institution_type)
            .map(|l| (l, haversine_km(from, l.coordinate)))
            .fold(None, |best, (l, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((l, d)),
            })
    }

    /// Plan the visits for a procedure starting at `start`
    pub fn plan_visits(&self, procedure_id: &str, start: Coordinate) -> VisitPlan {
        let route = self.catalog.route(procedure_id);
        if route.is_empty() {
            tracing::debug!("No route declared for procedure {}", procedure_id);
            return VisitPlan::default();
        }

        let mut pending: Vec<(&RouteStop, &Location)> = Vec::new();
        let mut unresolved: Vec<&RouteStop> = Vec::new();
        for stop in route {
            match self.nearest_location(&stop.institution_type, start) {
                Some((location, _)) => pending.push((stop, location)),
                None => unresolved.push(stop),
            }
        }

        let mut entries = Vec::with_capacity(route.len());
        let mut current = start;

        while !pending.is_empty() {
            // Strict < keeps the earliest route entry on ties
            let mut best = 0;
            let mut best_d = haversine_km(current, pending[0].1.coordinate);
            for (i, (_, location)) in pending.iter().enumerate().skip(1) {
                let d = haversine_km(current, location.coordinate);
                if d < best_d {
                    best = i;
                    best_d = d;
                }
            }

            let (stop, location) = pending.remove(best);
            current = location.coordinate;
            entries.push(VisitPlanEntry {
                institution_type: stop.institution_type.clone(),
                description: stop.description.clone(),
                location: Some(location.clone()),
                distance_km: round_km(best_d),
                order: entries.len() as u32 + 1,
            });
        }

        for stop in unresolved {
            tracing::warn!(
                procedure = procedure_id,
                institution = %stop.institution_type,
                "No known location for institution type"
            );
            entries.push(VisitPlanEntry {
                institution_type: stop.institution_type.clone(),
                description: stop.description.clone(),
                location: None,
                distance_km: 0.0,
                order: entries.len() as u32 + 1,
            });
        }

        VisitPlan::from_entries(entries)
    }
}
