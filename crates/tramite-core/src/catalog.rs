//! Procedure Catalog and Loading
//!
//! Procedures, the location directory and the per-procedure route table are
//! loaded once at startup from JSON or YAML documents and never mutated
//! afterwards. Everything downstream holds the catalog behind an `Arc`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{FlowError, FlowResult};
use crate::phase::Phase;
use crate::segmentation::{ApplicantCategory, ProcedureSubtype};

/// A government procedure definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Stable identifier (e.g., "pasaporte")
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Grouping used by the UI (e.g., "identidad", "vehicular")
    #[serde(default)]
    pub category: String,
    /// Every prerequisite the procedure can ask for, in display order
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Content for each phase this procedure walks through
    #[serde(default)]
    pub phases: Vec<PhaseContent>,
    /// Estimated duration in days
    #[serde(default)]
    pub estimated_days: u32,
    /// Fee charged for the procedure
    #[serde(default)]
    pub cost: Decimal,
}

impl Procedure {
    pub fn prerequisite(&self, id: &str) -> Option<&Prerequisite> {
        self.prerequisites.iter().find(|p| p.id == id)
    }

    pub fn phase_content(&self, phase: Phase) -> Option<&PhaseContent> {
        self.phases.iter().find(|c| c.phase == phase)
    }

    /// Phases this procedure walks through, in lifecycle order.
    ///
    /// A procedure that declares no phase content walks all of them.
    pub fn phase_sequence(&self) -> Vec<Phase> {
        if self.phases.is_empty() {
            return Phase::ALL.to_vec();
        }
        let mut declared: Vec<Phase> = self.phases.iter().map(|c| c.phase).collect();
        declared.sort();
        declared.dedup();
        declared
    }

    /// The phase following `current` in this procedure's sequence
    pub fn next_phase(&self, current: Phase) -> Option<Phase> {
        self.phase_sequence()
            .into_iter()
            .find(|p| p.rank() > current.rank())
    }
}

/// What a prerequisite asks the applicant to bring or confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerequisiteKind {
    Document,
    Validation,
    File,
}

/// A document, validation or file needed before a procedure can proceed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub id: String,
    pub name: String,
    pub kind: PrerequisiteKind,
    /// Procedure that produces this prerequisite when the applicant lacks it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_procedure_id: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ConditionalRule>,
    /// Yes/no question shown while validating
    #[serde(default)]
    pub question: String,
}

/// Conjunction of optional constraints on the applicant's segmentation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtypes: Option<Vec<ProcedureSubtype>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<ApplicantCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naturalized: Option<bool>,
}

/// Display content for one phase of a procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseContent {
    pub phase: Phase,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A physical office where part of a procedure happens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub institution_type: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    pub coordinate: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// One institution type a procedure requires a visit to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub institution_type: String,
    #[serde(default)]
    pub description: String,
}

/// On-disk shape of a catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Institution types to visit, per procedure id, in route order
    #[serde(default)]
    pub routes: HashMap<String, Vec<RouteStop>>,
}

/// Immutable, validated collection of procedures, locations and routes
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    procedures: BTreeMap<String, Procedure>,
    locations: Vec<Location>,
    routes: HashMap<String, Vec<RouteStop>>,
}

impl Catalog {
    /// Merge and validate one or more catalog documents
    pub fn from_documents(documents: Vec<CatalogDocument>) -> FlowResult<Self> {
        let mut catalog = Catalog::default();

        for doc in documents {
            for procedure in doc.procedures {
                if catalog.procedures.contains_key(&procedure.id) {
                    return Err(FlowError::InvalidCatalog(format!(
                        "duplicate procedure id '{}'",
                        procedure.id
                    )));
                }
                catalog.procedures.insert(procedure.id.clone(), procedure);
            }
            catalog.locations.extend(doc.locations);
            for (procedure_id, stops) in doc.routes {
                catalog.routes.insert(procedure_id, stops);
            }
        }

        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> FlowResult<()> {
        for procedure in self.procedures.values() {
            let mut seen = HashSet::new();
            for prereq in &procedure.prerequisites {
                if !seen.insert(prereq.id.as_str()) {
                    return Err(FlowError::InvalidCatalog(format!(
                        "procedure '{}' declares prerequisite '{}' twice",
                        procedure.id, prereq.id
                    )));
                }
                if let Some(related) = &prereq.related_procedure_id {
                    if !self.procedures.contains_key(related) {
                        return Err(FlowError::InvalidCatalog(format!(
                            "prerequisite '{}' of '{}' points to unknown procedure '{}'",
                            prereq.id, procedure.id, related
                        )));
                    }
                }
            }
        }

        for procedure_id in self.routes.keys() {
            if !self.procedures.contains_key(procedure_id) {
                return Err(FlowError::InvalidCatalog(format!(
                    "route declared for unknown procedure '{}'",
                    procedure_id
                )));
            }
        }

        let mut location_ids = HashSet::new();
        for location in &self.locations {
            if !location_ids.insert(location.id.as_str()) {
                return Err(FlowError::InvalidCatalog(format!(
                    "duplicate location id '{}'",
                    location.id
                )));
            }
        }

        Ok(())
    }

    pub fn procedure(&self, id: &str) -> Option<&Procedure> {
        self.procedures.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.procedures.contains_key(id)
    }

    /// All procedures, ordered by id
    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.values()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn locations_of_type<'a, 'b>(
        &'a self,
        institution_type: &'b str,
    ) -> impl Iterator<Item = &'a Location> + 'b
    where
        'a: 'b,
    {
        self.locations
            .iter()
            .filter(move |l| l.institution_type == institution_type)
    }

    /// Route table entry for a procedure, empty when none is declared
    pub fn route(&self, procedure_id: &str) -> &[RouteStop] {
        self.routes
            .get(procedure_id)
            .map(|stops| stops.as_slice())
            .unwrap_or(&[])
    }
}

/// Loader for catalog documents
pub struct CatalogLoader;

impl CatalogLoader {
    /// Load a single catalog file; the format follows the extension
    pub fn load_from_path(path: &Path) -> FlowResult<Catalog> {
        let doc = Self::read_document(path)?;
        let catalog = Catalog::from_documents(vec![doc])?;
        log_loaded(&catalog, path);
        Ok(catalog)
    }

    /// Load and merge every `.json`, `.yaml` and `.yml` file in a directory
    pub fn load_from_dir(dir: &Path) -> FlowResult<Catalog> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if is_catalog_file(&path) {
                paths.push(path);
            }
        }
        // Directory iteration order is platform dependent
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            documents.push(Self::read_document(path)?);
        }

        let catalog = Catalog::from_documents(documents)?;
        log_loaded(&catalog, dir);
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> FlowResult<Catalog> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Catalog::from_documents(vec![doc])
    }

    pub fn from_yaml_str(yaml: &str) -> FlowResult<Catalog> {
        let doc: CatalogDocument = serde_yaml::from_str(yaml)?;
        Catalog::from_documents(vec![doc])
    }

    fn read_document(path: &Path) -> FlowResult<CatalogDocument> {
        debug!("Reading catalog document {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let doc = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(doc)
    }
}

fn is_catalog_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "json" || e == "yaml" || e == "yml")
        .unwrap_or(false)
}

fn log_loaded(catalog: &Catalog, source: &Path) {
    info!(
        "Loaded {} procedures, {} locations and {} routes from {}",
        catalog.procedures.len(),
        catalog.locations.len(),
        catalog.routes.len(),
        source.display()
    );
}
