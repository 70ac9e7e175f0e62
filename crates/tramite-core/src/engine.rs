//! Procedure Engine
//!
//! Wires the catalog, resolver, router and progress store together. The
//! engine holds no notion of a "current" procedure; callers pass the key.

use std::sync::Arc;

use crate::catalog::{Catalog, CatalogLoader, Coordinate, Prerequisite};
use crate::config::EngineConfig;
use crate::error::FlowResult;
use crate::geolocation::{locate, CoordinateSource, GeolocationSettings, ResolvedPosition};
use crate::repository::ProgressRepository;
use crate::resolver::RequirementResolver;
use crate::router::{LocationRouter, VisitPlan};
use crate::segmentation::Segmentation;
use crate::store::ProgressStore;

pub struct ProcedureEngine {
    catalog: Arc<Catalog>,
    resolver: Arc<RequirementResolver>,
    router: LocationRouter,
    store: ProgressStore,
    geolocation: GeolocationSettings,
}

impl ProcedureEngine {
    /// Engine over a loaded catalog with the built-in resolution strategies
    pub fn new(catalog: Catalog) -> Self {
        let catalog = Arc::new(catalog);
        let resolver = Arc::new(RequirementResolver::with_default_strategies(catalog.clone()));
        Self::with_resolver(resolver)
    }

    pub fn with_resolver(resolver: Arc<RequirementResolver>) -> Self {
        let catalog = resolver.catalog().clone();
        Self {
            router: LocationRouter::new(catalog.clone()),
            store: ProgressStore::new(resolver.clone()),
            catalog,
            resolver,
            geolocation: GeolocationSettings::default(),
        }
    }

    /// Load the configured catalog (file or directory)
    pub fn from_config(config: &EngineConfig) -> FlowResult<Self> {
        let catalog = if config.catalog_path.is_dir() {
            CatalogLoader::load_from_dir(&config.catalog_path)?
        } else {
            CatalogLoader::load_from_path(&config.catalog_path)?
        };
        let mut engine = Self::new(catalog);
        engine.geolocation = config.geolocation.clone();
        Ok(engine)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &RequirementResolver {
        &self.resolver
    }

    pub fn router(&self) -> &LocationRouter {
        &self.router
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn resolve(&self, procedure_id: &str, segmentation: &Segmentation) -> Vec<Prerequisite> {
        self.resolver.resolve(procedure_id, segmentation)
    }

    pub fn plan_visits(&self, procedure_id: &str, start: Coordinate) -> VisitPlan {
        self.router.plan_visits(procedure_id, start)
    }

    /// Locate the applicant (falling back when needed) and plan from there
    pub async fn plan_visits_from(
        &self,
        procedure_id: &str,
        source: Option<&dyn CoordinateSource>,
    ) -> (ResolvedPosition, VisitPlan) {
        let position = locate(source, &self.geolocation).await;
        let plan = self.router.plan_visits(procedure_id, position.coordinate);
        (position, plan)
    }

    pub fn restore(&self, repository: &dyn ProgressRepository) -> FlowResult<()> {
        self.store.import(repository.load()?)
    }

    pub fn persist(&self, repository: &dyn ProgressRepository) -> FlowResult<()> {
        repository.save(&self.store.export()?)
    }
}
