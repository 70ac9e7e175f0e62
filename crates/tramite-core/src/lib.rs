//! Procedure flow and requirement resolution for government procedures.
//!
//! - [`resolver`] decides which prerequisites apply to an applicant
//! - [`store`] tracks phase progress and sub-procedure branches
//! - [`router`] orders the office visits a procedure needs

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod geolocation;
pub mod guards;
pub mod phase;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod segmentation;
pub mod state;
pub mod store;

pub use catalog::{
    Catalog, CatalogLoader, ConditionalRule, Coordinate, Location, PhaseContent, Prerequisite,
    PrerequisiteKind, Procedure, RouteStop,
};
pub use config::{ConfigLoader, EngineConfig};
pub use engine::ProcedureEngine;
pub use error::{FlowError, FlowResult};
pub use geolocation::{CoordinateSource, FixedSource, GeolocationSettings, PositionOrigin};
pub use phase::Phase;
pub use repository::{JsonFileRepository, MemoryRepository, ProgressRepository, ProgressSnapshot};
pub use resolver::{PassportStrategy, RequirementResolver, ResolutionStrategy, RuleFilter};
pub use router::{haversine_km, LocationRouter, VisitPlan, VisitPlanEntry};
pub use segmentation::{ApplicantCategory, ProcedureSubtype, Segmentation};
pub use state::{Blocker, BlockerType, Branch, BranchState, PrerequisiteStatus, ProgressState};
pub use store::{ProgressStore, ProgressSummary};
