//! Prerequisite Resolution
//!
//! Works out which of a procedure's prerequisites apply to an applicant.
//! Most procedures filter their list through each prerequisite's conditional
//! rule. A procedure may register its own strategy instead; callers never
//! know which one ran.
//!
//! Resolution is a pure function of (procedure, segmentation).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::catalog::{Catalog, ConditionalRule, Prerequisite, Procedure};
use crate::segmentation::{ProcedureSubtype, Segmentation};
use crate::state::{Blocker, BlockerType, ProgressState};

/// Procedure id served by [`PassportStrategy`] in the default table
pub const PASSPORT_PROCEDURE_ID: &str = "pasaporte";

impl ConditionalRule {
    /// Does this rule admit the segmentation?
    ///
    /// A constraint is skipped when the segmentation leaves the field
    /// unanswered or when the allowed set is empty.
    pub fn admits(&self, segmentation: &Segmentation) -> bool {
        let subtype_ok = match (&self.subtypes, segmentation.procedure_subtype) {
            (Some(allowed), Some(subtype)) if !allowed.is_empty() => allowed.contains(&subtype),
            _ => true,
        };

        let category_ok = match (&self.categories, segmentation.applicant_category) {
            (Some(allowed), Some(category)) if !allowed.is_empty() => allowed.contains(&category),
            _ => true,
        };

        let naturalized_ok = match (self.naturalized, segmentation.naturalized) {
            (Some(required), Some(actual)) => required == actual,
            _ => true,
        };

        subtype_ok && category_ok && naturalized_ok
    }
}

/// A way of selecting the applicable prerequisites of one procedure
pub trait ResolutionStrategy: Send + Sync {
    fn resolve<'a>(
        &self,
        procedure: &'a Procedure,
        segmentation: &Segmentation,
    ) -> Vec<&'a Prerequisite>;
}

/// Default strategy: keep prerequisites whose rule admits the segmentation
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFilter;

impl ResolutionStrategy for RuleFilter {
    fn resolve<'a>(
        &self,
        procedure: &'a Procedure,
        segmentation: &Segmentation,
    ) -> Vec<&'a Prerequisite> {
        procedure
            .prerequisites
            .iter()
            .filter(|p| {
                p.rule
                    .as_ref()
                    .map(|rule| rule.admits(segmentation))
                    .unwrap_or(true)
            })
            .collect()
    }
}

/// Passport strategy: a fixed base set mutated by the applicant's situation
#[derive(Debug, Clone)]
pub struct PassportStrategy {
    base: Vec<&'static str>,
}

impl PassportStrategy {
    pub const GUARDIAN_AUTHORIZATION: &'static str = "autorizacion_padres";
    pub const MINOR_BIRTH_CERTIFICATE: &'static str = "acta_nacimiento_menor";
    pub const NATURALIZATION_LETTER: &'static str = "carta_naturalizacion";
    pub const LOSS_REPORT: &'static str = "denuncia_perdida";
    pub const PRIOR_PASSPORT: &'static str = "pasaporte_anterior";

    pub fn new() -> Self {
        Self {
            base: vec![
                "identificacion_oficial",
                "curp",
                "comprobante_domicilio",
                "fotografias",
                "comprobante_pago",
            ],
        }
    }

    /// Applicable prerequisite ids before projecting onto the procedure
    pub fn applicable_ids(&self, segmentation: &Segmentation) -> BTreeSet<&'static str> {
        let mut ids: BTreeSet<&'static str> = self.base.iter().copied().collect();

        if segmentation.is_minor() {
            ids.insert(Self::GUARDIAN_AUTHORIZATION);
            ids.insert(Self::MINOR_BIRTH_CERTIFICATE);
        }

        if segmentation.naturalized == Some(true) {
            ids.insert(Self::NATURALIZATION_LETTER);
        }

        match segmentation.procedure_subtype {
            Some(ProcedureSubtype::Lost) => {
                ids.insert(Self::LOSS_REPORT);
                ids.remove(Self::PRIOR_PASSPORT);
            }
            Some(ProcedureSubtype::Renewal) => {
                ids.insert(Self::PRIOR_PASSPORT);
                ids.remove(Self::LOSS_REPORT);
            }
            _ => {}
        }

        ids
    }
}

impl Default for PassportStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionStrategy for PassportStrategy {
    fn resolve<'a>(
        &self,
        procedure: &'a Procedure,
        segmentation: &Segmentation,
    ) -> Vec<&'a Prerequisite> {
        let ids = self.applicable_ids(segmentation);
        // Projected onto the procedure's own list so nothing is invented
        procedure
            .prerequisites
            .iter()
            .filter(|p| ids.contains(p.id.as_str()))
            .collect()
    }
}

/// A resolved prerequisite that still blocks progress
#[derive(Debug, Clone, PartialEq)]
pub struct UnmetPrerequisite {
    pub prerequisite: Prerequisite,
    pub blocker: Blocker,
}

/// Stateless resolver over an injected catalog
pub struct RequirementResolver {
    catalog: Arc<Catalog>,
    default_strategy: Box<dyn ResolutionStrategy>,
    strategies: HashMap<String, Box<dyn ResolutionStrategy>>,
}

impl RequirementResolver {
    /// Resolver with the rule filter only
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            default_strategy: Box::new(RuleFilter),
            strategies: HashMap::new(),
        }
    }

    /// Resolver with the built-in named strategies registered
    pub fn with_default_strategies(catalog: Arc<Catalog>) -> Self {
        Self::new(catalog).with_strategy(PASSPORT_PROCEDURE_ID, PassportStrategy::new())
    }

    pub fn with_strategy(
        mut self,
        procedure_id: impl Into<String>,
        strategy: impl ResolutionStrategy + 'static,
    ) -> Self {
        self.strategies
            .insert(procedure_id.into(), Box::new(strategy));
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn strategy_for(&self, procedure_id: &str) -> &dyn ResolutionStrategy {
        self.strategies
            .get(procedure_id)
            .map(|s| &**s)
            .unwrap_or(&*self.default_strategy)
    }

    /// Applicable prerequisites; an unknown procedure resolves to nothing
    pub fn resolve(&self, procedure_id: &str, segmentation: &Segmentation) -> Vec<Prerequisite> {
        match self.catalog.procedure(procedure_id) {
            Some(procedure) => self.resolve_for(procedure, segmentation),
            None => {
                tracing::debug!("Nothing to resolve for unknown procedure {}", procedure_id);
                Vec::new()
            }
        }
    }

    pub fn resolve_for(
        &self,
        procedure: &Procedure,
        segmentation: &Segmentation,
    ) -> Vec<Prerequisite> {
        self.strategy_for(&procedure.id)
            .resolve(procedure, segmentation)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Required prerequisites not yet answered `true` (or skipped)
    pub fn unmet(&self, procedure_id: &str, state: &ProgressState) -> Vec<UnmetPrerequisite> {
        let segmentation = state.segmentation.clone().unwrap_or_default();

        self.resolve(procedure_id, &segmentation)
            .into_iter()
            .filter(|p| !p.optional && !state.is_satisfied(&p.id))
            .map(|p| {
                let blocker = blocker_for(&p, state);
                UnmetPrerequisite {
                    prerequisite: p,
                    blocker,
                }
            })
            .collect()
    }
}

fn blocker_for(prerequisite: &Prerequisite, state: &ProgressState) -> Blocker {
    match state.answers.get(&prerequisite.id) {
        None => Blocker::new(
            BlockerType::Unanswered {
                prerequisite_id: prerequisite.id.clone(),
            },
            format!("{} has not been answered", prerequisite.name),
        ),
        Some(_) => Blocker::new(
            BlockerType::Missing {
                prerequisite_id: prerequisite.id.clone(),
                related_procedure_id: prerequisite.related_procedure_id.clone(),
            },
            format!("{} is missing", prerequisite.name),
        ),
    }
}
