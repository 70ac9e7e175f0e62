//! End-to-end flows over the bundled sample catalog

use std::sync::Arc;

use tramite_core::{
    ApplicantCategory, BranchState, Catalog, CatalogLoader, Coordinate, FixedSource, FlowError,
    JsonFileRepository, MemoryRepository, Phase, PositionOrigin, ProcedureEngine,
    ProcedureSubtype, ProgressRepository, ProgressSnapshot, RequirementResolver, Segmentation,
};

const SAMPLE_CATALOG: &str = include_str!("../data/catalog.json");

fn catalog() -> Catalog {
    CatalogLoader::from_json_str(SAMPLE_CATALOG).unwrap()
}

fn engine() -> ProcedureEngine {
    ProcedureEngine::new(catalog())
}

fn ids(engine: &ProcedureEngine, procedure_id: &str, segmentation: &Segmentation) -> Vec<String> {
    engine
        .resolve(procedure_id, segmentation)
        .into_iter()
        .map(|p| p.id)
        .collect()
}

#[test]
fn test_passport_minor_adds_guardian_documents() {
    let engine = engine();
    let minor = Segmentation::default().with_category(ApplicantCategory::Minor);

    let resolved = ids(&engine, "pasaporte", &minor);
    assert_eq!(resolved.len(), 7);
    assert!(resolved.contains(&"autorizacion_padres".to_string()));
    assert!(resolved.contains(&"acta_nacimiento_menor".to_string()));
    assert!(!resolved.contains(&"pasaporte_anterior".to_string()));
}

#[test]
fn test_passport_renewal_and_loss_are_exclusive() {
    let engine = engine();

    let renewal = ids(
        &engine,
        "pasaporte",
        &Segmentation::default().with_subtype(ProcedureSubtype::Renewal),
    );
    assert!(renewal.contains(&"pasaporte_anterior".to_string()));
    assert!(!renewal.contains(&"denuncia_perdida".to_string()));

    let lost = ids(
        &engine,
        "pasaporte",
        &Segmentation::default().with_subtype(ProcedureSubtype::Lost),
    );
    assert!(lost.contains(&"denuncia_perdida".to_string()));
    assert!(!lost.contains(&"pasaporte_anterior".to_string()));
    assert_eq!(lost.len(), 6);
}

#[test]
fn test_rule_filter_keeps_unanswered_constraints() {
    let engine = engine();

    // No segmentation: nothing is filtered out
    let everything = ids(&engine, "licencia_conducir", &Segmentation::default());
    assert_eq!(everything.len(), 7);

    let adult_first_time = ids(
        &engine,
        "licencia_conducir",
        &Segmentation::default()
            .with_subtype(ProcedureSubtype::FirstTime)
            .with_category(ApplicantCategory::Adult),
    );
    assert_eq!(
        adult_first_time,
        vec![
            "identificacion_oficial",
            "comprobante_domicilio",
            "curp",
            "examen_manejo"
        ]
    );
}

#[test]
fn test_unknown_procedure_resolves_to_nothing() {
    let engine = engine();
    assert!(ids(&engine, "visa", &Segmentation::default()).is_empty());
    assert!(engine
        .plan_visits("visa", Coordinate::new(19.4326, -99.1332))
        .is_empty());
    assert!(matches!(
        engine.store().start("visa", false),
        Err(FlowError::UnknownProcedure(_))
    ));
}

#[test]
fn test_payment_is_gated_until_requirements_are_met() {
    let engine = engine();
    let store = engine.store();
    store.start("licencia_conducir", false).unwrap();
    store
        .set_segmentation(
            "licencia_conducir",
            Segmentation::default()
                .with_subtype(ProcedureSubtype::FirstTime)
                .with_category(ApplicantCategory::Adult),
        )
        .unwrap();
    store
        .change_phase("licencia_conducir", Phase::Requirements)
        .unwrap();

    store
        .answer_prerequisite("licencia_conducir", "identificacion_oficial", true)
        .unwrap();
    store
        .answer_prerequisite("licencia_conducir", "curp", false)
        .unwrap();

    let err = store
        .change_phase("licencia_conducir", Phase::Payment)
        .unwrap_err();
    let blocked: Vec<&str> = err.blockers().iter().map(|b| b.prerequisite_id()).collect();
    assert_eq!(blocked, vec!["comprobante_domicilio", "curp"]);
    assert_eq!(
        store.get("licencia_conducir").unwrap().phase,
        Phase::Requirements
    );

    // Optional course never blocks
    store
        .answer_prerequisite("licencia_conducir", "comprobante_domicilio", true)
        .unwrap();
    store
        .skip_prerequisite("licencia_conducir", "curp")
        .unwrap();

    let state = store
        .change_phase("licencia_conducir", Phase::Payment)
        .unwrap();
    assert_eq!(state.phase, Phase::Payment);
    assert_eq!(
        state.completed_phases,
        vec![Phase::Information, Phase::Requirements]
    );
}

#[test]
fn test_backward_moves_are_never_gated() {
    let engine = engine();
    let store = engine.store();
    store.start("curp", false).unwrap();
    store.answer_prerequisite("curp", "datos_personales", true).unwrap();
    store.change_phase("curp", Phase::Tracking).unwrap();

    store.answer_prerequisite("curp", "datos_personales", false).unwrap();
    let state = store.change_phase("curp", Phase::Requirements).unwrap();
    assert_eq!(state.phase, Phase::Requirements);
}

#[test]
fn test_branch_completion_satisfies_prerequisite() {
    let engine = engine();
    let store = engine.store();
    store.start("pasaporte", false).unwrap();
    store
        .set_segmentation(
            "pasaporte",
            Segmentation::default().with_category(ApplicantCategory::Minor),
        )
        .unwrap();
    store
        .answer_prerequisite("pasaporte", "acta_nacimiento_menor", false)
        .unwrap();

    let branch = store
        .open_branch(
            "pasaporte",
            "acta_nacimiento",
            "acta_nacimiento_menor",
            "El menor no tiene acta",
        )
        .unwrap();
    assert!(store.is_started("acta_nacimiento"));
    assert_eq!(store.status("pasaporte").unwrap().open_branches.len(), 1);

    let state = store
        .close_branch("pasaporte", branch.branch_id, false)
        .unwrap();
    assert_eq!(state.answers.get("acta_nacimiento_menor"), Some(&true));
    assert_eq!(state.branches[0].state, BranchState::Completed);
    assert!(state.branches[0].closed_at.is_some());
}

#[test]
fn test_cancelled_branch_leaves_prerequisite_missing() {
    let engine = engine();
    let store = engine.store();
    store.start("pasaporte", false).unwrap();
    store.answer_prerequisite("pasaporte", "curp", false).unwrap();

    let branch = store
        .open_branch("pasaporte", "curp", "curp", "Sin CURP")
        .unwrap();
    let state = store
        .close_branch("pasaporte", branch.branch_id, true)
        .unwrap();

    assert_eq!(state.answers.get("curp"), Some(&false));
    assert_eq!(state.branches[0].state, BranchState::Cancelled);
    assert!(store.status("pasaporte").unwrap().open_branches.is_empty());
}

#[test]
fn test_start_at_a_location_plans_zero_first_leg() {
    let engine = engine();
    let madero = engine
        .catalog()
        .locations()
        .iter()
        .find(|l| l.id == "banco-madero")
        .unwrap()
        .coordinate;

    let plan = engine.plan_visits("pasaporte", madero);
    assert_eq!(plan.entries.len(), 2);

    let first = &plan.entries[0];
    assert_eq!(first.order, 1);
    assert_eq!(first.distance_km, 0.0);
    assert_eq!(first.location.as_ref().unwrap().id, "banco-madero");
    assert_eq!(
        plan.entries[1].location.as_ref().unwrap().id,
        "sre-delegacion-cuauhtemoc"
    );
}

#[tokio::test]
async fn test_unknown_procedure_plans_nothing_from_fallback() {
    let (position, plan) = engine().plan_visits_from("visa", None).await;
    assert_eq!(position.origin, PositionOrigin::Fallback);
    assert!(plan.is_empty());
    assert_eq!(plan.total_distance_km, 0.0);
}

#[tokio::test]
async fn test_plan_from_device_and_fallback() {
    let engine = engine();

    let near_semovi = FixedSource(Coordinate::new(19.3600, -99.2000));
    let (position, plan) = engine
        .plan_visits_from("licencia_conducir", Some(&near_semovi))
        .await;
    assert_eq!(position.origin, PositionOrigin::Device);
    assert_eq!(plan.entries[0].institution_type, "semovi");

    let (position, plan) = engine.plan_visits_from("licencia_conducir", None).await;
    assert_eq!(position.origin, PositionOrigin::Fallback);
    assert_eq!(plan.entries[0].institution_type, "banco");
}

#[test]
fn test_flat_round_trip_is_exact() {
    let engine = engine();
    let store = engine.store();
    store.start("pasaporte", false).unwrap();
    store
        .set_segmentation(
            "pasaporte",
            Segmentation::default()
                .with_subtype(ProcedureSubtype::Renewal)
                .with_naturalized(true),
        )
        .unwrap();
    store
        .answer_prerequisite("pasaporte", "comprobante_domicilio", true)
        .unwrap();
    store.change_phase("pasaporte", Phase::Requirements).unwrap();
    store
        .open_branch("pasaporte", "curp", "curp", "Sin CURP")
        .unwrap();

    let repository = MemoryRepository::new();
    engine.persist(&repository).unwrap();
    assert!(repository.raw("pasaporte").is_some());
    assert!(repository.raw("curp").is_some());

    let restored = ProcedureEngine::new(catalog());
    restored.restore(&repository).unwrap();
    assert_eq!(
        restored.store().get("pasaporte").unwrap(),
        store.get("pasaporte").unwrap()
    );
    assert_eq!(
        restored.store().get("curp").unwrap(),
        store.get("curp").unwrap()
    );
}

#[test]
fn test_json_file_repository_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let repository = JsonFileRepository::new(dir.path().join("nested/progress.json"));
    assert!(repository.load().unwrap().is_empty());

    let resolver = Arc::new(RequirementResolver::with_default_strategies(Arc::new(
        catalog(),
    )));
    let engine = ProcedureEngine::with_resolver(resolver);
    engine.store().start("acta_nacimiento", false).unwrap();
    engine
        .store()
        .mark_document("acta_nacimiento", "identificacion_oficial", true)
        .unwrap();
    engine.persist(&repository).unwrap();

    let snapshot: ProgressSnapshot = repository.load().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot.get("acta_nacimiento").unwrap(),
        &engine.store().get("acta_nacimiento").unwrap()
    );
}
