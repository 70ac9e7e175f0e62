//! Tramite CLI
//!
//! Walks government procedures from the terminal: resolves prerequisites,
//! tracks phase progress between runs and plans office visits.
//!
//! Usage:
//!   tramite resolve pasaporte --subtype renovacion --category adulto
//!   tramite start pasaporte
//!   tramite answer pasaporte curp --no
//!   tramite branch-open pasaporte curp --prerequisite curp --reason "Sin CURP"
//!   tramite advance pasaporte
//!   tramite plan pasaporte --lat 19.43 --lng -99.14
//!
//! Progress is saved to the configured progress file after every mutating
//! command.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use uuid::Uuid;

use tramite_core::store::ProgressSummary;
use tramite_core::{
    ApplicantCategory, ConfigLoader, Coordinate, CoordinateSource, EngineConfig, FixedSource,
    JsonFileRepository, Phase, PositionOrigin, PrerequisiteStatus, ProcedureEngine,
    ProcedureSubtype, ProgressState, Segmentation, VisitPlan,
};

#[derive(Parser)]
#[command(name = "tramite")]
#[command(version)]
#[command(about = "Step-by-step guide through government procedures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the procedures in the catalog
    List,

    /// Show the prerequisites that apply to an applicant
    Resolve {
        procedure: String,
        #[command(flatten)]
        segmentation: SegmentationArgs,
    },

    /// Order the office visits for a procedure
    Plan {
        procedure: String,
        /// Starting latitude (uses the configured fallback when omitted)
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Starting longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
    },

    /// Start a procedure, resuming earlier progress unless --reset
    Start {
        procedure: String,
        #[arg(long)]
        reset: bool,
    },

    /// Record whether the applicant has a prerequisite
    Answer {
        procedure: String,
        prerequisite: String,
        /// Answer "no" instead of "yes"
        #[arg(long)]
        no: bool,
    },

    /// Count a prerequisite as satisfied without having it
    Skip {
        procedure: String,
        prerequisite: String,
    },

    /// Store the applicant's situation on a started procedure
    Segment {
        procedure: String,
        #[command(flatten)]
        segmentation: SegmentationArgs,
    },

    /// Move a procedure to a given phase
    Phase { procedure: String, phase: Phase },

    /// Move a procedure to its next phase
    Advance { procedure: String },

    /// Open a sub-procedure to obtain a missing prerequisite
    BranchOpen {
        procedure: String,
        target: String,
        #[arg(long)]
        prerequisite: String,
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Close a branch; --cancel leaves its prerequisite unmet
    BranchClose {
        procedure: String,
        branch_id: Uuid,
        #[arg(long)]
        cancel: bool,
    },

    /// Show progress, blockers and open branches
    Status { procedure: String },
}

#[derive(Args, Default)]
struct SegmentationArgs {
    /// primera-vez, renovacion, perdida or duplicado
    #[arg(long)]
    subtype: Option<ProcedureSubtype>,
    /// menor-edad, adulto or tercera-edad
    #[arg(long)]
    category: Option<ApplicantCategory>,
    #[arg(long)]
    naturalized: Option<bool>,
    #[arg(long)]
    nationality: Option<String>,
    #[arg(long)]
    age: Option<u32>,
}

impl From<SegmentationArgs> for Segmentation {
    fn from(args: SegmentationArgs) -> Self {
        Segmentation {
            nationality: args.nationality,
            naturalized: args.naturalized,
            procedure_subtype: args.subtype,
            applicant_category: args.category,
            approximate_age: args.age,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            if let Some(flow) = e.downcast_ref::<tramite_core::FlowError>() {
                for blocker in flow.blockers() {
                    eprintln!("  {} {}", "✗".red(), blocker.description);
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::from_env().load()?;
    let engine = ProcedureEngine::from_config(&config)
        .with_context(|| format!("Failed to load catalog {}", config.catalog_path.display()))?;
    let json = cli.json;

    match cli.command {
        Commands::List => {
            for procedure in engine.catalog().procedures() {
                println!(
                    "{:<20} {} ({} días, ${})",
                    procedure.id.cyan(),
                    procedure.name,
                    procedure.estimated_days,
                    procedure.cost
                );
            }
            Ok(())
        }
        Commands::Resolve {
            procedure,
            segmentation,
        } => {
            let prerequisites = engine.resolve(&procedure, &segmentation.into());
            if json {
                return print_json(&prerequisites);
            }
            println!("{}", format!("Requisitos para {}", procedure).cyan().bold());
            if prerequisites.is_empty() {
                println!("  {}", "(ninguno)".dimmed());
            }
            for p in &prerequisites {
                let marker = if p.optional { "(opcional)".dimmed() } else { "".normal() };
                println!("  • {} {}", p.name, marker);
            }
            Ok(())
        }
        Commands::Plan { procedure, lat, lng } => {
            let device = lat.zip(lng).map(|(lat, lng)| FixedSource(Coordinate::new(lat, lng)));
            let source = device.as_ref().map(|s| s as &dyn CoordinateSource);
            let (position, plan) = engine.plan_visits_from(&procedure, source).await;
            if json {
                return print_json(&plan);
            }
            if position.origin == PositionOrigin::Fallback {
                println!(
                    "{}",
                    format!(
                        "Sin ubicación; partiendo de {}",
                        config.geolocation.fallback_label
                    )
                    .yellow()
                );
            }
            print_plan(&plan);
            Ok(())
        }
        command => run_stateful(&engine, &config, command, json),
    }
}

/// Commands that read or change saved progress
fn run_stateful(
    engine: &ProcedureEngine,
    config: &EngineConfig,
    command: Commands,
    json: bool,
) -> Result<()> {
    let repository = JsonFileRepository::new(&config.progress_path);
    engine
        .restore(&repository)
        .with_context(|| format!("Failed to read {}", config.progress_path.display()))?;
    let store = engine.store();

    let state = match command {
        Commands::Status { procedure } => {
            let summary = store.status(&procedure)?;
            if json {
                return print_json(&summary);
            }
            print_summary(&summary);
            return Ok(());
        }
        Commands::Start { procedure, reset } => store.start(&procedure, reset)?,
        Commands::Answer {
            procedure,
            prerequisite,
            no,
        } => store.answer_prerequisite(&procedure, &prerequisite, !no)?,
        Commands::Skip {
            procedure,
            prerequisite,
        } => store.skip_prerequisite(&procedure, &prerequisite)?,
        Commands::Segment {
            procedure,
            segmentation,
        } => store.set_segmentation(&procedure, segmentation.into())?,
        Commands::Phase { procedure, phase } => store.change_phase(&procedure, phase)?,
        Commands::Advance { procedure } => store.advance(&procedure)?,
        Commands::BranchOpen {
            procedure,
            target,
            prerequisite,
            reason,
        } => {
            let branch = store.open_branch(&procedure, &target, &prerequisite, &reason)?;
            if !json {
                println!("{} {}", "Branch".green(), branch.branch_id);
            }
            store.get(&procedure)?
        }
        Commands::BranchClose {
            procedure,
            branch_id,
            cancel,
        } => store.close_branch(&procedure, branch_id, cancel)?,
        Commands::List | Commands::Resolve { .. } | Commands::Plan { .. } => {
            return Ok(());
        }
    };

    engine
        .persist(&repository)
        .with_context(|| format!("Failed to write {}", config.progress_path.display()))?;

    if json {
        print_json(&state)
    } else {
        print_state(&state);
        Ok(())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_state(state: &ProgressState) {
    println!(
        "{} {} → {}",
        "OK".green(),
        state.procedure_id.bold(),
        state.phase.to_string().cyan()
    );
}

fn print_summary(summary: &ProgressSummary) {
    println!("{}", summary.procedure_id.cyan().bold());
    println!("{}", "═".repeat(60));
    println!(
        "Fase: {} {}",
        summary.phase,
        summary.phase_title.as_deref().unwrap_or_default().dimmed()
    );
    println!("Avance: {:.0}%", summary.progress);
    if let Some(next) = summary.next_phase {
        println!("Siguiente: {}", next);
    }

    println!();
    for item in &summary.prerequisites {
        let mark = match item.status {
            PrerequisiteStatus::Have => "✓".green(),
            PrerequisiteStatus::Skipped => "»".yellow(),
            PrerequisiteStatus::Missing => "✗".red(),
            PrerequisiteStatus::Unanswered => "?".dimmed(),
        };
        println!("  {} {} [{}]", mark, item.prerequisite.name, item.prerequisite.id);
    }

    if !summary.blockers.is_empty() {
        println!();
        println!("{}", "Bloqueos".red().bold());
        for blocker in &summary.blockers {
            println!("  • {}", blocker.description);
        }
    }

    if !summary.open_branches.is_empty() {
        println!();
        println!("{}", "Trámites relacionados abiertos".yellow().bold());
        for branch in &summary.open_branches {
            println!(
                "  {} {} ({})",
                branch.branch_id, branch.target_procedure_id, branch.state
            );
        }
    }
}

fn print_plan(plan: &VisitPlan) {
    if plan.is_empty() {
        println!("{}", "Este trámite no requiere visitas".dimmed());
        return;
    }
    for entry in &plan.entries {
        match &entry.location {
            Some(location) => println!(
                "{:>2}. {} {} ({:.1} km)",
                entry.order,
                location.name.bold(),
                location.address.dimmed(),
                entry.distance_km
            ),
            None => println!(
                "{:>2}. {} {}",
                entry.order,
                entry.institution_type.bold(),
                "sin oficina conocida".red()
            ),
        }
        if !entry.description.is_empty() {
            println!("    {}", entry.description);
        }
    }
    println!("{}", "─".repeat(60));
    println!("Total: {:.1} km", plan.total_distance_km);
}
