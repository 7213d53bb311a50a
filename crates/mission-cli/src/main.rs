//! mdecomp - multi-robot mission decomposition CLI.
//!
//! Takes a planning domain, a goal model, a world database, and a
//! configuration file; emits one `ihtn_k.json` per valid, totally-ordered
//! mission plan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use mission_gm::{GoalModel, KnowledgeBase};
use mission_model::Domain;
use mission_plan::{Pipeline, PipelineOptions};

mod config;

use config::Settings;

#[derive(Parser)]
#[command(name = "mdecomp")]
#[command(about = "Multi-robot mission decomposition", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a mission and write the resulting iHTNs
    Plan {
        /// Planning domain (JSON)
        #[arg(long)]
        domain: PathBuf,

        /// Goal model (istar JSON)
        #[arg(long, value_name = "FILE")]
        goal_model: PathBuf,

        /// Configuration file (YAML or JSON)
        #[arg(long)]
        config: PathBuf,

        /// World database (JSON); defaults to the configuration's
        /// world_db path
        #[arg(long)]
        world: Option<PathBuf>,

        /// Output directory; defaults to the configuration's output path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate the inputs without planning
    Check {
        /// Planning domain (JSON)
        #[arg(long)]
        domain: PathBuf,

        /// Goal model (istar JSON)
        #[arg(long, value_name = "FILE")]
        goal_model: PathBuf,

        /// Configuration file (YAML or JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let outcome = match cli.command {
        Commands::Plan {
            domain,
            goal_model,
            config,
            world,
            output,
        } => run_plan(&domain, &goal_model, &config, world.as_deref(), output.as_deref()),
        Commands::Check {
            domain,
            goal_model,
            config,
        } => run_check(&domain, &goal_model, &config),
    };

    if let Err(error) = outcome {
        // Pipeline errors carry the exit code the surrounding tooling
        // expects; anything else is an I/O failure.
        let code = error
            .downcast_ref::<mission_model::PlanError>()
            .map(|e| e.exit_code())
            .unwrap_or(1);
        tracing::error!("{error:#}");
        std::process::exit(code);
    }
}

fn run_plan(
    domain_path: &Path,
    goal_model_path: &Path,
    config_path: &Path,
    world_path: Option<&Path>,
    output_path: Option<&Path>,
) -> Result<()> {
    let settings = Settings::load(config_path)?;

    let world_path = world_path
        .map(Path::to_path_buf)
        .or_else(|| settings.world_db.as_ref().map(|db| db.path.clone()))
        .context("no world database given on the command line or in the configuration")?;

    let domain = load_domain(domain_path)?;
    let gm = load_goal_model(goal_model_path)?;
    let kb = load_world(&world_path)?;

    let variable_mappings = settings.variable_mappings();
    let trees = Pipeline {
        domain: &domain,
        gm: &gm,
        kb: &kb,
        var_mappings: &variable_mappings,
        semantic_mappings: &settings.semantic_mapping,
        options: PipelineOptions {
            strict: settings.strict,
            max_candidates_per_operator_node: settings.max_candidates_per_operator_node,
            agent_sorts: settings.agent_sorts(),
        },
    }
    .run()?;

    let output_dir = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| settings.output.file_path.clone());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;

    for tree in &trees {
        let path = output_dir.join(&tree.file_name);
        let rendered = serde_json::to_string_pretty(&tree.json)?;
        std::fs::write(&path, rendered)
            .with_context(|| format!("cannot write {}", path.display()))?;
        tracing::info!(file = %path.display(), "wrote iHTN");
    }

    println!("{} iHTN(s) written to {}", trees.len(), output_dir.display());
    Ok(())
}

fn run_check(domain_path: &Path, goal_model_path: &Path, config_path: &Path) -> Result<()> {
    let settings = Settings::load(config_path)?;
    let domain = load_domain(domain_path)?;
    let gm = load_goal_model(goal_model_path)?;

    domain.validate()?;
    gm.check_validity()?;
    settings.validate()?;

    println!(
        "ok: domain [{}] with {} abstract task(s), goal model with {} node(s)",
        domain.name,
        domain.abstract_tasks.len(),
        gm.len()
    );
    Ok(())
}

fn load_domain(path: &Path) -> Result<Domain> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read domain from {}", path.display()))?;
    let domain: Domain = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse domain from {}", path.display()))?;
    Ok(domain)
}

fn load_goal_model(path: &Path) -> Result<GoalModel> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read goal model from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse goal model from {}", path.display()))?;
    Ok(GoalModel::from_json(&value)?)
}

fn load_world(path: &Path) -> Result<KnowledgeBase> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read world database from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse world database from {}", path.display()))?;
    Ok(KnowledgeBase::new(value)?)
}
