//! etlbench - evaluation harness for ETL-repair agents
//!
//! ## Commands
//!
//! - `run`: run N agent trials against the broken incremental load job
//! - `grade`: replay the scenario against an SQL file, no engine involved
//! - `task`: print the instructions given to the agent

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use etlbench_core::config::{EvalConfig, ModeName};
use etlbench_core::reporting::{render_summary, render_trial_line};
use etlbench_core::scenario::artifact_digest;
use etlbench_core::{
    extract_artifact, task_prompt, AnthropicEngine, Grader, Orchestrator, TrialRecord,
};

#[derive(Parser)]
#[command(name = "etlbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluation harness for agents repairing an incremental ETL job", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agent trials and print the pass rate
    Run {
        /// Number of trials
        #[arg(short = 'n', long)]
        trials: Option<usize>,

        /// Run trials concurrently instead of one after another
        #[arg(long)]
        concurrent: bool,

        /// Maximum trials in flight in concurrent mode
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Conversation turn budget per trial
        #[arg(long)]
        max_steps: Option<usize>,

        /// Model identifier sent to the engine
        #[arg(long)]
        model: Option<String>,

        /// Directory receiving run artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Anthropic API key
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Grade an SQL job offline against the scenario
    Grade {
        /// SQL file (plain, or fenced Markdown)
        artifact: PathBuf,

        /// Keep the replay databases here instead of a temporary directory
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Scenario seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the task prompt (embeds the broken job)
    Task,
}

/// CLI flags that override the loaded configuration.
#[derive(Debug, Default)]
struct RunOverrides {
    trials: Option<usize>,
    concurrent: bool,
    max_concurrency: Option<usize>,
    max_steps: Option<usize>,
    model: Option<String>,
    output_dir: Option<PathBuf>,
    seed: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut EvalConfig) {
        if let Some(trials) = self.trials {
            config.orchestrator.trials = trials;
        }
        if self.concurrent {
            config.orchestrator.mode = ModeName::Concurrent;
        }
        if let Some(n) = self.max_concurrency {
            config.orchestrator.max_concurrency = n;
        }
        if let Some(steps) = self.max_steps {
            config.driver.max_steps = steps;
        }
        if let Some(model) = self.model {
            config.engine.model = model;
        }
        if let Some(dir) = self.output_dir {
            config.orchestrator.output_dir = dir;
        }
        if let Some(seed) = self.seed {
            config.scenario.seed = seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    etlbench_core::init_tracing(cli.json, level);

    let mut config = EvalConfig::load(cli.config.as_deref())
        .with_context(|| format!("Failed to load configuration {:?}", cli.config))?;

    match cli.command {
        Commands::Run {
            trials,
            concurrent,
            max_concurrency,
            max_steps,
            model,
            output_dir,
            seed,
            api_key,
        } => {
            RunOverrides {
                trials,
                concurrent,
                max_concurrency,
                max_steps,
                model,
                output_dir,
                seed,
            }
            .apply(&mut config);
            cmd_run(config, api_key.unwrap_or_default()).await
        }
        Commands::Grade {
            artifact,
            work_dir,
            seed,
        } => {
            if let Some(seed) = seed {
                config.scenario.seed = seed;
            }
            cmd_grade(config, &artifact, work_dir.as_deref()).await
        }
        Commands::Task => {
            config.validate()?;
            print!("{}", task_prompt(&config.scenario));
            Ok(())
        }
    }
}

async fn cmd_run(config: EvalConfig, api_key: String) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let engine = AnthropicEngine::new(&config.engine, api_key)
        .context("Failed to create engine client")?;
    let orchestrator = Orchestrator::new(&config, Arc::new(engine))?;

    info!(
        trials = orchestrator.trials(),
        mode = ?orchestrator.mode(),
        model = %config.engine.model,
        "Starting run"
    );
    println!(
        "Running {} trial(s) ({:?}) with {}",
        orchestrator.trials(),
        orchestrator.mode(),
        config.engine.model
    );

    let print_line = |record: &TrialRecord| println!("{}", render_trial_line(record));
    let output = orchestrator.run(Some(&print_line)).await?;

    println!();
    print!("{}", render_summary(&output.summary));
    println!("Artifacts: {}", output.run_dir.display());
    Ok(())
}

async fn cmd_grade(config: EvalConfig, artifact: &Path, work_dir: Option<&Path>) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let text = std::fs::read_to_string(artifact)
        .with_context(|| format!("Failed to read artifact {:?}", artifact))?;
    let sql = extract_artifact(&text);

    // Held until grading is done when no work dir was given.
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let dir = match work_dir {
        Some(dir) => dir.to_path_buf(),
        None => scratch.path().join("grader"),
    };

    let digest = artifact_digest(&sql);
    let grade = Grader::new(config.scenario, &dir)
        .grade_async(Some(sql))
        .await?;

    println!("Artifact: {} (sha256 {})", artifact.display(), &digest[..12]);
    println!(
        "Replayed {} day(s), {} invocation(s)",
        grade.days_replayed, grade.invocations
    );
    if grade.passed {
        println!("PASSED: every invariant held");
    } else {
        println!("FAILED: {} failure(s)", grade.failures.len());
        for failure in &grade.failures {
            println!("  - {failure}");
        }
    }
    if work_dir.is_some() {
        println!("Replay databases kept in {}", dir.display());
    }
    Ok(())
}
