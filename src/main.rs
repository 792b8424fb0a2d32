//! forgeshift — unattended forge-to-forge migration
//!
//! Three cooperating agents behind one binary: discover (read-only
//! inventory + estimation), export (checkpointed extraction), apply
//! (plan-driven reconstruction), plus SOW synthesis over an inventory.

use clap::{Parser, Subcommand};
use forgeshift_apply::{ApplyContext, ApplyOptions, ApplyOrchestrator, Credentials};
use forgeshift_client::{ClientOptions, GitHubClient, GitLabClient};
use forgeshift_discovery::{DiscoveryConfig, DiscoveryOrchestrator};
use forgeshift_export::{ExportOptions, ExportOrchestrator};
use forgeshift_llm::{AzureOpenAiProvider, ChatProvider, LlmSettings};
use forgeshift_sow::{generate_sow, SowOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INTERRUPT: u8 = 130;

#[derive(Parser)]
#[command(
    name = "forgeshift",
    about = "Forge migration toolkit — discover, export, apply"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a source forge and produce a validated inventory
    Discover {
        /// Source forge URL (or GITLAB_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,
        /// Personal access token (or GITLAB_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// Root group to scan; omit to scan all accessible groups
        #[arg(long)]
        root_group: Option<String>,
        /// Single project path or id to scan; overrides --root-group
        #[arg(long)]
        project: Option<String>,
        /// Output directory for inventory.json and summary.txt
        #[arg(long, default_value = "./output")]
        out: String,
        /// Global API call budget
        #[arg(long, default_value_t = 5000)]
        max_api_calls: u64,
        /// Per-project API call budget
        #[arg(long, default_value_t = 200)]
        max_per_project_calls: u64,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Skip TLS certificate verification
        #[arg(long)]
        no_verify_ssl: bool,
        /// Enable deep analysis with hour estimates
        #[arg(long)]
        deep: bool,
        /// Deep-analyze only the N riskiest projects (0 = all)
        #[arg(long, default_value_t = 20)]
        deep_top_n: usize,
        /// Deep analyzer worker count
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Enable model-assisted estimation (needs provider env vars)
        #[arg(long)]
        ai: bool,
    },
    /// Export one project's full state to an artifact tree
    Export {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        token: Option<String>,
        /// Project path or id to export
        #[arg(long)]
        project: String,
        #[arg(long, default_value = "./export")]
        out: PathBuf,
        /// Resume an earlier run by id
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Execute an action plan against the destination forge
    Apply {
        /// Destination token (or GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// Action plan JSON file
        #[arg(long)]
        plan: PathBuf,
        /// Simulate every action instead of executing
        #[arg(long)]
        dry_run: bool,
        /// Keep going past failed actions instead of aborting
        #[arg(long)]
        continue_on_error: bool,
        /// Roll back executed actions if the run aborts
        #[arg(long)]
        rollback_on_abort: bool,
        /// Write the run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Generate a statement of work from an inventory
    Sow {
        /// inventory.json produced by discover
        #[arg(long)]
        inventory: PathBuf,
        /// Comma-separated project ids (default: all)
        #[arg(long)]
        select: Option<String>,
        #[arg(long, default_value = "")]
        client_name: String,
        /// Hourly rate for the indicative budget line
        #[arg(long)]
        rate: Option<f64>,
        /// Output Markdown file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Generate sections with the configured model provider
        #[arg(long)]
        ai: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forgeshift=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn watch_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });
}

fn env_or(flag: Option<String>, key: &str) -> Option<String> {
    flag.or_else(|| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli.command).await {
        Ok(interrupted) => {
            if interrupted {
                EXIT_INTERRUPT
            } else {
                EXIT_OK
            }
        }
        Err(e) => {
            error!("{e:#}");
            EXIT_ERROR
        }
    };
    ExitCode::from(code)
}

/// Returns whether the run was interrupted.
async fn run(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Discover {
            base_url,
            token,
            root_group,
            project,
            out,
            max_api_calls,
            max_per_project_calls,
            timeout,
            no_verify_ssl,
            deep,
            deep_top_n,
            workers,
            ai,
        } => {
            let config = DiscoveryConfig {
                base_url: base_url.unwrap_or_default(),
                token: token.unwrap_or_default(),
                root_group,
                project_path: project,
                output_dir: out,
                max_api_calls,
                max_per_project_calls,
                timeout_secs: timeout,
                verify_ssl: !no_verify_ssl,
                deep,
                deep_top_n,
                parallel_workers: workers,
                ai_enabled: ai,
                llm: LlmSettings::from_env(),
            }
            .with_env_defaults()
            .normalized()?;

            let orchestrator = DiscoveryOrchestrator::new(config);
            let cancel = orchestrator.cancel_token();
            watch_interrupt(cancel.clone());

            let inventory = orchestrator.run().await?;
            info!(
                projects = inventory.run.stats.projects,
                api_calls = inventory.run.stats.api_calls,
                "discovery finished"
            );
            Ok(cancel.is_cancelled())
        }

        Commands::Export {
            base_url,
            token,
            project,
            out,
            run_id,
        } => {
            let base_url = env_or(base_url, "GITLAB_BASE_URL")
                .ok_or_else(|| anyhow::anyhow!("--base-url or GITLAB_BASE_URL is required"))?;
            let token = env_or(token, "GITLAB_TOKEN")
                .ok_or_else(|| anyhow::anyhow!("--token or GITLAB_TOKEN is required"))?;

            let client = Arc::new(GitLabClient::new(
                &base_url,
                &token,
                ClientOptions::default(),
            )?);
            let orchestrator = ExportOrchestrator::new(
                client,
                ExportOptions {
                    output_dir: out,
                    run_id,
                },
            );
            let cancel = orchestrator.cancel_token();
            watch_interrupt(cancel.clone());

            let result = orchestrator.export_project(&project).await?;
            info!(
                status = ?result.status,
                output = %result.output_dir,
                "export finished"
            );
            if result.status == forgeshift_export::ExportStatus::Failed {
                anyhow::bail!("export completed with failed components");
            }
            Ok(cancel.is_cancelled())
        }

        Commands::Apply {
            token,
            plan,
            dry_run,
            continue_on_error,
            rollback_on_abort,
            report,
        } => {
            let token = env_or(token, "GITHUB_TOKEN")
                .ok_or_else(|| anyhow::anyhow!("--token or GITHUB_TOKEN is required"))?;

            let plan = forgeshift_apply::ActionPlan::load(&plan)?;
            let client = GitHubClient::new(&token)?;
            let orchestrator = ApplyOrchestrator::new(client);
            let cancel = orchestrator.cancel_token();
            watch_interrupt(cancel.clone());

            let mut ctx = ApplyContext::new(Credentials {
                destination_token: token,
            });
            let options = ApplyOptions {
                dry_run,
                continue_on_error,
                rollback_on_abort,
                ..ApplyOptions::default()
            };
            let run_report = orchestrator.run(&plan, &mut ctx, &options).await?;

            info!(
                executed = run_report.executed,
                failed = run_report.failed,
                success = run_report.success,
                "apply finished"
            );
            if let Some(report_path) = report {
                forgeshift_core::util::write_json_atomic(&report_path, &run_report)?;
                info!(path = %report_path.display(), "report written");
            }
            if !run_report.success {
                anyhow::bail!("apply run failed");
            }
            Ok(cancel.is_cancelled())
        }

        Commands::Sow {
            inventory,
            select,
            client_name,
            rate,
            out,
            ai,
        } => {
            let inventory: serde_json::Value = forgeshift_core::util::read_json(&inventory)?;
            let selected: Vec<u64> = select
                .map(|s| {
                    s.split(',')
                        .filter_map(|id| id.trim().parse().ok())
                        .collect()
                })
                .unwrap_or_default();

            let provider: Option<Box<dyn ChatProvider>> = if ai {
                let settings = LlmSettings::from_env();
                if settings.is_configured() {
                    Some(Box::new(AzureOpenAiProvider::new(settings)))
                } else {
                    anyhow::bail!("--ai requires the model provider environment variables");
                }
            } else {
                None
            };

            let output = generate_sow(
                &inventory,
                &selected,
                &SowOptions {
                    client_name,
                    hourly_rate: rate,
                },
                provider.as_deref(),
            )
            .await;

            match out {
                Some(path) => {
                    std::fs::write(&path, &output.markdown)?;
                    info!(path = %path.display(), "SOW written");
                }
                None => println!("{}", output.markdown),
            }
            Ok(false)
        }
    }
}
