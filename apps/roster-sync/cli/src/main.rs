//! roster-sync CLI - preview and run LMS roster synchronization.
//!
//! The LMS side is backed by a local JSON state file (see `--state`);
//! production deployments embed `roster-sync-core` and bind the store
//! traits to the host LMS instead.

mod output;

use clap::{Parser, Subcommand};
use roster_sync_core::{
    build_idp_client, run_scheduled, run_sync, EngineDeps, LmsSnapshot, MemoryJobStore, MemoryLms,
    SyncConfig, SyncContext, SyncSelection, SyncService,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_common::SyncDirection;

#[derive(Parser)]
#[command(name = "roster-sync")]
#[command(about = "Synchronize LMS users, courses, and enrolments with an identity provider")]
#[command(version)]
struct Cli {
    /// Settings file (JSON); environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local LMS state file
    #[arg(long, global = true, default_value = "lms-state.json")]
    state: PathBuf,

    /// Actor id recorded on jobs
    #[arg(long, global = true, default_value_t = 1)]
    actor: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the full delta without writing anything
    Preview,

    /// Run a synchronization
    Run {
        /// Restrict the run to these usernames (repeatable)
        #[arg(long = "user")]
        users: Vec<String>,

        /// Restrict the run to these group names (repeatable)
        #[arg(long = "group")]
        groups: Vec<String>,
    },

    /// Periodic entry point; does nothing unless sync is enabled
    Scheduled,
}

fn selection_from(users: Vec<String>, groups: Vec<String>) -> SyncSelection {
    SyncSelection {
        users: if users.is_empty() {
            None
        } else {
            Some(users.into_iter().map(|u| u.to_lowercase()).collect())
        },
        groups: if groups.is_empty() {
            None
        } else {
            Some(groups.into_iter().collect())
        },
    }
}

fn load_lms(path: &Path) -> anyhow::Result<Arc<MemoryLms>> {
    if path.exists() {
        let snapshot: LmsSnapshot = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Arc::new(MemoryLms::from_snapshot(snapshot)))
    } else {
        Ok(Arc::new(MemoryLms::new()))
    }
}

fn save_lms(path: &Path, lms: &MemoryLms) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(&lms.snapshot())?)?;
    Ok(())
}

fn build_deps(config: &SyncConfig, lms: &Arc<MemoryLms>) -> anyhow::Result<EngineDeps> {
    let idp = Arc::new(build_idp_client(config)?);
    Ok(EngineDeps {
        idp,
        users: lms.clone(),
        courses: lms.clone(),
        categories: lms.clone(),
        enrolments: lms.clone(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;

    let lms = load_lms(&cli.state)?;
    let job_store = Arc::new(MemoryJobStore::new());
    let service = SyncService::new(job_store.clone());

    match cli.command {
        Commands::Preview => {
            let deps = build_deps(&config, &lms)?;
            let preview = service
                .preview(cli.actor, deps, config, SyncSelection::all())
                .await?;
            output::print_preview(&preview);
        }

        Commands::Run { users, groups } => {
            let deps = build_deps(&config, &lms)?;
            let runtime = roster_sync_core::SyncRuntime {
                config,
                deps,
                job_store: job_store.clone(),
            };

            let receipt = service.start(cli.actor, SyncDirection::IdpToLms).await?;
            log::info!("started sync {}", receipt.sync_id);

            let result = run_sync(
                &runtime,
                SyncContext {
                    sync_id: receipt.sync_id.clone(),
                    direction: SyncDirection::IdpToLms,
                    actor_id: cli.actor,
                    selection: selection_from(users, groups),
                },
            )
            .await;

            save_lms(&cli.state, &lms)?;

            match result {
                Ok(report) => {
                    let job = service.status(cli.actor, &receipt.sync_id).await?;
                    output::print_job(&job);
                    output::print_report(&report);
                    std::process::exit(output::exit_code_for_report(&report));
                }
                Err(err) => {
                    let job = service.status(cli.actor, &receipt.sync_id).await?;
                    output::print_job(&job);
                    output::print_error(&format!("sync failed: {}", err));
                    std::process::exit(1);
                }
            }
        }

        Commands::Scheduled => {
            let deps = build_deps(&config, &lms)?;
            let runtime = roster_sync_core::SyncRuntime {
                config,
                deps,
                job_store,
            };

            match run_scheduled(&service, &runtime, cli.actor).await? {
                Some(report) => {
                    save_lms(&cli.state, &lms)?;
                    output::print_report(&report);
                }
                None => output::print_success("scheduled sync skipped"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_means_everything() {
        let selection = selection_from(vec![], vec![]);
        assert!(selection.users.is_none());
        assert!(selection.groups.is_none());
    }

    #[test]
    fn usernames_are_lowercased() {
        let selection = selection_from(vec!["Alice".into()], vec!["10a".into()]);
        assert!(selection.users.unwrap().contains("alice"));
        assert!(selection.groups.unwrap().contains("10a"));
    }
}
