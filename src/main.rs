//! Dracode CLI entry point.

use clap::Parser;
use eyre::{Context, Result};

use dracode::cli::{Cli, Command};
use dracode::config::Config;
use dracode::council::CouncilState;
use dracode::domain::ProjectStatus;
use dracode::pipeline::control;
use dracode::runtime::Runtime;
use dracode::store::ProjectStore;

fn setup_logging(verbose: bool) {
    let default_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        None | Some(Command::Start) => {
            let runtime = Runtime::start(config).await?;
            runtime.run().await
        }

        Some(Command::Status) => {
            let store = ProjectStore::open(&config.storage.root).await?;
            let projects = store.list_projects(None).await;

            println!("Dracode v{}", env!("CARGO_PKG_VERSION"));
            println!("  store: {}", config.storage.root.display());
            println!("  projects: {}", projects.len());

            let mut counts = std::collections::BTreeMap::new();
            for project in &projects {
                *counts.entry(project.status.to_string()).or_insert(0usize) += 1;
            }
            for (status, count) in counts {
                println!("    {}: {}", status, count);
            }
            Ok(())
        }

        Some(Command::Projects) => {
            let store = ProjectStore::open(&config.storage.root).await?;
            for project in store.list_projects(None).await {
                println!("{} | {} | {}", project.id, project.name, project.status);
            }
            Ok(())
        }

        Some(Command::Pause { project }) => {
            with_project(&config, &project, |store, id| async move {
                control::pause(&store, &id).await.map_err(Into::into)
            })
            .await
        }

        Some(Command::Resume { project }) => {
            with_project(&config, &project, |store, id| async move {
                control::resume(&store, &id).await.map_err(Into::into)
            })
            .await
        }

        Some(Command::Suspend { project }) => {
            with_project(&config, &project, |store, id| async move {
                control::suspend(&store, &id).await.map_err(Into::into)
            })
            .await
        }

        Some(Command::Cancel { project }) => {
            with_project(&config, &project, |store, id| async move {
                control::cancel(&store, &id).await.map_err(Into::into)
            })
            .await
        }

        Some(Command::Retry { project, tasks }) => {
            with_project(&config, &project, move |store, id| async move {
                // Task resets stand alone: an InProgress project can carry
                // retry-capped Failed tasks while the project itself never
                // left InProgress. Only a Failed project goes back to New.
                let current = store.get_project(&id).await?;
                if current.status == ProjectStatus::Failed {
                    control::retry(&store, &id).await?;
                } else if !tasks {
                    println!("Project is {}, not failed; use --tasks to reset failed tasks", current.status);
                }
                if tasks {
                    let reset = control::retry_failed_tasks(&store, &id).await?;
                    println!("Reset {} failed tasks", reset);
                }
                Ok(())
            })
            .await
        }
    }
}

async fn with_project<F, Fut>(config: &Config, reference: &str, f: F) -> Result<()>
where
    F: FnOnce(ProjectStore, String) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let store = ProjectStore::open(&config.storage.root).await?;
    let state = CouncilState::new(store.clone());
    let project = state
        .resolve_project(reference)
        .await
        .context(format!("No project matching '{}'", reference))?;

    f(store, project.id.clone()).await?;
    println!("ok: {}", project.id);
    Ok(())
}
