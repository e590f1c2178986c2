use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kubetest_azure::core::config::deployer_config::{DeployerConfig, KUBECONFIG_ENV};
use kubetest_azure::domain::deployer::cluster_orchestrator::ClusterOrchestrator;
use kubetest_azure::domain::deployer::deployer_factory::build_orchestrator;
use kubetest_azure::domain::deployer::deployer_trait::Deployer;
use kubetest_azure::logging;

const VERBS: &[&str] = &["up", "down", "is-up", "test-setup", "dump-logs", "created"];

#[derive(Debug, PartialEq)]
enum Action {
    Up,
    Down,
    IsUp,
    TestSetup,
    DumpLogs { local: PathBuf, remote: String },
    Created { name: Option<String> },
}

impl Action {
    /// Parse verbs in order, e.g. `up is-up dump-logs ./logs down`. No verbs means `up`.
    fn parse_all(args: impl Iterator<Item = String>) -> Result<Vec<Self>> {
        let mut args = args.peekable();
        let mut actions = Vec::new();

        while let Some(verb) = args.next() {
            let action = match verb.as_str() {
                "up" => Action::Up,
                "down" => Action::Down,
                "is-up" => Action::IsUp,
                "test-setup" => Action::TestSetup,
                "dump-logs" => {
                    let local = args
                        .next_if(|a| !is_verb(a))
                        .map(PathBuf::from)
                        .ok_or_else(|| anyhow!("dump-logs needs a local directory"))?;
                    Action::DumpLogs {
                        local,
                        remote: args.next_if(|a| !is_verb(a)).unwrap_or_default(),
                    }
                }
                "created" => Action::Created {
                    name: args.next_if(|a| !is_verb(a)),
                },
                other => bail!("unknown action '{}' (expected one of {})", other, VERBS.join(", ")),
            };
            actions.push(action);
        }

        if actions.is_empty() {
            actions.push(Action::Up);
        }
        Ok(actions)
    }
}

fn is_verb(arg: &str) -> bool {
    VERBS.contains(&arg)
}

/// A made-up resource name only refers to a cluster this run brought up.
fn check_plan(actions: &[Action], name_synthesized: bool) -> Result<()> {
    if !name_synthesized {
        return Ok(());
    }
    let mut brought_up = false;
    for action in actions {
        match action {
            Action::Up => brought_up = true,
            Action::Down | Action::Created { name: None } if !brought_up => bail!(
                "{:?} needs KUBETEST_AZURE_RESOURCE_NAME unless an earlier 'up' runs in the same invocation",
                action
            ),
            _ => {}
        }
    }
    Ok(())
}

async fn run(deployer: &mut ClusterOrchestrator, action: Action) -> Result<()> {
    let default_name = deployer.spec().name.clone();
    let outcome = match action {
        Action::Up => deployer.up().await,
        Action::Down => deployer.down().await,
        Action::IsUp => deployer.is_up().await,
        Action::TestSetup => deployer.test_setup().await,
        Action::DumpLogs { local, remote } => deployer.dump_cluster_logs(&local, &remote).await,
        Action::Created { name } => {
            let name = name.unwrap_or(default_name);
            deployer.get_cluster_created(&name).await.map(|ts| {
                println!("{}", ts.to_rfc3339());
            })
        }
    };

    if let Err(e) = &outcome {
        error!(error = %e, stage = ?e.stage(), "Action failed");
    }
    outcome?;

    // set_var is process-global. This is its only caller, and it runs between
    // actions when no spawned work reads the environment.
    if let Some(path) = deployer.exported_config() {
        if std::env::var_os(KUBECONFIG_ENV).as_deref() != Some(path.as_os_str()) {
            std::env::set_var(KUBECONFIG_ENV, path);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _guard = logging::init_tracing()?;

    let actions = Action::parse_all(std::env::args().skip(1))?;
    let config = DeployerConfig::from_env()?;
    check_plan(&actions, config.name_synthesized)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let mut deployer = build_orchestrator(&config, None, cancel).await?;
    for action in actions {
        info!(action = ?action, cluster = %config.cluster.name, "Running");
        run(&mut deployer, action).await?;
    }
    Ok(())
}
