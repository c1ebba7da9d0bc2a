use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;

use composition_orchestrator::domain::orchestration::context::NodeTaskSettings;
use composition_orchestrator::domain::orchestration::coordinator::CompositionOutcome;
use composition_orchestrator::domain::orchestration::removal::RemovalOutcome;
use composition_orchestrator::domain::orchestration::service::CompositionService;
use composition_orchestrator::domain::simulator::SimulatedInfrastructure;
use composition_orchestrator::domain::utils::id::{CompositeLink, TrackerLink};
use composition_orchestrator::domain::utils::progress_log::ProgressLog;
use composition_orchestrator::load_composition;
use composition_orchestrator::loader::parser::CompositionScenario;

/// Provisions a composite description against simulated infrastructure.
#[derive(Parser, Debug)]
#[command(name = "composition-orchestrator", version, about)]
struct Args {
    /// Composition file (JSON).
    file: PathBuf,

    /// Write per-component request progress to this CSV file.
    #[arg(long)]
    progress_csv: Option<PathBuf>,

    /// Fail node tasks whose dependencies don't complete within this many seconds.
    #[arg(long)]
    dependency_timeout_secs: Option<u64>,

    /// Make allocation of this component fail. Repeatable.
    #[arg(long)]
    fail_allocation: Vec<String>,

    /// Make provisioning of this component fail. Repeatable.
    #[arg(long)]
    fail_provisioning: Vec<String>,

    /// Latency of every simulated provisioner call in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Remove the composite again after it was provisioned.
    #[arg(long)]
    remove: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let file = args.file.to_string_lossy().to_string();
    let mut scenario = load_composition(&file).with_context(|| format!("loading composition file '{}'", file))?;
    scenario.simulator.fail_allocation.extend(args.fail_allocation.iter().cloned());
    scenario.simulator.fail_provisioning.extend(args.fail_provisioning.iter().cloned());
    if let Some(delay_ms) = args.delay_ms {
        scenario.simulator.delay = Duration::from_millis(delay_ms);
    }

    let system = actix::System::new();
    system.block_on(run(args, scenario))
}

async fn run(args: Args, mut scenario: CompositionScenario) -> anyhow::Result<()> {
    let infrastructure = SimulatedInfrastructure::new(scenario.simulator.clone());
    infrastructure.descriptions.insert(scenario.description.clone());

    let settings = NodeTaskSettings { dependency_timeout: args.dependency_timeout_secs.map(Duration::from_secs) };
    let mut context = infrastructure.context().with_settings(settings);

    let progress = args.progress_csv.as_ref().map(|path| Arc::new(ProgressLog::init(Some(path.to_string_lossy().to_string()))));
    if let Some(progress) = &progress {
        context = context.with_tracker(progress.clone());
        if scenario.request.tracker_link.is_none() {
            scenario.request.tracker_link = Some(TrackerLink::new(format!("/request-status/{}", scenario.description.name)));
        }
    }

    let service = CompositionService::new(context);
    let outcome = service.compose(scenario.request.clone()).await?;

    let result = match &outcome {
        CompositionOutcome::Completed { composite_link, resource_links } => {
            log::info!("Composition completed: {} with {} resources.", composite_link, resource_links.len());
            for link in resource_links {
                log::info!("  {}", link);
            }
            if args.remove {
                remove(&service, composite_link.clone(), scenario.request.tenant_links.clone()).await
            } else {
                Ok(())
            }
        }
        CompositionOutcome::Failed { failure, cleanup, .. } => {
            log::error!("Composition failed: {}", failure);
            if let Some(cleanup) = cleanup {
                log::info!("Cleanup: {:?}", cleanup);
            }
            Err(anyhow::anyhow!("composition of '{}' failed: {}", scenario.description.name, failure))
        }
    };

    if let Some(progress) = progress {
        progress.close();
    }
    result
}

async fn remove(service: &CompositionService, composite_link: CompositeLink, tenant_links: Vec<String>) -> anyhow::Result<()> {
    match service.remove(vec![composite_link.clone()], tenant_links).await? {
        RemovalOutcome::Completed { removed_links } => {
            log::info!("Removed {} and its {} resources.", composite_link, removed_links.len());
            Ok(())
        }
        RemovalOutcome::Failed { failure, .. } => bail!("removal of {} failed: {}", composite_link, failure),
    }
}
