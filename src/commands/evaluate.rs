use addon_health_core::evaluator;
use addon_health_core::types::ProbeOutcome;
use addon_health_core::work_index::{KubeWorkIndex, WorkIndex};
use anyhow::Context;
use kube::Client;

use crate::commands::registry::demo_registry;

pub async fn run(cluster: &str, addon: &str) -> anyhow::Result<()> {
    let client = Client::try_default().await.context("Failed to load kubeconfig")?;

    let registry = demo_registry();
    let descriptor = registry.lookup(addon);
    let health_prober = descriptor.as_ref().and_then(|d| d.health_prober.as_ref());

    let Some(health_prober) = health_prober else {
        println!("No registered prober for addon '{addon}' — reconcile would issue no write.");
        return Ok(());
    };

    let work_index = KubeWorkIndex::new(client);
    let works = work_index.list(cluster, addon).await?;

    println!("Evaluating (cluster={cluster}, addon={addon}) against {} ManifestWork", works.len());

    match evaluator::evaluate(Some(health_prober), &works) {
        ProbeOutcome::Skip => println!("Outcome: Skip (no write)"),
        ProbeOutcome::ModeOnly(mode) => println!("Outcome: ModeOnly({mode})"),
        ProbeOutcome::Verdict(v) => {
            println!("Outcome: Verdict {{ status: {}, reason: {}, message: {} }}", v.status, v.reason, v.message);
        }
    }

    Ok(())
}
