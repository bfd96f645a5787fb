use addon_health_core::registry::AgentRegistry;
use addon_health_core::types::HealthProber;

/// The CLI binary has no channel of its own for add-on authors to register
/// descriptors (that contract belongs to the embedding process, per the
/// agent descriptor contract) — so this command seeds a small illustrative
/// registry for local inspection, the same role `commands::list` plays for
/// live cluster state in the teacher binary.
pub fn demo_registry() -> AgentRegistry {
    let registry = AgentRegistry::new();
    registry.register(addon_health_core::types::AgentDescriptor {
        addon_name: "cert-manager-addon".to_string(),
        health_prober: Some(HealthProber::Lease),
    });
    registry.register(addon_health_core::types::AgentDescriptor {
        addon_name: "policy-controller-addon".to_string(),
        health_prober: Some(HealthProber::DeploymentAvailability),
    });
    registry.register(addon_health_core::types::AgentDescriptor {
        addon_name: "no-health-check-addon".to_string(),
        health_prober: Some(HealthProber::None),
    });
    registry
}

pub fn run() {
    let registry = demo_registry();

    println!("{:<30} {:<25} {:<12}", "ADDON", "PROBER", "MODE");
    println!("{}", "-".repeat(67));

    let mut descriptors = registry.iter();
    descriptors.sort_by(|a, b| a.addon_name.cmp(&b.addon_name));

    for descriptor in &descriptors {
        let (prober_label, mode) = match &descriptor.health_prober {
            None => ("<none>".to_string(), "-".to_string()),
            Some(p) => (format!("{p:?}"), p.mode().to_string()),
        };
        println!("{:<30} {:<25} {:<12}", descriptor.addon_name, prober_label, mode);
    }

    println!("\nTotal: {} registered descriptors", descriptors.len());
}
