use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "addon-health-core")]
#[command(about = "Add-on health reconciliation core for a multi-cluster add-on framework")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display application version
    Version,

    /// Check hub connectivity and RBAC permissions
    Check,

    /// Print the currently registered add-on descriptors and their prober types
    Registry,

    /// Run the live reconcile loop against the hub cluster
    Reconcile {
        /// Number of reconcile workers run concurrently
        #[arg(long, default_value_t = 1)]
        concurrency: u16,

        /// Address the metrics/health HTTP server binds to
        #[arg(long, default_value = "0.0.0.0:9090")]
        metrics_addr: String,
    },

    /// One-shot dry-run of the probe evaluator for a single (cluster, addon) key
    Evaluate {
        #[arg(long)]
        cluster: String,

        #[arg(long)]
        addon: String,
    },
}
