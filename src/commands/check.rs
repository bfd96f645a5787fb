use kube::api::ListParams;
use kube::{Api, Client};

use addon_health_core::types::{ManagedClusterAddOn, ManifestWork};

pub async fn run() -> anyhow::Result<()> {
    println!("Running hub connectivity checks...\n");

    print!("  Kubeconfig .................. ");
    let client = match Client::try_default().await {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAIL");
            anyhow::bail!("Cannot load kubeconfig: {}", e);
        }
    };

    print!("  Hub connection ............... ");
    let version = match client.apiserver_version().await {
        Ok(v) => {
            println!("OK (v{}.{})", v.major, v.minor);
            Some(v)
        }
        Err(e) => {
            println!("FAIL");
            println!("\n  Error: {}", e);
            println!("  Hint:  Is the hub cluster running? Check with: kubectl cluster-info\n");
            return Ok(());
        }
    };

    print!("  List ManagedClusterAddOn permission  ");
    let mcas: Api<ManagedClusterAddOn> = Api::all(client.clone());
    match mcas.list(&ListParams::default().limit(1)).await {
        Ok(_) => println!("OK"),
        Err(e) => println!("FAIL ({})", e),
    }

    print!("  List ManifestWork permission .. ");
    let works: Api<ManifestWork> = Api::all(client.clone());
    match works.list(&ListParams::default().limit(1)).await {
        Ok(_) => println!("OK"),
        Err(e) => println!("FAIL ({})", e),
    }

    if let Some(v) = version {
        println!("\n  Hub Kubernetes version: {}.{}", v.major, v.minor);
    }

    println!("\nAll checks completed.");
    Ok(())
}
