use clap::Parser;

use ib_device_plugin::config::{self, Config};

/// Kubernetes device plugin for InfiniBand device nodes.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Resource name under which capacity is reported to the scheduler.
    #[arg(long, default_value = config::DEFAULT_RESOURCE_NAME)]
    resource_name: String,
    /// Number of resource units to advertise.
    #[arg(long, default_value_t = config::DEFAULT_RESOURCE_AMOUNT)]
    resource_amount: usize,
}

/// Entry point for the InfiniBand Kubernetes device plugin.
///
/// Advertises a configurable number of `ib.plugin/infiniband` resource units
/// to the node's kubelet and bind-mounts the host's InfiniBand device files
/// into containers that are allocated the resource.
///
/// # Errors
///
/// Returns an error if startup fails (e.g., the plugin socket cannot be
/// bound, or the kubelet refuses the registration call).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info ib-device-plugin --resource-name ib.plugin/infiniband --resource-amount 4
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config {
        resource_name: cli.resource_name,
        resource_amount: cli.resource_amount,
        ..Config::default()
    };
    ib_device_plugin::run(config).await
}
