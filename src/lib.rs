use tokio_util::sync::CancellationToken;

use crate::error::ResultOkLogExt;

/// InfiniBand device plugin: advertises a fixed pool of InfiniBand resource
/// units to the kubelet via the device-plugin gRPC protocol and tells it
/// which host device files to bind-mount into allocated containers.
///
/// This library provides the protocol engine: the Unix-socket gRPC server,
/// the four device-plugin RPCs (including the long-lived health stream), and
/// the one-shot registration handshake with the kubelet.
pub mod config;
pub mod error;
pub mod grpc;
pub mod inventory;
pub mod registration;
pub mod server;
pub mod service;

pub mod deviceplugin {
    pub mod v1beta1 {
        tonic::include_proto!("v1beta1");

        /// Device-plugin API version spoken on the wire.
        pub const VERSION: &str = "v1beta1";
        /// Health value of a serviceable resource unit.
        pub const HEALTHY: &str = "Healthy";
        /// Health value of a unit the kubelet must not schedule onto.
        pub const UNHEALTHY: &str = "Unhealthy";
    }
}

/// Runs the InfiniBand device plugin.
///
/// Builds the device inventory, starts the gRPC server on the plugin socket,
/// confirms the listener is reachable, registers with the kubelet and then
/// serves until a shutdown signal arrives.
///
/// # Errors
///
/// Possible errors include:
/// - An unreadable device directory.
/// - Failure to remove a stale socket file or to bind the plugin socket.
/// - Failure of the self-connect check against the freshly bound socket.
/// - A refused or timed-out registration call to the kubelet.
///
/// None of these are retried internally; the kubelet's supervision of the
/// plugin pod is the recovery mechanism.
pub async fn run(config: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let inventory = inventory::build(
        config.resource_amount,
        &config.unit_id_prefix,
        &config.device_dir,
    )?;
    log::info!(
        "Advertising {} unit(s) of `{}` backed by {} device file(s)",
        inventory.units.len(),
        &config.resource_name,
        inventory.device_paths.len()
    );

    let endpoint = config
        .socket_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or("plugin socket path has no file name")?
        .to_owned();

    let shutdown = CancellationToken::new();
    let service = service::DevicePluginService::new(&inventory, shutdown.clone());
    let mut server = server::PluginServer::new(&config.socket_path, shutdown.clone());
    server.start(service).await?;

    // The kubelet may dial back the moment registration lands, so prove the
    // listener is accepting connections first.
    grpc::channel_for_unix_socket(&config.socket_path, config::DIAL_TIMEOUT).await?;
    log::info!(
        "InfiniBand device plugin serving on {}",
        config.socket_path.display()
    );

    registration::register(
        &config.kubelet_socket_path,
        &endpoint,
        &config.resource_name,
    )
    .await?;

    wait_for_shutdown().await?;
    log::info!("Received shutdown signal");
    server.stop().await.ok_log();

    Ok(())
}

/// Completes when the process receives SIGINT or SIGTERM.
async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
    }
}
