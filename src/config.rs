use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default resource name under which capacity is reported to the scheduler.
pub const DEFAULT_RESOURCE_NAME: &str = "ib.plugin/infiniband";
/// Default number of advertised resource units.
pub const DEFAULT_RESOURCE_AMOUNT: usize = 1;
/// Well-known kubelet directory holding device-plugin sockets.
pub const DEVICE_PLUGIN_DIR: &str = "/var/lib/kubelet/device-plugins";
/// File name of the socket this plugin serves, below [`DEVICE_PLUGIN_DIR`].
pub const PLUGIN_SOCKET_NAME: &str = "ib-device-plugin.sock";
/// File name of the kubelet's registration socket, below [`DEVICE_PLUGIN_DIR`].
pub const KUBELET_SOCKET_NAME: &str = "kubelet.sock";
/// Directory scanned once at startup for InfiniBand device nodes.
pub const DEFAULT_DEVICE_DIR: &str = "/dev/infiniband";
/// Prefix of the deterministic per-unit IDs (`<prefix>-<index>`).
pub const DEFAULT_UNIT_ID_PREFIX: &str = "ib-plugin/infiniband";
/// Upper bound for the self-connect check and the registration dial.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup configuration of the plugin.
///
/// Consumed once at construction; there is no runtime reconfiguration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource name reported to the cluster scheduler.
    pub resource_name: String,
    /// Number of allocatable resource units to advertise.
    pub resource_amount: usize,
    /// Unix socket this plugin binds and serves the device-plugin API on.
    pub socket_path: PathBuf,
    /// The kubelet's registration socket.
    pub kubelet_socket_path: PathBuf,
    /// Directory enumerated once at startup for device files.
    pub device_dir: PathBuf,
    /// Prefix of the per-unit IDs.
    pub unit_id_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource_name: DEFAULT_RESOURCE_NAME.to_owned(),
            resource_amount: DEFAULT_RESOURCE_AMOUNT,
            socket_path: Path::new(DEVICE_PLUGIN_DIR).join(PLUGIN_SOCKET_NAME),
            kubelet_socket_path: Path::new(DEVICE_PLUGIN_DIR).join(KUBELET_SOCKET_NAME),
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            unit_id_prefix: DEFAULT_UNIT_ID_PREFIX.to_owned(),
        }
    }
}
