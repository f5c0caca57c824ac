use std::io;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;

use crate::deviceplugin::v1beta1::device_plugin_server::DevicePluginServer;
use crate::service::DevicePluginService;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to remove pre-existing socket file `{path}`: {source}")]
    RemoveStaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind unix socket `{path}`: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove socket file `{path}`: {source}")]
    RemoveSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The plugin's gRPC endpoint: a stream-oriented Unix socket with the device
/// plugin service attached. There is no authentication beyond the filesystem
/// permissions of the socket directory; the trust boundary is the host.
pub struct PluginServer {
    socket_path: PathBuf,
    shutdown: CancellationToken,
    serve_handle: Option<JoinHandle<std::result::Result<(), tonic::transport::Error>>>,
}

impl PluginServer {
    pub fn new(socket_path: impl AsRef<Path>, shutdown: CancellationToken) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            shutdown,
            serve_handle: None,
        }
    }

    /// Binds the socket and starts serving `service` on it.
    ///
    /// Any file already present at the socket path is removed first; a
    /// leftover socket from a previous run must not keep the plugin from
    /// starting. Returns once the listener is bound, so a subsequent dial is
    /// guaranteed to be accepted; serving continues on a spawned task until
    /// the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// - [`Error::RemoveStaleSocket`] if a pre-existing file cannot be
    ///   removed (a missing file is fine).
    /// - [`Error::Bind`] if the listener cannot be bound.
    pub async fn start(&mut self, service: DevicePluginService) -> Result<()> {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => log::debug!(
                "Removed stale socket file `{}`",
                self.socket_path.display()
            ),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::RemoveStaleSocket {
                    path: self.socket_path.clone(),
                    source,
                });
            }
        }

        log::info!("Starting InfiniBand device plugin server");

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| Error::Bind {
            path: self.socket_path.clone(),
            source,
        })?;

        let shutdown = self.shutdown.clone();
        self.serve_handle = Some(tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(
                    UnixListenerStream::new(listener),
                    shutdown.cancelled_owned(),
                )
                .await
        }));

        Ok(())
    }

    /// Shuts the server down and removes the socket file.
    ///
    /// New RPCs are rejected once the shutdown token fires; an active health
    /// stream may end abruptly, which the kubelet treats as a reconnect cue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoveSocket`] if the socket file cannot be removed.
    /// Callable without a successful prior [`start`](Self::start); cleanup is
    /// still attempted and the removal failure reported.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(handle) = self.serve_handle.take() {
            if let Err(err) = handle.await.expect("serve task panicked") {
                log::error!("device plugin server terminated with error: {err}");
            }
        }

        std::fs::remove_file(&self.socket_path).map_err(|source| Error::RemoveSocket {
            path: self.socket_path.clone(),
            source,
        })
    }
}
