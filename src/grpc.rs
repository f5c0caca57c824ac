use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{pin, task};

use hyper_util::rt::TokioIo;
use tonic::transport::{Channel, Endpoint};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("timed out connecting to socket `{path}` after {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },
}

#[derive(Debug, Clone)]
struct UnixConnector {
    path: PathBuf,
}

impl tower::Service<hyper::Uri> for UnixConnector {
    type Response = TokioIo<tokio::net::UnixStream>;

    type Error = std::io::Error;

    type Future = pin::Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: hyper::Uri) -> Self::Future {
        let path = self.path.clone();
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(path).await?;

            Ok(TokioIo::new(stream))
        })
    }
}

/// Opens a gRPC channel over the Unix socket at `path`.
///
/// The endpoint URI is a placeholder; all traffic goes through the socket
/// connector. Connection establishment is bounded by `timeout`, so a dial
/// against an unresponsive peer fails instead of blocking startup forever.
///
/// # Errors
///
/// - [`Error::Timeout`] if the connection is not established within `timeout`.
/// - [`Error::Connect`] for any other transport failure.
pub async fn channel_for_unix_socket(
    path: impl AsRef<Path>,
    timeout: Duration,
) -> Result<Channel, Error> {
    let path = path.as_ref();
    log::debug!("Connecting to {}...", path.display());
    let connector = UnixConnector {
        path: path.to_path_buf(),
    };
    let endpoint = Endpoint::from_static("http://[::]:50051");
    let connect = endpoint.connect_with_connector(connector);
    let channel = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| Error::Timeout {
            path: path.to_path_buf(),
            timeout,
        })?
        .map_err(|source| Error::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    log::debug!("Created channel for {}.", path.display());

    Ok(channel)
}
