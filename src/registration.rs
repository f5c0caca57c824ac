use std::path::Path;

use crate::config::DIAL_TIMEOUT;
use crate::deviceplugin::v1beta1::registration_client::RegistrationClient;
use crate::deviceplugin::v1beta1::{RegisterRequest, VERSION};
use crate::grpc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Connect(#[from] grpc::Error),
    #[error("kubelet rejected registration of `{resource_name}`: {source}")]
    Register {
        resource_name: String,
        #[source]
        source: Box<tonic::Status>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Announces this plugin's endpoint and resource name to the kubelet.
///
/// One-shot: the connection is dropped as soon as the call returns,
/// regardless of outcome. `endpoint` is the socket base name only; the
/// kubelet resolves it relative to its own device-plugin directory.
///
/// # Errors
///
/// - [`Error::Connect`] if the kubelet socket cannot be dialed within the
///   bounded timeout.
/// - [`Error::Register`] if the kubelet rejects the registration call.
///
/// Both are fatal to startup: without a completed registration the plugin
/// has no way to advertise capacity, so running on is pointless.
pub async fn register(
    kubelet_socket: impl AsRef<Path>,
    endpoint: &str,
    resource_name: &str,
) -> Result<()> {
    let kubelet_socket = kubelet_socket.as_ref();
    log::info!(
        "Registering InfiniBand device plugin with the kubelet at {}",
        kubelet_socket.display()
    );

    let channel = grpc::channel_for_unix_socket(kubelet_socket, DIAL_TIMEOUT).await?;
    let mut client = RegistrationClient::new(channel);

    let request = RegisterRequest {
        version: VERSION.to_owned(),
        endpoint: endpoint.to_owned(),
        resource_name: resource_name.to_owned(),
        options: None,
    };

    client
        .register(tonic::Request::new(request))
        .await
        .map_err(|source| Error::Register {
            resource_name: resource_name.to_owned(),
            source: Box::new(source),
        })?;

    log::info!("InfiniBand device plugin registered with the kubelet");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deviceplugin::v1beta1::Empty;
    use crate::deviceplugin::v1beta1::registration_server::{Registration, RegistrationServer};
    use std::sync::Mutex;
    use tokio::net::UnixListener;
    use tokio::sync::oneshot;
    use tokio_stream::wrappers::UnixListenerStream;
    use tonic::{Request, Response, Status};

    struct RecordingKubelet {
        tx: Mutex<Option<oneshot::Sender<RegisterRequest>>>,
    }

    #[tonic::async_trait]
    impl Registration for RecordingKubelet {
        async fn register(
            &self,
            request: Request<RegisterRequest>,
        ) -> std::result::Result<Response<Empty>, Status> {
            if let Some(tx) = self.tx.lock().unwrap().take() {
                let _ = tx.send(request.into_inner());
            }
            Ok(Response::new(Empty {}))
        }
    }

    struct RejectingKubelet;

    #[tonic::async_trait]
    impl Registration for RejectingKubelet {
        async fn register(
            &self,
            _request: Request<RegisterRequest>,
        ) -> std::result::Result<Response<Empty>, Status> {
            Err(Status::invalid_argument("unsupported API version"))
        }
    }

    fn serve_kubelet<S: Registration>(listener: UnixListener, service: S) {
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(RegistrationServer::new(service))
                .serve_with_incoming(UnixListenerStream::new(listener))
                .await
        });
    }

    #[tokio::test]
    async fn test_register_sends_registration_record() {
        let tempdir = tempfile::tempdir().unwrap();
        let kubelet_socket = tempdir.path().join("kubelet.sock");
        let listener = UnixListener::bind(&kubelet_socket).unwrap();
        let (tx, rx) = oneshot::channel();
        serve_kubelet(
            listener,
            RecordingKubelet {
                tx: Mutex::new(Some(tx)),
            },
        );

        register(
            &kubelet_socket,
            "ib-device-plugin.sock",
            "ib.plugin/infiniband",
        )
        .await
        .unwrap();

        let received = rx.await.unwrap();
        assert_eq!(received.version, VERSION);
        assert_eq!(received.endpoint, "ib-device-plugin.sock");
        assert_eq!(received.resource_name, "ib.plugin/infiniband");
        assert!(received.options.is_none());
    }

    #[tokio::test]
    async fn test_register_rejected_by_kubelet() {
        let tempdir = tempfile::tempdir().unwrap();
        let kubelet_socket = tempdir.path().join("kubelet.sock");
        let listener = UnixListener::bind(&kubelet_socket).unwrap();
        serve_kubelet(listener, RejectingKubelet);

        let err = register(&kubelet_socket, "ib-device-plugin.sock", "ib.plugin/infiniband")
            .await
            .unwrap_err();
        match err {
            Error::Register { resource_name, .. } => {
                assert_eq!(resource_name, "ib.plugin/infiniband");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_register_unreachable_kubelet() {
        let tempdir = tempfile::tempdir().unwrap();
        let err = register(
            tempdir.path().join("kubelet.sock"),
            "ib-device-plugin.sock",
            "ib.plugin/infiniband",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }
}
