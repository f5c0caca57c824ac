use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::deviceplugin::v1beta1::device_plugin_server::DevicePlugin;
use crate::deviceplugin::v1beta1::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse, Device, DevicePluginOptions,
    DeviceSpec, Empty, HEALTHY, ListAndWatchResponse, PreStartContainerRequest,
    PreStartContainerResponse, PreferredAllocationRequest, PreferredAllocationResponse,
};
use crate::inventory::Inventory;

/// Interval between health re-emissions on an open ListAndWatch stream.
const HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Cgroup permissions attached to every device spec handed to the kubelet.
const DEVICE_PERMISSIONS: &str = "rw";

/// Implementation of the kubelet-facing device-plugin service.
///
/// The kubelet may invoke any of the four RPCs at any time once the server
/// listens, including an allocation call concurrent with an open health
/// stream. The unit list is the only shared mutable state; every health tick
/// rewrites it wholesale under the mutex, so concurrent streams never
/// observe a torn snapshot.
pub struct DevicePluginService {
    units: Arc<Mutex<Vec<Device>>>,
    /// Host device files attached verbatim to every non-empty allocation.
    device_paths: Vec<String>,
    shutdown: CancellationToken,
}

impl DevicePluginService {
    pub fn new(inventory: &Inventory, shutdown: CancellationToken) -> Self {
        Self {
            units: Arc::new(Mutex::new(inventory.units.clone())),
            device_paths: inventory
                .device_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
            shutdown,
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    /// Static capability set: no pre-start hook, no allocation steering.
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(DevicePluginOptions {
            pre_start_required: false,
            get_preferred_allocation_available: false,
        }))
    }

    type ListAndWatchStream = ReceiverStream<Result<ListAndWatchResponse, Status>>;

    /// Pushes the full unit list on stream open, then re-marks every unit
    /// healthy and re-emits on a fixed interval.
    ///
    /// This stream is what the kubelet uses to decide resource availability.
    /// A failed send ends this one stream invocation only; the kubelet is
    /// expected to reconnect. The task also exits on process shutdown, which
    /// may end the stream abruptly.
    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        log::info!("Starting to watch InfiniBand device list");

        let (tx, rx) = mpsc::channel(4);
        let units = Arc::clone(&self.units);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            // The first tick completes immediately, producing the required
            // emission on stream open.
            let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.cancelled() => break,
                }

                let devices = {
                    let mut units = units.lock().expect("unit list lock poisoned");
                    for unit in units.iter_mut() {
                        unit.health = HEALTHY.to_owned();
                    }
                    units.clone()
                };

                if tx.send(Ok(ListAndWatchResponse { devices })).await.is_err() {
                    log::debug!("Health stream closed by client");
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    /// The plugin does not implement allocation steering.
    async fn get_preferred_allocation(
        &self,
        _request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        Ok(Response::new(PreferredAllocationResponse {
            container_responses: Vec::new(),
        }))
    }

    /// Maps each container request to a device-spec list, order preserved.
    ///
    /// A request listing no unit IDs gets an empty response. Any non-empty
    /// request gets the entire device inventory, host path mirrored as the
    /// container path with `rw` permission. The requested IDs are accepted
    /// but not validated; the device files form a single shared namespace
    /// rather than a per-unit mapping.
    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let requests = request.into_inner().container_requests;
        let mut container_responses = Vec::with_capacity(requests.len());

        for container_req in requests {
            let mut response = ContainerAllocateResponse::default();
            if !container_req.devices_ids.is_empty() {
                log::info!(
                    "Allocating InfiniBand devices for container request: {:?}",
                    container_req.devices_ids
                );
                response.devices = self
                    .device_paths
                    .iter()
                    .map(|path| DeviceSpec {
                        container_path: path.clone(),
                        host_path: path.clone(),
                        permissions: DEVICE_PERMISSIONS.to_owned(),
                    })
                    .collect();
            }
            container_responses.push(response);
        }

        Ok(Response::new(AllocateResponse {
            container_responses,
        }))
    }

    /// No-op; present only to satisfy the required RPC surface.
    async fn pre_start_container(
        &self,
        _request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
