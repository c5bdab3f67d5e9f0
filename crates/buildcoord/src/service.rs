use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, instrument, warn};

use buildcoord_core::{
    check_package, deploy_package, is_canonical_sid, parse_digest, BaseIngester, Cache, Cpv,
    PackageDescriptor, PackageOutcome, SessionTable, Workdir,
};
use buildcoord_proto::build_coordinator_server::BuildCoordinator;
use buildcoord_proto::{
    package_request, BaseData, BaseErrorCode, BaseResponse, CloseRequest, CloseResponse,
    DeployErrorCode, DeployInfo, DeployResponse, Package, PackageErrorCode, PackageRequest,
    StartRequest, StartResponse,
};

use crate::errors::{base_error_code, deploy_error_code, package_error_code};

/// Shared server state. Cheap to clone: every field is itself an `Arc` or a value the core
/// crate already guards with its own lock.
#[derive(Clone)]
pub struct Coordinator {
    workdir: Arc<Workdir>,
    sessions: Arc<SessionTable>,
    cache: Arc<Cache>,
}

impl Coordinator {
    pub fn new(workdir: Workdir, total_slots: u32) -> Self {
        let cache = Cache::new(workdir.clone());
        Self {
            workdir: Arc::new(workdir),
            sessions: Arc::new(SessionTable::new(total_slots)),
            cache: Arc::new(cache),
        }
    }
}

#[tonic::async_trait]
impl BuildCoordinator for Coordinator {
    #[instrument(skip_all)]
    async fn start_session(
        &self,
        request: Request<StartRequest>,
    ) -> Result<Response<StartResponse>, Status> {
        let num_procs = request.into_inner().num_procs;
        let (granted, sid) = self.sessions.start(num_procs);
        info!(sid, granted, requested = num_procs, "session started");
        Ok(Response::new(StartResponse {
            num_builders: granted,
            session_id: sid,
        }))
    }

    #[instrument(skip_all)]
    async fn close_session(
        &self,
        request: Request<CloseRequest>,
    ) -> Result<Response<CloseResponse>, Status> {
        let sid = request.into_inner().session_id;
        let freed = self.sessions.close(&sid);
        info!(sid, freed, "session closed");
        Ok(Response::new(CloseResponse { freed }))
    }

    #[instrument(skip_all)]
    async fn setup_base(
        &self,
        request: Request<BaseData>,
    ) -> Result<Response<BaseResponse>, Status> {
        let req = request.into_inner();
        let ingester = BaseIngester::new(&self.workdir);
        match ingester
            .setup_base(&req.session_id, &req.archive_data, &req.archive_checksum)
            .await
        {
            Ok(()) => Ok(Response::new(BaseResponse {
                succeed: true,
                error: BaseErrorCode::BaseNoError.into(),
            })),
            Err(err) => {
                let code = base_error_code(&err);
                Ok(Response::new(BaseResponse {
                    succeed: false,
                    error: code.into(),
                }))
            }
        }
    }

    #[instrument(skip_all)]
    async fn deploy_package(
        &self,
        request: Request<DeployInfo>,
    ) -> Result<Response<DeployResponse>, Status> {
        let req = request.into_inner();
        let result = deploy_from_wire(&self.workdir, &self.cache, &req).await;
        let code = match result {
            Ok(()) => DeployErrorCode::DeployNoError,
            Err(code) => code,
        };
        Ok(Response::new(DeployResponse { error: code.into() }))
    }

    type CheckPackagesStream =
        Pin<Box<dyn Stream<Item = Result<PackageRequest, Status>> + Send + 'static>>;

    #[instrument(skip_all)]
    async fn check_packages(
        &self,
        request: Request<Streaming<Package>>,
    ) -> Result<Response<Self::CheckPackagesStream>, Status> {
        let Some(sid) = extract_sid(request.metadata()) else {
            return Ok(terminal_stream(PackageErrorCode::PkgInvalidRequest));
        };

        if !self.sessions.contains(&sid) {
            return Ok(terminal_stream(PackageErrorCode::PkgNoBase));
        }

        let cache = Arc::clone(&self.cache);
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(run_check_packages_loop(cache, sid, inbound, tx));

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Drives the `CheckPackages` read/dispatch loop (§4.E) against any stream of package
/// descriptors, reporting a cache miss as an upload request and linking a cache hit silently.
///
/// Generic over the inbound stream rather than tied to `tonic::Streaming` so it can be driven
/// directly in tests, which have no public way to construct a `Streaming<Package>`.
pub async fn run_check_packages_loop<S>(
    cache: Arc<Cache>,
    sid: String,
    mut inbound: S,
    tx: mpsc::Sender<Result<PackageRequest, Status>>,
) where
    S: Stream<Item = Result<Package, Status>> + Unpin,
{
    while let Some(item) = inbound.next().await {
        let pkg = match item {
            Ok(pkg) => pkg,
            Err(err) => {
                warn!(sid, error = %err, "CheckPackages transport error");
                let _ = tx
                    .send(Ok(error_reply(PackageErrorCode::PkgNetworkError)))
                    .await;
                break;
            }
        };

        let desc = match descriptor_from_wire(&pkg) {
            Ok(desc) => desc,
            Err(()) => {
                let _ = tx
                    .send(Ok(error_reply(PackageErrorCode::PkgInvalidRequest)))
                    .await;
                break;
            }
        };

        match check_package(&cache, &sid, &desc).await {
            Ok(PackageOutcome::NeedsUpload) => {
                if tx.send(Ok(pkg_reply(pkg))).await.is_err() {
                    break;
                }
            }
            Ok(PackageOutcome::Linked) => {
                // Linked silently: no reply is sent for a cache hit (§8 invariant 4 counts one
                // reply per *uploadable* descriptor, not per message).
            }
            Err(err) => {
                let code = package_error_code(&err);
                let _ = tx.send(Ok(error_reply(code))).await;
                break;
            }
        }
    }
}

async fn deploy_from_wire(
    workdir: &Workdir,
    cache: &Cache,
    req: &DeployInfo,
) -> Result<(), DeployErrorCode> {
    if !is_canonical_sid(&req.session_id) {
        return Err(DeployErrorCode::DeployInternalError);
    }
    let pkg_info = req
        .pkg_info
        .as_ref()
        .ok_or(DeployErrorCode::DeployBadChecksum)?;
    let desc = descriptor_from_wire(pkg_info).map_err(|()| DeployErrorCode::DeployBadChecksum)?;

    deploy_package(workdir, cache, &req.session_id, &desc, &req.data)
        .await
        .map_err(|err| deploy_error_code(&err))
}

fn descriptor_from_wire(pkg: &Package) -> Result<PackageDescriptor, ()> {
    let cpv = Cpv::parse(&pkg.cpv).map_err(|_| ())?;
    let digest = parse_digest(&pkg.checksum).map_err(|_| ())?;
    Ok(PackageDescriptor { cpv, digest })
}

/// Extract the single `sid` metadata value. Absent, empty, or repeated all mean "send
/// `InvalidRequest`" per §4.E.
///
/// Takes a `MetadataMap` rather than a `Request` so it can be exercised directly in tests
/// without needing a real `tonic::Streaming` body.
pub fn extract_sid(metadata: &MetadataMap) -> Option<String> {
    let values: Vec<_> = metadata
        .get_all("sid")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    match values.as_slice() {
        [single] if !single.is_empty() => Some((*single).to_owned()),
        _ => None,
    }
}

/// A one-message stream carrying a single terminal error reply, for the `CheckPackages` exit
/// paths that never reach the read/dispatch loop (§4.E's `Init` failure transitions).
pub fn terminal_stream(
    code: PackageErrorCode,
) -> Response<Pin<Box<dyn Stream<Item = Result<PackageRequest, Status>> + Send + 'static>>> {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(Ok(error_reply(code)));
    Response::new(Box::pin(ReceiverStream::new(rx)))
}

fn error_reply(code: PackageErrorCode) -> PackageRequest {
    PackageRequest {
        reply: Some(package_request::Reply::Error(code.into())),
    }
}

fn pkg_reply(pkg: Package) -> PackageRequest {
    PackageRequest {
        reply: Some(package_request::Reply::Pkg(pkg)),
    }
}
