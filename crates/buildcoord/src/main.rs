use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use buildcoord::cli::Cli;
use buildcoord::service::Coordinator;
use buildcoord_core::Workdir;
use buildcoord_proto::build_coordinator_server::BuildCoordinatorServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let workdir_root = match cli.workdir {
        Some(path) => path,
        None => {
            let tmp = tempfile::tempdir().context("failed to create a temporary workdir")?;
            // Leak the guard: the server's workdir is meant to outlive this function, and
            // cleaning it up is explicitly out of scope (cache eviction is future work).
            let path = tmp.path().to_path_buf();
            std::mem::forget(tmp);
            path
        }
    };
    let workdir = Workdir::init(&workdir_root)
        .with_context(|| format!("failed to initialize workdir at {}", workdir_root.display()))?;

    tracing::info!(
        addr = %cli.listen,
        total_slots = cli.total_slots,
        workdir = %workdir_root.display(),
        "starting buildcoord"
    );

    let coordinator = Coordinator::new(workdir, cli.total_slots);

    tonic::transport::Server::builder()
        .add_service(BuildCoordinatorServer::new(coordinator))
        .serve_with_shutdown(cli.listen, shutdown_signal())
        .await
        .context("gRPC server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(err) => tracing::warn!(error = %err, "failed to install ctrl-c handler"),
    }
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "buildcoord=info,warn",
        1 => "buildcoord=debug,info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
