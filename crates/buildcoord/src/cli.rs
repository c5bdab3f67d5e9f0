use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Remote binary-package build coordinator.
///
/// Reserves worker slots for client sessions, ingests base system images, and deduplicates
/// uploaded packages through a content-addressed cache.
#[derive(Debug, Parser)]
#[command(name = "buildcoord", version = buildcoord_version::SERVER_VERSION)]
pub struct Cli {
    /// Total number of worker slots the server can grant across all sessions.
    #[arg(long, default_value_t = 4)]
    pub total_slots: u32,

    /// Address to listen for gRPC connections on.
    #[arg(long, default_value = "127.0.0.1:50000")]
    pub listen: SocketAddr,

    /// Directory for session state, the artifact cache, and upload staging.
    ///
    /// Defaults to a fresh temporary directory, which is convenient for tests but means the
    /// cache (and any base images) do not survive a restart — consistent with this server
    /// treating persistence as a non-goal.
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Increase logging verbosity; repeat for more detail (e.g. `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
