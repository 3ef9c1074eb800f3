//! Crate-level entry point: load a node's configuration and stand up
//! its logger. Standing up an actual running node additionally needs a
//! concrete decision core (`josefine_raft::Core`), a transport, and a
//! replication proxy runtime — all external collaborators per the role
//! driver's own design, so this crate does not wire one in. Embedders
//! plug those in and call `josefine_raft::driver::Driver::start_link`
//! directly.

#[macro_use]
extern crate slog;

use josefine_core::error::Result;
use josefine_raft::config::RaftConfig;

pub async fn josefine(config_path: &str) -> Result<()> {
    let log = josefine_core::logger::get_root_logger();
    let config = RaftConfig::from_file(config_path)?;

    info!(log, "loaded configuration";
        "id" => %config.id,
        "peers" => config.peers.len(),
        "broadcast_time_ms" => config.broadcast_time_ms,
    );

    Ok(())
}
