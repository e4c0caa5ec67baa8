//! Stale-connection sweep.
//!
//! DESIGN
//! ======
//! A socket that dies without a close frame never runs the gateway's cleanup
//! path, which would leak its presence entry and, for the last viewer, the
//! channel binding. A background task periodically evicts entries whose
//! `last_seen` exceeds a threshold, broadcasts the corrected roster to each
//! affected setlist, and tears down channels for setlists that emptied.

use std::collections::HashSet;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_STALE_AFTER_SECS: u64 = 300;

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the background sweep task. Returns a handle for shutdown.
pub fn spawn_sweep_task(state: AppState) -> JoinHandle<()> {
    let interval_secs = env_parse("PRESENCE_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
    let stale_after = Duration::from_secs(env_parse("PRESENCE_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS));
    info!(interval_secs, stale_after_secs = stale_after.as_secs(), "presence sweep configured");

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            sweep_once(&state, stale_after);
        }
    })
}

/// One sweep pass: evict stale entries, notify survivors, drop dead channels.
pub fn sweep_once(state: &AppState, stale_after: Duration) -> usize {
    let evicted = state.presence.sweep_stale(stale_after);
    if evicted.is_empty() {
        return 0;
    }

    let affected: HashSet<Uuid> = evicted.iter().map(|(setlist_id, _)| *setlist_id).collect();
    for setlist_id in affected {
        let snapshot = state.presence.get_presence(setlist_id);
        if snapshot.is_empty() {
            state.channels.unregister_publisher(setlist_id);
            info!(%setlist_id, "swept last viewer; channel unregistered");
        } else {
            state.channels.presence_update(setlist_id, snapshot);
        }
    }

    info!(count = evicted.len(), "swept stale presence entries");
    evicted.len()
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;
