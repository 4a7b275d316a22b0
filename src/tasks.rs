//! Worker-thread helper for blocking hardware I/O: named
//! `std::thread::Builder` threads with an optional pinned CPU core,
//! tracked through a process-wide atomic status. The bus and macro
//! scheduler run as `tokio` tasks on one current-thread runtime; anything
//! that must block (a serial read, a display matrix write) gets a thread
//! spawned here instead, bridging back to the async world over a bounded
//! `async-channel` as needed by the caller.

use std::sync::atomic::{AtomicI16, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, error};

/// Coarse process lifecycle status, scoped to what this crate's `main()`
/// actually needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i16)]
pub enum Status {
    Starting = 0,
    Active = 1,
    Stopping = 2,
    Stopped = 3,
}

static STATUS: AtomicI16 = AtomicI16::new(Status::Starting as i16);

#[must_use]
pub fn status() -> Status {
    match STATUS.load(Ordering::Acquire) {
        0 => Status::Starting,
        1 => Status::Active,
        2 => Status::Stopping,
        _ => Status::Stopped,
    }
}

pub fn set_status(status: Status) {
    STATUS.store(status as i16, Ordering::Release);
}

/// Spawns a named worker thread, optionally pinned to a CPU core. Worker
/// threads exist only for blocking hardware reads; everything else runs
/// as an async task. Pinning is best-effort: if `core_affinity` can't
/// enumerate cores (e.g. in a container without the right permissions)
/// the thread still runs, just unpinned.
pub fn spawn_worker<F>(name: &str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    let name = name.to_owned();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            debug!("tasks: worker '{name}' starting");
            f();
            debug!("tasks: worker '{name}' exiting");
        })
        .unwrap_or_else(|e| {
            error!("tasks: failed to spawn worker '{name}': {e}");
            panic!("tasks: failed to spawn worker '{name}': {e}")
        })
}

/// As [`spawn_worker`], but pins the thread to CPU core `core_id` once it
/// starts running, for a control loop that benefits from not migrating
/// between cores.
pub fn spawn_worker_pinned<F>(name: &str, core_id: usize, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    spawn_worker(name, move || {
        if let Some(core) = core_affinity::get_core_ids().and_then(|ids| {
            ids.into_iter().find(|id| id.id == core_id)
        }) {
            if !core_affinity::set_for_current(core) {
                debug!("tasks: could not pin to core {core_id}, continuing unpinned");
            }
        } else {
            debug!("tasks: core {core_id} not available, continuing unpinned");
        }
        f();
    })
}
