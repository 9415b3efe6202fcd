// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The oplock manager: a path-keyed table of [`OpLockDetails`] plus the grant/release/break/
//! timeout state machine, backed by a single [`Mutex`] and a background thread that scans for
//! break acknowledgements that never arrived.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::details::{OpLockDetails, OplockType};
use crate::error::OplockError;
use crate::owner::OplockOwner;
use crate::session::{DeferredRequest, SessionDirectory};

/// The outcome of a grant request.
pub enum GrantOutcome {
    /// The oplock was granted (or re-granted to the requesting owner) synchronously.
    Granted(OplockType),
    /// A conflicting oplock is being broken; the caller's packet has been queued and will be
    /// retried once the break resolves (acknowledgement or timeout).
    Deferred,
}

/// How often the background scanner checks for timed-out breaks. Independent of the timeout
/// itself so a long timeout doesn't mean a long delay noticing it expired.
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

struct ShutdownSignal {
    stop: Mutex<bool>,
    cv: Condvar,
}

/// Path-keyed oplock table plus break/timeout state machine.
///
/// # Open questions this implementation resolves
///
/// - **LEVEL_II breaks are fire-and-forget.** A LEVEL_II oplock has no single owner whose
///   acknowledgement would mean anything — any reader can still be mid-flush when the next one
///   acks — so a conflicting request against a LEVEL_II oplock downgrades it to `NONE`
///   immediately on return from the (best-effort) break notification, and the conflicting
///   request is granted synchronously in the same call. It is never pushed to the deferred
///   queue.
/// - **EXCLUSIVE/BATCH breaks use the deferred queue and the timeout scanner**, since there's
///   exactly one owner whose acknowledgement (or failure to respond) actually determines the
///   outcome.
pub struct OpLockManager {
    locks: Mutex<HashMap<PathBuf, OpLockDetails>>,
    sessions: Arc<dyn SessionDirectory>,
    break_timeout: Duration,
    on_timeout: Arc<dyn Fn(PathBuf, VecDeque<DeferredRequest>) + Send + Sync>,
    shutdown: Arc<ShutdownSignal>,
}

impl OpLockManager {
    pub fn new(
        sessions: Arc<dyn SessionDirectory>,
        break_timeout: Duration,
        on_timeout: Arc<dyn Fn(PathBuf, VecDeque<DeferredRequest>) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            locks: Mutex::new(HashMap::new()),
            sessions,
            break_timeout,
            on_timeout,
            shutdown: Arc::new(ShutdownSignal { stop: Mutex::new(false), cv: Condvar::new() }),
        })
    }

    /// Requests an oplock at `path` on behalf of `owner`. `deferred`, if given, is queued (and
    /// returned to the caller untouched via the eventual [`Self::acknowledge_break`] or timeout
    /// callback) when the request can't be granted synchronously.
    pub fn request(
        &self,
        path: PathBuf,
        is_folder: bool,
        owner: OplockOwner,
        requested: OplockType,
        deferred: Option<DeferredRequest>,
    ) -> Result<GrantOutcome, OplockError> {
        let mut locks = self.locks.lock().unwrap();
        let entry = locks.entry(path.clone()).or_insert_with(|| OpLockDetails::new(path.clone(), is_folder));

        if entry.failed_break {
            return Err(OplockError::NotHeld);
        }

        if entry.is_breaking() {
            return match deferred {
                Some(req) => {
                    entry.push_deferred(req)?;
                    Ok(GrantOutcome::Deferred)
                }
                None => Err(OplockError::DeferredQueueFull),
            };
        }

        match entry.oplock_type {
            OplockType::None => {
                entry.oplock_type = requested;
                entry.owners = vec![owner];
                debug!("granted {requested:?} on {:?} to session {}", path, owner.session_id);
                Ok(GrantOutcome::Granted(requested))
            }

            OplockType::LevelII if requested == OplockType::LevelII => {
                if !entry.owners.iter().any(|o| o.same_owner(&owner, OplockType::LevelII)) {
                    entry.owners.push(owner);
                }
                Ok(GrantOutcome::Granted(OplockType::LevelII))
            }

            OplockType::LevelII => {
                // Fire-and-forget: notify every reader, then clear and grant immediately.
                for reader in &entry.owners {
                    self.notify_break(&path, reader.session_id, OplockType::None);
                }
                entry.owners.clear();
                entry.oplock_type = requested;
                entry.owners = vec![owner];
                Ok(GrantOutcome::Granted(requested))
            }

            OplockType::Exclusive | OplockType::Batch => {
                let holder = entry.owners[0];
                if holder.same_owner(&owner, entry.oplock_type) && requested == entry.oplock_type {
                    return Ok(GrantOutcome::Granted(entry.oplock_type));
                }

                let break_to = if requested == OplockType::LevelII { OplockType::LevelII } else { OplockType::None };
                self.notify_break(&path, holder.session_id, break_to);
                entry.break_sent_at = Some(Instant::now());

                match deferred {
                    Some(req) => {
                        entry.push_deferred(req)?;
                        Ok(GrantOutcome::Deferred)
                    }
                    None => Err(OplockError::DeferredQueueFull),
                }
            }
        }
    }

    fn notify_break(&self, path: &Path, session_id: u64, break_to: OplockType) {
        match self.sessions.lookup(session_id) {
            Some(session) => {
                if let Err(e) = session.send_break(path, break_to) {
                    warn!("failed to send oplock break for {path:?} to session {session_id}: {e}");
                }
            }
            None => warn!("no live session {session_id} to send oplock break for {path:?}"),
        }
    }

    /// Acknowledges a break on an EXCLUSIVE/BATCH oplock, transitioning it to `new_level`
    /// (`None` or `LevelII`) and releasing any requests that were deferred behind it.
    pub fn acknowledge_break(
        &self,
        path: &Path,
        owner: OplockOwner,
        new_level: OplockType,
    ) -> Result<VecDeque<DeferredRequest>, OplockError> {
        if !matches!(new_level, OplockType::None | OplockType::LevelII) {
            return Err(OplockError::InvalidBreakAck);
        }

        let mut locks = self.locks.lock().unwrap();
        let entry = locks.get_mut(path).ok_or(OplockError::NotHeld)?;

        if !entry.is_breaking() {
            return Err(OplockError::NoBreakInProgress);
        }
        if entry.owners.first().map(|o| o.same_owner(&owner, entry.oplock_type)) != Some(true) {
            return Err(OplockError::NotOwner);
        }

        entry.break_sent_at = None;
        entry.failed_break = false;

        match new_level {
            OplockType::None => {
                entry.oplock_type = OplockType::None;
                entry.owners.clear();
            }
            OplockType::LevelII => {
                entry.oplock_type = OplockType::LevelII;
                entry.owners = vec![owner];
            }
            _ => unreachable!(),
        }

        let deferred = entry.take_deferred();
        if entry.is_idle() {
            locks.remove(path);
        }
        Ok(deferred)
    }

    /// Voluntarily releases `owner`'s hold on the oplock at `path` (file close). Returns any
    /// requests that were deferred behind this oplock, now free to retry.
    pub fn release(&self, path: &Path, owner: OplockOwner) -> Result<VecDeque<DeferredRequest>, OplockError> {
        let mut locks = self.locks.lock().unwrap();
        let entry = locks.get_mut(path).ok_or(OplockError::NotHeld)?;

        match entry.oplock_type {
            OplockType::None => return Err(OplockError::NotHeld),
            OplockType::LevelII => {
                let before = entry.owners.len();
                entry.owners.retain(|o| !o.same_owner(&owner, OplockType::LevelII));
                if entry.owners.len() == before {
                    return Err(OplockError::NotOwner);
                }
                if entry.owners.is_empty() {
                    entry.oplock_type = OplockType::None;
                }
            }
            OplockType::Exclusive | OplockType::Batch => {
                if !entry.owners.first().map(|o| o.same_owner(&owner, entry.oplock_type)).unwrap_or(false) {
                    return Err(OplockError::NotOwner);
                }
                entry.oplock_type = OplockType::None;
                entry.owners.clear();
            }
        }

        let deferred = if entry.oplock_type == OplockType::None { entry.take_deferred() } else { VecDeque::new() };
        if entry.is_idle() {
            locks.remove(path);
        }
        Ok(deferred)
    }

    pub fn current_type(&self, path: &Path) -> OplockType {
        self.locks.lock().unwrap().get(path).map(|e| e.oplock_type).unwrap_or(OplockType::None)
    }

    pub fn owner_count(&self, path: &Path) -> usize {
        self.locks.lock().unwrap().get(path).map(|e| e.owners.len()).unwrap_or(0)
    }

    /// Scans for breaks that have been outstanding longer than the configured timeout, forcing
    /// them to `NONE` and invoking the timeout callback with whatever was deferred behind them.
    /// Exposed directly so tests can drive a scan without waiting on the background thread.
    pub fn scan_timeouts(&self) {
        let mut timed_out = Vec::new();
        {
            let mut locks = self.locks.lock().unwrap();
            for entry in locks.values_mut() {
                let Some(sent_at) = entry.break_sent_at else { continue };
                if sent_at.elapsed() < self.break_timeout {
                    continue;
                }
                warn!("oplock break timed out for {:?}", entry.path);
                entry.failed_break = true;
                entry.break_sent_at = None;
                entry.oplock_type = OplockType::None;
                entry.owners.clear();
                let deferred = entry.take_deferred();
                timed_out.push((entry.path.clone(), deferred));
            }
            locks.retain(|_, e| !e.is_idle() || e.failed_break);
        }

        for (path, deferred) in timed_out {
            (self.on_timeout)(path, deferred);
        }
    }

    /// Spawns the background thread that periodically calls [`Self::scan_timeouts`]. The
    /// returned handle is joined by [`Self::shutdown`].
    pub fn spawn_timeout_scanner(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        let shutdown = self.shutdown.clone();
        thread::Builder::new()
            .name("oplock-timeout-scanner".into())
            .spawn(move || loop {
                let stop = shutdown.stop.lock().unwrap();
                let (stop, _timeout) = shutdown.cv.wait_timeout(stop, SCAN_INTERVAL).unwrap();
                if *stop {
                    return;
                }
                drop(stop);
                manager.scan_timeouts();
            })
            .expect("failed to spawn oplock timeout scanner thread")
    }

    pub fn shutdown(&self) {
        *self.shutdown.stop.lock().unwrap() = true;
        self.shutdown.cv.notify_all();
        info!("oplock manager shutting down");
    }
}
