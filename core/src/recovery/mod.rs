/*
 * Created on Mon Jul 15 2024
 *
 * This file is a part of Janus
 * Janus is a free and open-source distributed transaction coordinator
 * written by Sayan Nandan ("the Author") with the vision to provide
 * applications with dependable two-phase commit without compromising
 * on durability, recoverability or performance.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The recovery engine
//!
//! Presumed-abort reconciliation between the journal and the in-doubt branches reported by each
//! registered resource. The only situation in which recovery commits a branch is a journaled
//! `COMMITTING` naming that resource; everything else in doubt is rolled back, except branches
//! young enough to belong to a two-phase commit still running on this node.

pub mod incremental;
#[cfg(test)]
mod tests;

use {
    crate::{
        config::Configuration,
        error::{Error, ErrorContext, RuntimeResult, Subsystem},
        journal::Journal,
        resource::{TransactionResource, TMENDRSCAN, TMSTARTRSCAN},
        storage::record::TxRecord,
        txn::{uid::Uid, TxStatus},
        util::os,
    },
    parking_lot::Mutex,
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicU64, Ordering},
            Arc,
        },
    },
};

/// Clock skew guard for the in-flight rule: an in-doubt branch whose gtrid timestamp is at least
/// this close to the recovery start time is left alone, because it belongs to a transaction
/// currently between phase 1 and phase 2 on this node.
pub const IN_FLIGHT_SKEW_MS: i64 = 10;

/// What one resource's reconciliation did
#[derive(Debug, Default)]
pub(crate) struct ResourceOutcome {
    pub committed: u64,
    pub rolledback: u64,
    /// last per-branch or scan failure; never fatal to the surrounding run
    pub completion_error: Option<Error>,
}

impl ResourceOutcome {
    fn record_failure(&mut self, e: Error) {
        log::warn!("recovery: {e}");
        self.completion_error = Some(e);
    }
}

/// One dangling transaction as tracked through a recovery pass: the journaled record (whose name
/// set is the complete one) plus the resources still awaiting confirmation. Confirmations must
/// not touch the record itself, because the sealing `COMMITTED` has to carry every name the
/// `COMMITTING` carried.
pub(crate) struct DanglingTx {
    record: TxRecord,
    remaining: Vec<Box<str>>,
}

impl DanglingTx {
    fn new(record: TxRecord) -> Self {
        Self {
            remaining: record.unique_names().to_vec(),
            record,
        }
    }
    fn awaits(&self, name: &str) -> bool {
        self.remaining.iter().any(|n| &**n == name)
    }
    /// Confirm one resource; true once every named resource has confirmed
    fn confirm(&mut self, name: &str) -> bool {
        self.remaining.retain(|n| &**n != name);
        self.remaining.is_empty()
    }
}

/// The dangling records of one pass, keyed by gtrid, with per-gtrid confirmation tracking
pub(crate) fn dangling_work_set(journal: &dyn Journal) -> RuntimeResult<HashMap<Uid, DanglingTx>> {
    Ok(journal
        .collect_dangling_records()
        .set_origin(Subsystem::Journal)?
        .into_iter()
        .map(|(gtrid, record)| (gtrid, DanglingTx::new(record)))
        .collect())
}

/// Reconcile one resource against the dangling record set.
///
/// Journal failures are returned as `Err` (the caller must abort its run); resource failures are
/// captured in the outcome and reconciliation continues with the remaining branches.
pub(crate) fn recover_resource(
    journal: &dyn Journal,
    server_id: &str,
    current_node_only_recovery: bool,
    resource: &dyn TransactionResource,
    reference_time_ms: i64,
    dangling: &mut HashMap<Uid, DanglingTx>,
) -> RuntimeResult<ResourceOutcome> {
    let mut outcome = ResourceOutcome::default();
    let name = resource.unique_name().to_owned();
    let xids = match resource.recover(TMSTARTRSCAN | TMENDRSCAN) {
        Ok(xids) => xids,
        Err(e) => {
            outcome.record_failure(
                e.add_origin(Subsystem::Recovery)
                    .add_dmsg(format!("in-doubt scan of `{name}` failed")),
            );
            return Ok(outcome);
        }
    };
    for xid in xids {
        if !xid.matches_format() {
            // another coordinator's branch
            continue;
        }
        if current_node_only_recovery && !xid.gtrid().originates_from(server_id) {
            continue;
        }
        let in_flight = xid
            .gtrid()
            .timestamp_ms()
            .map(|ts| ts >= reference_time_ms - IN_FLIGHT_SKEW_MS)
            .unwrap_or(false);
        if in_flight {
            // a two-phase commit currently between phases owns this branch; acting on it would
            // break atomicity
            log::debug!("recovery: skipping in-flight branch {xid} on `{name}`");
            continue;
        }
        let must_commit = dangling
            .get(xid.gtrid())
            .map(|tx| tx.awaits(&name))
            .unwrap_or(false);
        if must_commit {
            match resource.commit(&xid, false) {
                Ok(()) => {
                    outcome.committed += 1;
                    log::info!("recovery: committed in-doubt branch {xid} on `{name}`");
                    let tx = dangling
                        .get_mut(xid.gtrid())
                        .expect("dangling entry vanished mid-recovery");
                    if tx.confirm(&name) {
                        // every named resource confirmed: seal the transaction, carrying the
                        // complete name set so the other leg of a multiplexed pair can subtract
                        // all of it
                        let sealed_names: Vec<Box<str>> = tx.record.unique_names().to_vec();
                        let names: Vec<&str> = sealed_names.iter().map(|n| &**n).collect();
                        journal
                            .log(TxStatus::Committed, xid.gtrid(), &names)
                            .set_origin(Subsystem::Journal)?;
                        dangling.remove(xid.gtrid());
                    }
                }
                Err(e) => outcome.record_failure(
                    e.add_origin(Subsystem::Recovery)
                        .add_dmsg(format!("failed to commit {xid} on `{name}`")),
                ),
            }
        } else {
            // presumed abort
            match resource.rollback(&xid) {
                Ok(()) => {
                    outcome.rolledback += 1;
                    log::info!("recovery: rolled back in-doubt branch {xid} on `{name}`");
                }
                Err(e) => outcome.record_failure(
                    e.add_origin(Subsystem::Recovery)
                        .add_dmsg(format!("failed to roll back {xid} on `{name}`")),
                ),
            }
        }
    }
    Ok(outcome)
}

/// The full recovery driver: a one-shot runnable with a reentrancy guard. Concurrent invocations
/// collapse into the single in-progress execution.
pub struct Recoverer {
    journal: Arc<dyn Journal>,
    resources: Arc<crate::resource::ResourceRegistry>,
    server_id: Box<str>,
    current_node_only_recovery: bool,
    running: AtomicBool,
    executions_count: AtomicU64,
    committed_count: AtomicU64,
    rolledback_count: AtomicU64,
    completion_error: Mutex<Option<Error>>,
}

impl Recoverer {
    pub fn new(
        journal: Arc<dyn Journal>,
        resources: Arc<crate::resource::ResourceRegistry>,
        config: &Configuration,
    ) -> Self {
        Self {
            journal,
            resources,
            server_id: config.server_id.clone(),
            current_node_only_recovery: config.current_node_only_recovery,
            running: AtomicBool::new(false),
            executions_count: AtomicU64::new(0),
            committed_count: AtomicU64::new(0),
            rolledback_count: AtomicU64::new(0),
            completion_error: Mutex::new(None),
        }
    }
    /// Run a full recovery pass. Returns immediately (with `Ok`) if a pass is already in
    /// progress on another thread.
    pub fn run(&self) -> RuntimeResult<()> {
        self.run_at(os::get_epoch_time_ms())
    }
    /// Run with an explicit reference time. This is the hook for driving recovery from inside a
    /// transaction's status-changed callback, where the in-flight window must be judged against
    /// the caller's snapshot of "now".
    pub fn run_at(&self, reference_time_ms: i64) -> RuntimeResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // someone else is already recovering; fold into their run
            return Ok(());
        }
        let result = self.perform(reference_time_ms);
        self.executions_count.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        result
    }
    fn perform(&self, reference_time_ms: i64) -> RuntimeResult<()> {
        let resources = self.resources.all();
        // journal errors abort the run; the next run retries from scratch
        let mut dangling = dangling_work_set(&*self.journal)?;
        log::info!(
            "recovery: starting pass over {} resource(s), {} dangling transaction(s)",
            resources.len(),
            dangling.len()
        );
        for resource in resources {
            let outcome = recover_resource(
                &*self.journal,
                &self.server_id,
                self.current_node_only_recovery,
                &*resource,
                reference_time_ms,
                &mut dangling,
            )?;
            self.committed_count.fetch_add(outcome.committed, Ordering::SeqCst);
            self.rolledback_count
                .fetch_add(outcome.rolledback, Ordering::SeqCst);
            if let Some(e) = outcome.completion_error {
                *self.completion_error.lock() = Some(e);
            }
        }
        if !dangling.is_empty() {
            // dangling state naming resources that are not registered right now; they stay put
            // until the next pass or until the missing resource registers (incremental recovery)
            log::info!(
                "recovery: {} dangling transaction(s) await currently unregistered resources",
                dangling.len()
            );
        }
        Ok(())
    }
    pub fn get_committed_count(&self) -> u64 {
        self.committed_count.load(Ordering::SeqCst)
    }
    pub fn get_rolledback_count(&self) -> u64 {
        self.rolledback_count.load(Ordering::SeqCst)
    }
    pub fn get_executions_count(&self) -> u64 {
        self.executions_count.load(Ordering::SeqCst)
    }
    /// The last per-resource failure of any pass, for operator introspection
    pub fn get_completion_error(&self) -> Option<String> {
        self.completion_error.lock().as_ref().map(|e| e.to_string())
    }
}
