/*
 * Created on Mon Jul 08 2024
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

use {
    super::{disk::DiskJournal, Journal, JournalRecords, RecordIter},
    crate::{
        config::DiskConfiguration,
        error::{Error, RuntimeResult},
        storage::record::TxRecord,
        sync::FanoutPool,
        txn::{uid::Uid, TxStatus},
    },
    std::{
        collections::{hash_map::Entry, HashMap, HashSet},
        io::{Error as IoError, ErrorKind as IoErrorKind},
        sync::{mpsc, Arc},
        time::Duration,
    },
};

/// Raised when both legs agree that the same record is corrupt and the deployment asked for
/// corruption to be fatal
pub const ERR_SAME_CORRUPTED_RECORDS: &str = "Both journals have same corrupted records";

/// The high-availability journal: two disk journals written in parallel and reconciled on read.
/// Either fragment pair can be lost or corrupted without losing transaction state, because a
/// dangling record is only dropped when the *other* leg positively witnesses its completion for
/// the same resource names.
pub struct MultiplexedJournal {
    primary: Arc<DiskJournal>,
    secondary: Arc<DiskJournal>,
    pool: FanoutPool,
    fail_on_record_corruption: bool,
}

/// Fan-out width: one worker per leg
const FANOUT: usize = 2;
/// Bound on awaiting outstanding leg operations at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

impl MultiplexedJournal {
    pub fn new(
        primary: DiskConfiguration,
        secondary: DiskConfiguration,
        fail_on_record_corruption: bool,
    ) -> Self {
        Self {
            primary: Arc::new(DiskJournal::new(primary)),
            secondary: Arc::new(DiskJournal::new(secondary)),
            pool: FanoutPool::new(FANOUT),
            fail_on_record_corruption,
        }
    }
    /// Run `f` against both legs in parallel and join the results. The blocking happens here;
    /// callers never observe the concurrency.
    fn fan_out<T, F>(&self, f: F) -> [RuntimeResult<T>; FANOUT]
    where
        T: Send + 'static,
        F: Fn(&DiskJournal) -> RuntimeResult<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let legs = [self.primary.clone(), self.secondary.clone()];
        let mut pending = Vec::with_capacity(FANOUT);
        for (worker, journal) in legs.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel();
            let f = f.clone();
            let submitted = self.pool.execute(
                worker,
                Box::new(move || {
                    let _ = tx.send(f(&journal));
                }),
            );
            pending.push((rx, submitted));
        }
        let mut join = pending.into_iter().map(|(rx, submitted)| match submitted {
            Ok(()) => rx.recv().unwrap_or_else(|_| {
                // a dropped sender means the worker died mid-operation; to the caller this is
                // indistinguishable from an interrupted wait
                Err(IoError::new(
                    IoErrorKind::Interrupted,
                    "journal worker vanished while executing an operation",
                )
                .into())
            }),
            Err(e) => Err(e.into()),
        });
        [join.next().unwrap(), join.next().unwrap()]
    }
    /// Join a fanned out mutating operation: success iff both legs succeeded
    fn join_both(&self, op: &'static str, results: [RuntimeResult<()>; FANOUT]) -> RuntimeResult<()> {
        let [primary, secondary] = results;
        match (primary, secondary) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(p), Err(s)) => Err(IoError::new(
                IoErrorKind::Other,
                format!("both journals failed to {op}: primary: {p}; secondary: {s}"),
            )
            .into()),
            (Err(e), Ok(())) => Err(e.add_dmsg(format!("primary journal failed to {op}"))),
            (Ok(()), Err(e)) => Err(e.add_dmsg(format!("secondary journal failed to {op}"))),
        }
    }
    fn merge(&self, primary: JournalRecords, secondary: JournalRecords) -> RuntimeResult<JournalRecords> {
        // corruption intersection policy: a record corrupt on one side only is healed by the
        // other side; corrupt on both sides it is gone for good
        let corrupted: HashSet<u64> = primary
            .corrupted
            .intersection(&secondary.corrupted)
            .copied()
            .collect();
        if !corrupted.is_empty() && self.fail_on_record_corruption {
            return Err(IoError::new(IoErrorKind::Other, ERR_SAME_CORRUPTED_RECORDS).into());
        }
        let mut dangling = HashMap::new();
        Self::reduce_dangling(&primary.dangling, &secondary.committed, &mut dangling);
        Self::reduce_dangling(&secondary.dangling, &primary.committed, &mut dangling);
        let mut committed = secondary.committed;
        committed.extend(primary.committed);
        Ok(JournalRecords {
            dangling,
            committed,
            corrupted,
        })
    }
    /// Subtract the resource names witnessed as committed by the *other* leg from each dangling
    /// record; gtrids whose residual name set is empty are no longer dangling. Residuals from
    /// both legs are unioned (by gtrid, merging name sets).
    fn reduce_dangling(
        dangling: &HashMap<Uid, TxRecord>,
        other_committed: &HashMap<Uid, TxRecord>,
        out: &mut HashMap<Uid, TxRecord>,
    ) {
        for (gtrid, record) in dangling {
            let reduced = match other_committed.get(gtrid) {
                Some(witness) => {
                    let residual: Vec<Box<str>> = record
                        .unique_names()
                        .iter()
                        .filter(|name| !witness.has_unique_name(name))
                        .cloned()
                        .collect();
                    if residual.is_empty() {
                        continue;
                    }
                    record.with_unique_names(residual)
                }
                None => record.clone(),
            };
            match out.entry(gtrid.clone()) {
                Entry::Vacant(v) => {
                    v.insert(reduced);
                }
                Entry::Occupied(mut o) => {
                    let mut names: Vec<Box<str>> = o.get().unique_names().to_vec();
                    for name in reduced.unique_names() {
                        if !o.get().has_unique_name(name) {
                            names.push(name.clone());
                        }
                    }
                    let merged = o.get().with_unique_names(names);
                    o.insert(merged);
                }
            }
        }
    }
}

impl Journal for MultiplexedJournal {
    fn open(&self) -> RuntimeResult<()> {
        self.join_both("open", self.fan_out(|j| j.open()))
    }
    fn close(&self) -> RuntimeResult<()> {
        self.join_both("close", self.fan_out(|j| j.close()))
    }
    fn shutdown(&self) -> RuntimeResult<()> {
        self.join_both("shutdown", self.fan_out(|j| j.shutdown()))?;
        self.pool.quiesce(SHUTDOWN_GRACE).map_err(Error::from)
    }
    fn log(&self, status: TxStatus, gtrid: &Uid, unique_names: &[&str]) -> RuntimeResult<()> {
        let gtrid = gtrid.clone();
        let unique_names: Vec<Box<str>> = unique_names.iter().map(|n| (*n).into()).collect();
        self.join_both(
            "log",
            self.fan_out(move |j| {
                let names: Vec<&str> = unique_names.iter().map(|n| &**n).collect();
                j.log(status, &gtrid, &names)
            }),
        )
    }
    fn force(&self) -> RuntimeResult<()> {
        self.join_both("force", self.fan_out(|j| j.force()))
    }
    fn collect_all_records(&self) -> RuntimeResult<JournalRecords> {
        let [primary, secondary] = self.fan_out(|j| j.collect_all_records());
        match (primary, secondary) {
            (Ok(p), Ok(s)) => self.merge(p, s),
            (Ok(p), Err(e)) => {
                log::warn!("secondary journal failed to collect records, continuing on the primary alone: {e}");
                Ok(p)
            }
            (Err(e), Ok(s)) => {
                log::warn!("primary journal failed to collect records, continuing on the secondary alone: {e}");
                Ok(s)
            }
            (Err(p), Err(s)) => Err(IoError::new(
                IoErrorKind::Other,
                format!("both journals failed to collect records: primary: {p}; secondary: {s}"),
            )
            .into()),
        }
    }
    /// Raw records of the primary leg. The reconciled view of the pair is only defined for
    /// [`Journal::collect_all_records`]; for diagnostics the legs can be read individually.
    fn read_records(&self, include_invalid: bool) -> RuntimeResult<RecordIter> {
        self.primary.read_records(include_invalid)
    }
}
