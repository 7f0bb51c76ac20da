/*
 * Created on Thu Jul 25 2024
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
    super::{incremental::IncrementalRecoverer, Recoverer},
    crate::{
        config::{Configuration, DiskConfiguration, JournalKind},
        error::RuntimeResult,
        journal::{
            disk::DiskJournal, multiplexed::MultiplexedJournal, null::NullJournal, Journal,
        },
        resource::{mock::MockResource, ResourceRegistry, TransactionResource},
        txn::{
            uid::{Uid, UidGenerator},
            xid::Xid,
            TxStatus,
        },
        util::{os, test_utils},
    },
    parking_lot::Mutex,
    std::sync::{mpsc, Arc},
};

const SERVER_ID: &str = "node-rec";

struct Rig {
    journal: Arc<dyn Journal>,
    resources: Arc<ResourceRegistry>,
    recoverer: Recoverer,
    gen: UidGenerator,
    config: Configuration,
}

fn disk_rig(tag: &str) -> Rig {
    let mut config = Configuration::default_with_server_id(SERVER_ID);
    config.disk = DiskConfiguration::default_with_parts(
        &format!("{tag}-1.tlog"),
        &format!("{tag}-2.tlog"),
    );
    let journal: Arc<dyn Journal> = Arc::new(DiskJournal::new(config.disk.clone()));
    journal.open().unwrap();
    rig_with(journal, config)
}

fn rig_with(journal: Arc<dyn Journal>, config: Configuration) -> Rig {
    let resources = Arc::new(ResourceRegistry::new());
    let recoverer = Recoverer::new(journal.clone(), resources.clone(), &config);
    Rig {
        journal,
        resources,
        recoverer,
        gen: UidGenerator::new(SERVER_ID),
        config,
    }
}

/// A gtrid old enough to be outside every in-flight window
fn stale_gtrid(gen: &UidGenerator) -> Uid {
    gen.generate_at(os::get_epoch_time_ms() - 120_000)
}

fn in_doubt(resource: &MockResource, gen: &UidGenerator, gtrid: &Uid) -> Xid {
    let xid = Xid::new(gtrid.clone(), gen.generate());
    resource.add_in_doubt(xid.clone());
    xid
}

/// Presumed abort: in-doubt branches with no journal trace are rolled back
#[test]
fn presumed_abort() {
    test_utils::init_logging();
    let rig = disk_rig("rec_presumed_abort");
    let resource = Arc::new(MockResource::new("pg"));
    let gtrid = stale_gtrid(&rig.gen);
    for _ in 0..3 {
        in_doubt(&resource, &rig.gen, &gtrid);
    }
    rig.resources.register(resource.clone()).unwrap();
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 0);
    assert_eq!(rig.recoverer.get_rolledback_count(), 3);
    assert!(resource.recover(0).unwrap().is_empty());
    assert!(rig.recoverer.get_completion_error().is_none());
}

/// Recover committing: a journaled `COMMITTING` naming the resource drives the
/// branch to commit
#[test]
fn recover_committing() {
    let rig = disk_rig("rec_commit");
    let resource = Arc::new(MockResource::new("pg"));
    for _ in 0..3 {
        let gtrid = stale_gtrid(&rig.gen);
        rig.journal
            .log(TxStatus::Committing, &gtrid, &["pg"])
            .unwrap();
        in_doubt(&resource, &rig.gen, &gtrid);
    }
    rig.resources.register(resource.clone()).unwrap();
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 3);
    assert_eq!(rig.recoverer.get_rolledback_count(), 0);
    assert!(resource.recover(0).unwrap().is_empty());
    // the commits were sealed in the journal
    assert!(rig.journal.collect_dangling_records().unwrap().is_empty());
    assert_eq!(rig.journal.collect_all_records().unwrap().committed.len(), 3);
}

/// Skip in-flight: branches of a transaction still running on this node are left
/// alone, and are picked up by nobody once it completes normally
#[test]
fn skip_in_flight() {
    let rig = disk_rig("rec_inflight");
    let resource = Arc::new(MockResource::new("pg"));
    let t0 = os::get_epoch_time_ms();
    // a stale transaction that only a foreign resource would commit: rollback material
    let stale = rig.gen.generate_at(t0 - 1_000);
    rig.journal
        .log(TxStatus::Committing, &stale, &["remote-cache"])
        .unwrap();
    in_doubt(&resource, &rig.gen, &stale);
    // a live two-phase commit between phases
    let live = rig.gen.generate_at(t0 + 30);
    let live_xid = in_doubt(&resource, &rig.gen, &live);
    rig.resources.register(resource.clone()).unwrap();
    rig.recoverer.run_at(t0).unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 0);
    assert_eq!(rig.recoverer.get_rolledback_count(), 1);
    // the live branch is untouched
    assert_eq!(resource.recover(0).unwrap(), vec![live_xid.clone()]);
    // the live transaction completes normally; reopen the journal and run again
    resource.forget(&live_xid);
    rig.journal.close().unwrap();
    rig.journal.open().unwrap();
    rig.recoverer
        .run_at(os::get_epoch_time_ms())
        .unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 0);
    assert_eq!(rig.recoverer.get_rolledback_count(), 1);
    assert!(resource.recover(0).unwrap().is_empty());
    assert_eq!(rig.recoverer.get_executions_count(), 2);
}

/// Sealing a transaction that names several resources must record the complete name set: the
/// merge of a multiplexed pair subtracts exactly the names a `COMMITTED` carries, so an
/// under-named seal would leave the other resources spuriously dangling on the surviving leg
#[test]
fn seal_carries_the_complete_name_set() {
    let rig = disk_rig("rec_seal_names");
    let pg = Arc::new(MockResource::new("pg"));
    let mq = Arc::new(MockResource::new("mq"));
    let gtrid = stale_gtrid(&rig.gen);
    rig.journal
        .log(TxStatus::Committing, &gtrid, &["pg", "mq"])
        .unwrap();
    in_doubt(&pg, &rig.gen, &gtrid);
    in_doubt(&mq, &rig.gen, &gtrid);
    rig.resources.register(pg.clone()).unwrap();
    rig.resources.register(mq.clone()).unwrap();
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 2);
    assert_eq!(rig.recoverer.get_rolledback_count(), 0);
    let records = rig.journal.collect_all_records().unwrap();
    assert!(records.dangling.is_empty());
    let sealed = &records.committed[&gtrid];
    assert!(sealed.has_unique_name("pg"));
    assert!(sealed.has_unique_name("mq"));
}

/// A commit failure on one resource is captured and does not stop the pass
#[test]
fn per_resource_failures_are_not_fatal() {
    let rig = disk_rig("rec_partial_failure");
    let flaky = Arc::new(MockResource::new("flaky"));
    let healthy = Arc::new(MockResource::new("healthy"));
    let committable = stale_gtrid(&rig.gen);
    rig.journal
        .log(TxStatus::Committing, &committable, &["flaky"])
        .unwrap();
    in_doubt(&flaky, &rig.gen, &committable);
    flaky.fail_commits(true);
    in_doubt(&healthy, &rig.gen, &stale_gtrid(&rig.gen));
    rig.resources.register(flaky.clone()).unwrap();
    rig.resources.register(healthy.clone()).unwrap();
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 0);
    assert_eq!(rig.recoverer.get_rolledback_count(), 1);
    let err = rig.recoverer.get_completion_error().unwrap();
    assert!(err.contains("failed to commit"));
    assert!(err.contains("flaky"));
    // the dangling record survived the failed pass, so the next one can finish the job
    flaky.fail_commits(false);
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 1);
    assert!(rig.journal.collect_dangling_records().unwrap().is_empty());
}

/// Dangling records naming an unregistered resource wait for it; when it registers, the
/// incremental path finishes the commit
#[test]
fn incremental_recovery_of_a_late_resource() {
    let rig = disk_rig("rec_incremental");
    let gtrid = stale_gtrid(&rig.gen);
    rig.journal
        .log(TxStatus::Committing, &gtrid, &["late"])
        .unwrap();
    // a full pass with no resources leaves the dangling record in place
    rig.recoverer.run().unwrap();
    assert_eq!(rig.journal.collect_dangling_records().unwrap().len(), 1);
    // the resource joins later
    let late = Arc::new(MockResource::new("late"));
    in_doubt(&late, &rig.gen, &gtrid);
    let incremental = IncrementalRecoverer::new(rig.journal.clone(), &rig.config);
    let counts = incremental.recover(&*late).unwrap();
    assert_eq!(counts.committed, 1);
    assert_eq!(counts.rolledback, 0);
    assert!(late.recover(0).unwrap().is_empty());
    assert!(rig.journal.collect_dangling_records().unwrap().is_empty());
}

/// A dual journal whose primary lost a `COMMITTED` record is healed by the secondary on read,
/// so a recovery pass over it has nothing left to do
#[test]
fn healed_dual_journal_drives_no_actions() {
    let p = DiskConfiguration::default_with_parts("rec_mpx_p1.tlog", "rec_mpx_p2.tlog");
    let s = DiskConfiguration::default_with_parts("rec_mpx_s1.tlog", "rec_mpx_s2.tlog");
    let gen = UidGenerator::new(SERVER_ID);
    let g = gen.generate_at(os::get_epoch_time_ms() - 120_000);
    {
        let mpx = MultiplexedJournal::new(p.clone(), s.clone(), false);
        mpx.open().unwrap();
        mpx.log(TxStatus::Committing, &g, &["pg"]).unwrap();
        mpx.close().unwrap();
    }
    {
        // only the secondary leg ever sees the commit
        let leg = DiskJournal::new(s.clone());
        leg.open().unwrap();
        leg.log(TxStatus::Committed, &g, &["pg"]).unwrap();
        leg.close().unwrap();
    }
    let mut config = Configuration::default_with_server_id(SERVER_ID);
    config.journal = JournalKind::Multiplexed;
    config.primary_disk = p;
    config.secondary_disk = s;
    let journal: Arc<dyn Journal> = Arc::new(MultiplexedJournal::new(
        config.primary_disk.clone(),
        config.secondary_disk.clone(),
        config.fail_on_record_corruption,
    ));
    journal.open().unwrap();
    let rig = rig_with(journal, config);
    let resource = Arc::new(MockResource::new("pg"));
    rig.resources.register(resource.clone()).unwrap();
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 0);
    assert_eq!(rig.recoverer.get_rolledback_count(), 0);
    assert!(rig.journal.collect_dangling_records().unwrap().is_empty());
    assert!(resource.recover(0).unwrap().is_empty());
}

/// Branches stamped by other coordinators (or other nodes, with node-local recovery on) are not
/// touched
#[test]
fn foreign_branches_are_ignored() {
    let rig = disk_rig("rec_foreign");
    assert!(rig.config.current_node_only_recovery);
    let resource = Arc::new(MockResource::new("pg"));
    // wrong format id
    let foreign_tm = Xid::from_raw(0x1234, stale_gtrid(&rig.gen), b"bq");
    resource.add_in_doubt(foreign_tm.clone());
    // right format id, wrong node
    let other_node = UidGenerator::new("node-other");
    let foreign_node = Xid::new(stale_gtrid(&other_node), other_node.generate());
    resource.add_in_doubt(foreign_node.clone());
    rig.resources.register(resource.clone()).unwrap();
    rig.recoverer.run().unwrap();
    assert_eq!(rig.recoverer.get_committed_count(), 0);
    assert_eq!(rig.recoverer.get_rolledback_count(), 0);
    assert_eq!(resource.recover(0).unwrap().len(), 2);
}

/*
    reentrancy
*/

/// A resource whose in-doubt scan blocks until the test releases it, to hold a recovery pass
/// open deterministically
struct GateResource {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl TransactionResource for GateResource {
    fn unique_name(&self) -> &str {
        "gate"
    }
    fn recover(&self, _flags: i32) -> RuntimeResult<Vec<Xid>> {
        self.entered.lock().send(()).unwrap();
        self.release.lock().recv().unwrap();
        Ok(vec![])
    }
    fn commit(&self, _: &Xid, _: bool) -> RuntimeResult<()> {
        Ok(())
    }
    fn rollback(&self, _: &Xid) -> RuntimeResult<()> {
        Ok(())
    }
}

/// N concurrent starts collapse into exactly one execution
#[test]
fn concurrent_runs_collapse_into_one() {
    let config = Configuration::default_with_server_id(SERVER_ID);
    let journal: Arc<dyn Journal> = Arc::new(NullJournal::new());
    let resources = Arc::new(ResourceRegistry::new());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    resources
        .register(Arc::new(GateResource {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }))
        .unwrap();
    let recoverer = Arc::new(Recoverer::new(journal, resources, &config));
    let performing = {
        let recoverer = recoverer.clone();
        std::thread::spawn(move || recoverer.run().unwrap())
    };
    // the pass is now provably in progress
    entered_rx.recv().unwrap();
    // nine more concurrent starts fold into it and return right away
    let others: Vec<_> = (0..9)
        .map(|_| {
            let recoverer = recoverer.clone();
            std::thread::spawn(move || recoverer.run().unwrap())
        })
        .collect();
    for handle in others {
        handle.join().unwrap();
    }
    assert_eq!(recoverer.get_executions_count(), 0);
    release_tx.send(()).unwrap();
    performing.join().unwrap();
    assert_eq!(recoverer.get_executions_count(), 1);
}
