// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The engine's facade: takes a request, builds and reconciles its
//! transaction, and installs the outcome into the live set in all-or-nothing
//! fashion. Installed jobs are handed to the run queue, the timer queue and
//! the bus queue; the embedding runtime drains those.

use super::alloc::JobAlloc;
use super::entry::{Job, JobConf, JobInfo, JobResult};
use super::kind::{JobKind, JobMode};
use super::reconcile::job_trans_reconcile;
use super::stat::{JobStat, JobStatSnapshot};
use super::table::JobTable;
use super::transaction::{
    job_trans_add_and_deps, job_trans_add_isolate, job_trans_unlink_job, TransAddFlags,
    Transaction,
};
use crate::error::*;
use crate::unit::{UnitDb, UnitX};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// The job changes one request caused, reported back to interested callers.
#[derive(Debug)]
pub struct JobAffect {
    // data
    ///
    pub adds: Vec<JobInfo>,
    ///
    pub dels: Vec<JobInfo>,
    ///
    pub updates: Vec<JobInfo>,

    // control
    interested: bool,
}

impl JobAffect {
    ///
    pub fn new(interested: bool) -> JobAffect {
        JobAffect {
            adds: Vec::new(),
            dels: Vec::new(),
            updates: Vec::new(),

            interested,
        }
    }

    #[allow(clippy::type_complexity)]
    fn record(&mut self, jobs: &(Vec<Rc<Job>>, Vec<Rc<Job>>, Vec<Rc<Job>>)) {
        if self.interested {
            let (adds, dels, updates) = jobs;
            self.adds.append(&mut jobs_2_jobinfo(adds));
            self.dels.append(&mut jobs_2_jobinfo(dels));
            self.updates.append(&mut jobs_2_jobinfo(updates));
        }
    }
}

/// What the bus queue carries: a job was installed (no result yet) or left
/// the live set with a result.
#[derive(Clone, Debug, Serialize)]
pub struct JobBusEvent {
    ///
    pub id: u128,
    ///
    pub unit: String,
    ///
    pub kind: JobKind,
    ///
    pub result: Option<JobResult>,
}

/// Owns the live job set and the hand-off queues, and serializes every
/// request against them. Single-threaded by construction; a request runs to
/// completion or failure without yielding.
pub struct JobManager {
    // associated objects
    db: Rc<UnitDb>,

    // owned objects
    // control
    ja: JobAlloc,

    // data
    jobs: JobTable,
    rqueue: RefCell<VecDeque<std::rc::Weak<Job>>>,
    tqueue: RefCell<VecDeque<(u128, u64)>>,
    bqueue: RefCell<VecDeque<JobBusEvent>>,

    // statistics
    stat: JobStat,
}

impl JobManager {
    ///
    pub fn new(dbr: &Rc<UnitDb>) -> JobManager {
        JobManager {
            db: Rc::clone(dbr),
            ja: JobAlloc::new(),
            jobs: JobTable::new(dbr),
            rqueue: RefCell::new(VecDeque::new()),
            tqueue: RefCell::new(VecDeque::new()),
            bqueue: RefCell::new(VecDeque::new()),
            stat: JobStat::new(),
        }
    }

    /// The allocator external transaction builders must draw their jobs
    /// from, so ids stay unique against the live set.
    pub fn job_alloc(&self) -> &JobAlloc {
        &self.ja
    }

    /// Executes one request: expand, reconcile, install. On error nothing in
    /// the live set has changed and the transaction is gone.
    pub fn exec(&self, config: &JobConf, mode: JobMode, affect: &mut JobAffect) -> Result<()> {
        job_trans_check_input(config, mode)?;

        let tr = Transaction::new();
        let flags = TransAddFlags::new(true, false);
        if let Err(err) = job_trans_add_and_deps(&tr, &self.ja, &self.db, config, None, &flags) {
            tr.abort();
            return Err(err);
        }
        if mode == JobMode::Isolate {
            if let Err(err) = job_trans_add_isolate(&tr, &self.ja, &self.db) {
                tr.abort();
                return Err(err);
            }
        }

        match self.trans_activate(&tr, mode) {
            Ok(changes) => {
                affect.record(&changes);
                Ok(())
            }
            Err(err) => {
                tr.abort();
                Err(err)
            }
        }
    }

    /// Reconciles and installs an externally built transaction. The caller
    /// aborts it on failure.
    pub fn activate(&self, tr: &Transaction, mode: JobMode) -> Result<()> {
        self.trans_activate(tr, mode).map(|_| ())
    }

    /// Takes a live job out of the set. Depending live jobs go down with it;
    /// the returned flag says whether any did.
    pub fn finish_job(&self, id: u128, result: JobResult) -> Result<bool> {
        let job = match self.jobs.get(id) {
            Some(j) => j,
            None => return Err(Error::Input),
        };

        let finished = self.jobs.finish_and_invalidate(&job, result);
        let touched_others = finished.len() > 1;
        let mut dels = Vec::new();
        for (j, res) in finished.into_iter() {
            self.bus_post(&j, Some(res));
            dels.push(j);
        }
        self.stat
            .update_changes(&(&Vec::new(), &dels, &Vec::new()));
        Ok(touched_others)
    }

    ///
    pub fn jobs_len(&self) -> usize {
        self.jobs.len()
    }

    ///
    pub fn get_jobinfo(&self, id: u128) -> Option<JobInfo> {
        self.jobs.get(id).map(|job| JobInfo::map(&job))
    }

    /// The unit's currently installed job, if any.
    pub fn current_job(&self, unit: &UnitX) -> Option<JobInfo> {
        unit.job().map(|job| JobInfo::map(&job))
    }

    ///
    pub fn has_job(&self, unit: &UnitX) -> bool {
        unit.job().is_some()
    }

    /// Next job ready to run, skipping jobs that died while queued.
    pub fn rqueue_pop(&self) -> Option<JobInfo> {
        loop {
            let weak = match self.rqueue.borrow_mut().pop_front() {
                Some(w) => w,
                None => return None,
            };
            let job = match weak.upgrade() {
                Some(j) => j,
                None => continue,
            };
            job.set_in_rqueue(false);
            if job.is_installed() {
                return Some(JobInfo::map(&job));
            }
        }
    }

    /// Next (job-id, usec) timeout to arm.
    pub fn tqueue_pop(&self) -> Option<(u128, u64)> {
        self.tqueue.borrow_mut().pop_front()
    }

    /// Next outward notification.
    pub fn bqueue_pop(&self) -> Option<JobBusEvent> {
        self.bqueue.borrow_mut().pop_front()
    }

    ///
    pub fn stat(&self) -> JobStatSnapshot {
        self.stat.snapshot()
    }

    #[allow(clippy::type_complexity)]
    fn trans_activate(
        &self,
        tr: &Transaction,
        mode: JobMode,
    ) -> Result<(Vec<Rc<Job>>, Vec<Rc<Job>>, Vec<Rc<Job>>)> {
        job_trans_reconcile(tr, &self.db, mode)?;
        let changes = self.apply(tr, mode)?;
        self.stat
            .update_changes(&(&changes.0, &changes.1, &changes.2));
        Ok(changes)
    }

    /// Moves the reconciled transaction into the live set: all of it, or on
    /// an insertion failure none of it.
    #[allow(clippy::type_complexity)]
    fn apply(
        &self,
        tr: &Transaction,
        mode: JobMode,
    ) -> Result<(Vec<Rc<Job>>, Vec<Rc<Job>>, Vec<Rc<Job>>)> {
        let mut adds = Vec::new();
        let mut dels = Vec::new();
        let mut updates = Vec::new();

        if mode == JobMode::Isolate {
            // when isolating, first cancel all live jobs whose unit is not in
            // the new transaction; cancelling can cascade and invalidate the
            // iteration, so start over whenever it did
            'rescan: loop {
                for job in self.jobs.get_all().iter() {
                    if !job.is_installed() {
                        continue; // a cascade beat us to it
                    }
                    if job.unit().ignore_on_isolate() {
                        continue;
                    }
                    if tr.contains_unit(job.unit()) {
                        continue;
                    }

                    let finished = self.jobs.finish_and_invalidate(job, JobResult::Cancelled);
                    let touched_others = finished.len() > 1;
                    for (j, result) in finished.into_iter() {
                        self.bus_post(&j, Some(result));
                        dels.push(j);
                    }
                    if touched_others {
                        continue 'rescan;
                    }
                }
                break;
            }
        }

        // install phase: reserve an id slot for every new job, all or nothing
        let mut inserted = Vec::new();
        let mut failed = None;
        for job in tr.heads().iter() {
            // assume merged
            if job.is_installed() {
                continue;
            }
            if let Err(err) = self.jobs.register(job) {
                failed = Some(err);
                break;
            }
            inserted.push(job.id());
        }
        if let Some(err) = failed {
            for id in inserted.iter() {
                self.jobs.unregister(*id);
            }
            return Err(err);
        }

        // commit phase: hand every job over to the live set and the queues
        loop {
            let job = match tr.steal_first() {
                Some(j) => j,
                None => break,
            };
            if job.is_installed() {
                continue;
            }

            // clean the job dependencies
            job_trans_unlink_job(tr, &job, false);

            let (installed, superseded) = self.jobs.install(&job);
            for (j, result) in superseded.into_iter() {
                self.bus_post(&j, Some(result));
                dels.push(j);
            }
            if Rc::ptr_eq(&installed, &job) {
                adds.push(Rc::clone(&installed));
            } else {
                // merged into a previously installed job; release the id slot
                self.jobs.unregister(job.id());
                updates.push(Rc::clone(&installed));
            }

            self.rqueue_add(&installed);
            self.timer_start(&installed);
            self.bus_post(&installed, None);
        }

        Ok((adds, dels, updates))
    }

    fn rqueue_add(&self, job: &Rc<Job>) {
        if job.in_rqueue() {
            return;
        }
        job.set_in_rqueue(true);
        self.rqueue.borrow_mut().push_back(Rc::downgrade(job));
    }

    fn timer_start(&self, job: &Rc<Job>) {
        let usec = job.unit().job_timeout_usec();
        if usec == 0 {
            return;
        }
        self.tqueue.borrow_mut().push_back((job.id(), usec));
    }

    fn bus_post(&self, job: &Rc<Job>, result: Option<JobResult>) {
        self.bqueue.borrow_mut().push_back(JobBusEvent {
            id: job.id(),
            unit: job.unit().id(),
            kind: job.kind(),
            result,
        });
    }
}

fn job_trans_check_input(config: &JobConf, mode: JobMode) -> Result<()> {
    // isolation makes sense for start requests alone
    if mode == JobMode::Isolate && config.get_kind() != JobKind::Start {
        return Err(Error::Input);
    }
    Ok(())
}

fn jobs_2_jobinfo(jobs: &[Rc<Job>]) -> Vec<JobInfo> {
    jobs.iter().map(|job| JobInfo::map(job)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{test_utils, UnitActiveState, UnitRelations};

    fn prepare_db(names: &[&str]) -> (Rc<UnitDb>, Vec<Rc<UnitX>>) {
        let db = Rc::new(UnitDb::new());
        let mut units = Vec::new();
        for name in names.iter() {
            let unit = test_utils::create_unit(name);
            db.units_insert(unit.id(), Rc::clone(&unit));
            units.push(unit);
        }
        (db, units)
    }

    fn dep(db: &UnitDb, source: &Rc<UnitX>, relation: UnitRelations, dest: &Rc<UnitX>) {
        db.dep_insert(Rc::clone(source), relation, Rc::clone(dest))
            .unwrap();
    }

    fn exec(jm: &JobManager, unit: &Rc<UnitX>, kind: JobKind, mode: JobMode) -> Result<JobAffect> {
        let mut affect = JobAffect::new(true);
        jm.exec(&JobConf::new(unit, kind), mode, &mut affect)?;
        Ok(affect)
    }

    #[test]
    fn jm_start_pulls_required_chain() {
        // a requires b, b requires c, all inactive
        let (db, units) = prepare_db(&["a.service", "b.service", "c.service"]);
        dep(&db, &units[0], UnitRelations::UnitRequires, &units[1]);
        dep(&db, &units[1], UnitRelations::UnitRequires, &units[2]);
        let jm = JobManager::new(&db);

        let affect = exec(&jm, &units[0], JobKind::Start, JobMode::Fail).unwrap();
        assert_eq!(jm.jobs_len(), 3);
        assert_eq!(affect.adds.len(), 3);
        for unit in units.iter() {
            assert_eq!(jm.current_job(unit).unwrap().kind, JobKind::Start);
        }
        assert_eq!(jm.stat().add, 3);

        // all three jobs reached the run queue
        let mut queued = 0;
        while jm.rqueue_pop().is_some() {
            queued += 1;
        }
        assert_eq!(queued, 3);
    }

    #[test]
    fn jm_start_stops_conflicting_unit() {
        // a conflicts b, b active
        let (db, units) = prepare_db(&["a.service", "b.service"]);
        dep(&db, &units[0], UnitRelations::UnitConflicts, &units[1]);
        units[1].set_active_state(UnitActiveState::Active);
        let jm = JobManager::new(&db);

        exec(&jm, &units[0], JobKind::Start, JobMode::Fail).unwrap();
        assert_eq!(jm.jobs_len(), 2);
        assert_eq!(jm.current_job(&units[0]).unwrap().kind, JobKind::Start);
        assert_eq!(jm.current_job(&units[1]).unwrap().kind, JobKind::Stop);
    }

    #[test]
    fn jm_unbreakable_cycle_leaves_live_set_alone() {
        // a requires b with a declared ordering cycle: both jobs are
        // essential, the transaction is rejected and nothing was installed
        let (db, units) = prepare_db(&["a.service", "b.service"]);
        dep(&db, &units[0], UnitRelations::UnitRequires, &units[1]);
        dep(&db, &units[0], UnitRelations::UnitBefore, &units[1]);
        dep(&db, &units[1], UnitRelations::UnitBefore, &units[0]);
        let jm = JobManager::new(&db);

        let ret = exec(&jm, &units[0], JobKind::Start, JobMode::Fail);
        assert!(matches!(ret, Err(Error::TransactionOrderIsCyclic)));
        assert_eq!(jm.jobs_len(), 0);
        assert!(jm.rqueue_pop().is_none());
        assert!(jm.bqueue_pop().is_none());
    }

    #[test]
    fn jm_start_merges_into_live_reload() {
        // a reload job is pending; a later start folds into it instead of
        // installing a second job
        let (db, units) = prepare_db(&["x.service"]);
        let jm = JobManager::new(&db);

        exec(&jm, &units[0], JobKind::Reload, JobMode::Replace).unwrap();
        let pending = jm.current_job(&units[0]).unwrap();
        assert_eq!(pending.kind, JobKind::Reload);

        let affect = exec(&jm, &units[0], JobKind::Start, JobMode::Fail).unwrap();
        assert_eq!(jm.jobs_len(), 1);
        assert_eq!(affect.adds.len(), 0);
        assert_eq!(affect.updates.len(), 1);

        let merged = jm.current_job(&units[0]).unwrap();
        assert_eq!(merged.id, pending.id);
        assert_eq!(merged.kind, JobKind::ReloadOrStart);
    }

    #[test]
    fn jm_merge_is_commutative_across_requests() {
        let (db, units) = prepare_db(&["x.service", "y.service"]);
        let jm = JobManager::new(&db);

        // reload then start on x
        exec(&jm, &units[0], JobKind::Reload, JobMode::Fail).unwrap();
        exec(&jm, &units[0], JobKind::Start, JobMode::Fail).unwrap();

        // start then reload on y
        exec(&jm, &units[1], JobKind::Start, JobMode::Fail).unwrap();
        exec(&jm, &units[1], JobKind::Reload, JobMode::Fail).unwrap();

        assert_eq!(
            jm.current_job(&units[0]).unwrap().kind,
            JobKind::ReloadOrStart
        );
        assert_eq!(
            jm.current_job(&units[1]).unwrap().kind,
            JobKind::ReloadOrStart
        );
    }

    #[test]
    fn jm_isolate_stops_the_rest() {
        let (db, units) = prepare_db(&[
            "t.service",
            "a.service",
            "b.service",
            "c.service",
            "v.service",
            "z.service",
        ]);
        let (target, a, b, c, spared, zombie) = (
            &units[0], &units[1], &units[2], &units[3], &units[4], &units[5],
        );
        let jm = JobManager::new(&db);

        a.set_active_state(UnitActiveState::Active);
        b.set_active_state(UnitActiveState::Active);
        c.set_active_state(UnitActiveState::Active);
        spared.set_active_state(UnitActiveState::Active);
        spared.set_ignore_on_isolate(true);

        // c carries a pending reload
        exec(&jm, c, JobKind::Reload, JobMode::Replace).unwrap();
        // z carries a stop that already ran its course
        zombie.set_active_state(UnitActiveState::Active);
        exec(&jm, zombie, JobKind::Stop, JobMode::Replace).unwrap();
        zombie.set_active_state(UnitActiveState::InActive);

        exec(&jm, target, JobKind::Start, JobMode::Isolate).unwrap();

        assert_eq!(jm.jobs_len(), 4);
        assert_eq!(jm.current_job(target).unwrap().kind, JobKind::Start);
        assert_eq!(jm.current_job(a).unwrap().kind, JobKind::Stop);
        assert_eq!(jm.current_job(b).unwrap().kind, JobKind::Stop);
        assert_eq!(jm.current_job(c).unwrap().kind, JobKind::Stop);
        assert!(jm.current_job(spared).is_none());
        assert!(jm.current_job(zombie).is_none());

        // the zombie's stale stop was cancelled, c's reload was superseded
        let mut cancelled = Vec::new();
        let mut superseded = Vec::new();
        while let Some(event) = jm.bqueue_pop() {
            match event.result {
                Some(JobResult::Cancelled) => cancelled.push(event.unit),
                Some(JobResult::Superseded) => superseded.push(event.unit),
                _ => {}
            }
        }
        assert_eq!(cancelled, vec![String::from("z.service")]);
        assert_eq!(superseded, vec![String::from("c.service")]);
    }

    #[test]
    fn jm_isolate_requires_start() {
        let (db, units) = prepare_db(&["a.service"]);
        let jm = JobManager::new(&db);

        let ret = exec(&jm, &units[0], JobKind::Stop, JobMode::Isolate);
        assert!(matches!(ret, Err(Error::Input)));
    }

    #[test]
    fn jm_verify_active_on_active_is_a_noop() {
        let (db, units) = prepare_db(&["u.service"]);
        units[0].set_active_state(UnitActiveState::Active);
        let jm = JobManager::new(&db);

        let affect = exec(&jm, &units[0], JobKind::VerifyActive, JobMode::Fail).unwrap();
        assert_eq!(jm.jobs_len(), 0);
        assert!(affect.adds.is_empty());
        assert!(jm.rqueue_pop().is_none());
    }

    #[test]
    fn jm_start_on_active_is_idempotent() {
        let (db, units) = prepare_db(&["u.service"]);
        units[0].set_active_state(UnitActiveState::Active);
        let jm = JobManager::new(&db);

        exec(&jm, &units[0], JobKind::Start, JobMode::Fail).unwrap();
        assert_eq!(jm.jobs_len(), 0);
        assert!(jm.rqueue_pop().is_none());
    }

    #[test]
    fn jm_fail_mode_refuses_destructive_replacement() {
        let (db, units) = prepare_db(&["z.service"]);
        let jm = JobManager::new(&db);

        // a pending stop on a unit that has meanwhile gone down
        units[0].set_active_state(UnitActiveState::Active);
        exec(&jm, &units[0], JobKind::Stop, JobMode::Replace).unwrap();
        units[0].set_active_state(UnitActiveState::InActive);
        let stop_id = jm.current_job(&units[0]).unwrap().id;

        let ret = exec(&jm, &units[0], JobKind::Start, JobMode::Fail);
        assert!(matches!(ret, Err(Error::TransactionIsDestructive)));
        assert_eq!(jm.jobs_len(), 1);
        assert_eq!(jm.current_job(&units[0]).unwrap().id, stop_id);

        // replace mode supersedes the stop instead
        exec(&jm, &units[0], JobKind::Start, JobMode::Replace).unwrap();
        assert_eq!(jm.jobs_len(), 1);
        assert_eq!(jm.current_job(&units[0]).unwrap().kind, JobKind::Start);

        let mut superseded = 0;
        while let Some(event) = jm.bqueue_pop() {
            if event.result == Some(JobResult::Superseded) {
                superseded += 1;
            }
        }
        assert_eq!(superseded, 1);
    }

    #[test]
    fn jm_finish_cascades_to_dependent_jobs() {
        let (db, units) = prepare_db(&["a.service", "b.service"]);
        dep(&db, &units[0], UnitRelations::UnitRequires, &units[1]);
        let jm = JobManager::new(&db);

        exec(&jm, &units[0], JobKind::Start, JobMode::Replace).unwrap();
        assert_eq!(jm.jobs_len(), 2);

        let b_job = jm.current_job(&units[1]).unwrap();
        let touched_others = jm.finish_job(b_job.id, JobResult::Failed).unwrap();
        assert!(touched_others);
        assert_eq!(jm.jobs_len(), 0);

        let mut results = Vec::new();
        while let Some(event) = jm.bqueue_pop() {
            if let Some(result) = event.result {
                results.push((event.unit, result));
            }
        }
        assert!(results.contains(&(String::from("b.service"), JobResult::Failed)));
        assert!(results.contains(&(String::from("a.service"), JobResult::Dependency)));
    }

    #[test]
    fn jm_finish_unknown_job() {
        let (db, _units) = prepare_db(&["a.service"]);
        let jm = JobManager::new(&db);
        assert!(jm.finish_job(7, JobResult::Done).is_err());
    }

    #[test]
    fn jm_timer_armed_from_unit_budget() {
        let (db, units) = prepare_db(&["a.service"]);
        units[0].set_job_timeout_usec(90 * 1000000);
        let jm = JobManager::new(&db);

        exec(&jm, &units[0], JobKind::Start, JobMode::Fail).unwrap();
        let job = jm.current_job(&units[0]).unwrap();
        assert_eq!(jm.tqueue_pop(), Some((job.id, 90 * 1000000)));
        assert!(jm.tqueue_pop().is_none());
    }

    #[test]
    fn jm_activate_external_transaction() {
        let (db, units) = prepare_db(&["a.service", "b.service"]);
        dep(&db, &units[0], UnitRelations::UnitRequires, &units[1]);
        let jm = JobManager::new(&db);

        let tr = Transaction::new();
        let conf = JobConf::new(&units[0], JobKind::Start);
        job_trans_add_and_deps(
            &tr,
            jm.job_alloc(),
            &db,
            &conf,
            None,
            &TransAddFlags::new(true, false),
        )
        .unwrap();

        jm.activate(&tr, JobMode::Replace).unwrap();
        assert!(tr.is_empty());
        assert_eq!(jm.jobs_len(), 2);
    }
}
