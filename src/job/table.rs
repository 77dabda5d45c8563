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

//! The manager's live job set: at most one installed job per unit, keyed by
//! the job's id. Installing against an occupied unit merges or supersedes;
//! finishing a job may drag the live jobs depending on it down with it.

use super::entry::{Job, JobResult};
use super::kind::{job_kind_is_conflicting, job_kind_merge, JobKind};
use crate::error::*;
use crate::unit::{UnitDb, UnitRelations};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub(super) struct JobTable {
    // associated objects
    db: Rc<UnitDb>,

    // owned objects
    // key: job-id, value: job; the per-unit view lives on the units themselves
    t_id: RefCell<HashMap<u128, Rc<Job>>>,
}

impl JobTable {
    pub(super) fn new(dbr: &Rc<UnitDb>) -> JobTable {
        JobTable {
            db: Rc::clone(dbr),
            t_id: RefCell::new(HashMap::new()),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.t_id.borrow().len()
    }

    pub(super) fn get(&self, id: u128) -> Option<Rc<Job>> {
        self.t_id.borrow().get(&id).map(Rc::clone)
    }

    pub(super) fn get_all(&self) -> Vec<Rc<Job>> {
        self.t_id.borrow().values().map(Rc::clone).collect()
    }

    /// Reserves the job's id slot. The job is not visible to units yet.
    pub(super) fn register(&self, job: &Rc<Job>) -> Result<()> {
        let mut t_id = self.t_id.borrow_mut();
        if t_id.contains_key(&job.id()) {
            return Err(Error::Internal);
        }
        t_id.insert(job.id(), Rc::clone(job));
        Ok(())
    }

    pub(super) fn unregister(&self, id: u128) {
        self.t_id.borrow_mut().remove(&id);
    }

    /// Makes the job live on its unit. A mergeable job already installed
    /// there absorbs the new one and survives; a conflicting one is finished
    /// as superseded first. Returns the surviving job and everything that was
    /// finished on the way.
    pub(super) fn install(&self, job: &Rc<Job>) -> (Rc<Job>, Vec<(Rc<Job>, JobResult)>) {
        let mut finished = Vec::new();

        if let Some(uj) = job.unit().job() {
            if !job_kind_is_conflicting(uj.kind(), job.kind()) {
                let merged = match job_kind_merge(uj.kind(), job.kind()) {
                    Some(t) => t,
                    None => unreachable!("non-conflicting job kinds always merge"),
                };
                uj.set_kind(merged);
                uj.merge_attr(&job.attr());
                log::debug!(
                    "Merged job {}/{:?} into installed job {}",
                    uj.unit().id(),
                    uj.kind(),
                    uj.id()
                );
                return (uj, finished);
            }

            finished.append(&mut self.finish_and_invalidate(&uj, JobResult::Superseded));
        }

        job.set_installed();
        job.unit().bind_job(job);
        log::debug!(
            "Installed new job {}/{:?} as {}",
            job.unit().id(),
            job.kind(),
            job.id()
        );
        (Rc::clone(job), finished)
    }

    /// Takes the job out of the live set with the given result. Live jobs
    /// that cannot proceed without it are finished recursively as dependency
    /// failures. Returns every job that went away, the given one first.
    pub(super) fn finish_and_invalidate(
        &self,
        job: &Rc<Job>,
        result: JobResult,
    ) -> Vec<(Rc<Job>, JobResult)> {
        let mut finished = Vec::new();

        self.uninstall(job);
        log::debug!(
            "Finished job {}/{:?} as {:?}",
            job.unit().id(),
            job.kind(),
            result
        );
        finished.push((Rc::clone(job), result));

        // fail the depending jobs unless we finished cleanly
        if result != JobResult::Done {
            let unit = Rc::clone(job.unit());
            match job.kind() {
                JobKind::Start | JobKind::VerifyActive | JobKind::ReloadOrStart => {
                    let relations = [
                        UnitRelations::UnitRequiredBy,
                        UnitRelations::UnitRequiredByOverridable,
                        UnitRelations::UnitBoundBy,
                    ];
                    for relation in relations.iter() {
                        for other in self.db.dep_gets(&unit, *relation).iter() {
                            if let Some(oj) = other.job() {
                                if job_is_start_like(oj.kind()) {
                                    finished.append(
                                        &mut self
                                            .finish_and_invalidate(&oj, JobResult::Dependency),
                                    );
                                }
                            }
                        }
                    }
                }
                JobKind::Stop => {
                    for other in self
                        .db
                        .dep_gets(&unit, UnitRelations::UnitConflictedBy)
                        .iter()
                    {
                        if let Some(oj) = other.job() {
                            if job_is_start_like(oj.kind()) {
                                finished.append(
                                    &mut self.finish_and_invalidate(&oj, JobResult::Dependency),
                                );
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        finished
    }

    fn uninstall(&self, job: &Rc<Job>) {
        assert!(job.is_installed());
        self.t_id.borrow_mut().remove(&job.id());
        job.unit().unbind_job(job);
        job.clear_installed();
    }
}

fn job_is_start_like(kind: JobKind) -> bool {
    matches!(
        kind,
        JobKind::Start | JobKind::VerifyActive | JobKind::ReloadOrStart
    )
}
