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

//! The transaction: every pending job of one request keyed by unit, plus the
//! anchor the client asked for. The builder expands a request over the unit
//! dependency graph into jobs and links; deleting a job cascades through the
//! links that made it necessary.

use super::alloc::JobAlloc;
use super::dependency::JobDependency;
use super::entry::{Job, JobConf};
use super::kind::{job_kind_is_applicable, JobAttr, JobKind};
use crate::error::*;
use crate::unit::{UnitDb, UnitLoadState, UnitRelations, UnitX};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A set of pending jobs, one list per unit, under construction or
/// reconciliation. Jobs are owned here until the applier steals them.
pub struct Transaction {
    // owned objects
    // key: unit, value: the unit's jobs, head first
    jobs: RefCell<HashMap<Rc<UnitX>, Vec<Rc<Job>>>>,
    anchor: RefCell<Option<Rc<Job>>>,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}

impl Transaction {
    ///
    pub fn new() -> Transaction {
        Transaction {
            jobs: RefCell::new(HashMap::new()),
            anchor: RefCell::new(None),
        }
    }

    /// Total number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.borrow().values().map(|list| list.len()).sum()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }

    /// Drops every job in the transaction. Nothing in the live set is touched.
    pub fn abort(&self) {
        loop {
            let job = {
                let jobs = self.jobs.borrow();
                jobs.values()
                    .next()
                    .and_then(|list| list.first().map(Rc::clone))
            };
            match job {
                Some(j) => job_trans_delete_job(self, &j, true),
                None => break,
            }
        }
        *self.anchor.borrow_mut() = None;
    }

    pub(crate) fn contains_unit(&self, unit: &UnitX) -> bool {
        self.jobs.borrow().contains_key(unit)
    }

    pub(super) fn anchor(&self) -> Option<Rc<Job>> {
        self.anchor.borrow().as_ref().map(Rc::clone)
    }

    pub(super) fn set_anchor(&self, job: &Rc<Job>) {
        *self.anchor.borrow_mut() = Some(Rc::clone(job));
    }

    pub(super) fn is_anchor(&self, job: &Rc<Job>) -> bool {
        match self.anchor.borrow().as_ref() {
            Some(anchor) => Rc::ptr_eq(anchor, job),
            None => false,
        }
    }

    pub(super) fn head(&self, unit: &UnitX) -> Option<Rc<Job>> {
        self.jobs
            .borrow()
            .get(unit)
            .and_then(|list| list.first().map(Rc::clone))
    }

    pub(super) fn heads(&self) -> Vec<Rc<Job>> {
        self.jobs
            .borrow()
            .values()
            .filter_map(|list| list.first().map(Rc::clone))
            .collect()
    }

    pub(super) fn units(&self) -> Vec<Rc<UnitX>> {
        self.jobs.borrow().keys().map(Rc::clone).collect()
    }

    pub(super) fn all_jobs(&self) -> Vec<Rc<Job>> {
        self.jobs
            .borrow()
            .values()
            .flat_map(|list| list.iter().map(Rc::clone))
            .collect()
    }

    pub(super) fn unit_jobs(&self, unit: &UnitX) -> Vec<Rc<Job>> {
        match self.jobs.borrow().get(unit) {
            Some(list) => list.iter().map(Rc::clone).collect(),
            None => Vec::new(),
        }
    }

    pub(super) fn contains_job(&self, job: &Rc<Job>) -> bool {
        match self.jobs.borrow().get(job.unit().as_ref()) {
            Some(list) => list.iter().any(|j| Rc::ptr_eq(j, job)),
            None => false,
        }
    }

    /// Removes and returns one unit's job. Only valid once merging has
    /// converged to a single job per unit.
    pub(super) fn steal_first(&self) -> Option<Rc<Job>> {
        let mut jobs = self.jobs.borrow_mut();
        let unit = match jobs.keys().next().map(Rc::clone) {
            Some(u) => u,
            None => return None,
        };
        let list = match jobs.remove(&unit) {
            Some(l) => l,
            None => return None,
        };
        assert_eq!(list.len(), 1);
        list.into_iter().next()
    }

    fn find_or_create(
        &self,
        ja: &JobAlloc,
        unit: &Rc<UnitX>,
        kind: JobKind,
        force: bool,
    ) -> (Rc<Job>, bool) {
        {
            let jobs = self.jobs.borrow();
            if let Some(list) = jobs.get(unit.as_ref()) {
                for j in list.iter() {
                    if j.kind() == kind {
                        return (Rc::clone(j), false);
                    }
                }
            }
        }

        let job = ja.alloc(Rc::clone(unit), kind, JobAttr::new(force, false));
        let mut jobs = self.jobs.borrow_mut();
        let list = jobs.entry(Rc::clone(unit)).or_insert_with(Vec::new);
        // the newest job leads the unit's list
        list.insert(0, Rc::clone(&job));
        (job, true)
    }

    fn remove_job(&self, job: &Rc<Job>) {
        let mut jobs = self.jobs.borrow_mut();
        let mut now_empty = false;
        if let Some(list) = jobs.get_mut(job.unit().as_ref()) {
            list.retain(|j| !Rc::ptr_eq(j, job));
            now_empty = list.is_empty();
        }
        if now_empty {
            jobs.remove(job.unit().as_ref());
        }
        drop(jobs);

        let anchored = match self.anchor.borrow().as_ref() {
            Some(anchor) => Rc::ptr_eq(anchor, job),
            None => false,
        };
        if anchored {
            *self.anchor.borrow_mut() = None;
        }
    }
}

/// Flags steering one builder call
#[derive(Clone, Copy, Debug)]
pub struct TransAddFlags {
    /// the inbound link marks the pulled job as essential to its puller
    pub matters: bool,
    /// the request carries the force-through flavor
    pub force: bool,
    /// the inbound link records a conflict pull
    pub conflicts: bool,
    /// suppress recursive expansion
    pub ignore_requirements: bool,
    /// created jobs opt out of ordering
    pub ignore_order: bool,
}

impl TransAddFlags {
    /// Flags of a plain client request.
    pub fn new(matters: bool, force: bool) -> TransAddFlags {
        TransAddFlags {
            matters,
            force,
            conflicts: false,
            ignore_requirements: false,
            ignore_order: false,
        }
    }
}

/// What a dependency edge contributes to the expansion of one request kind.
#[derive(Clone, Copy)]
struct ExpandRule {
    relation: UnitRelations,
    target: ExpandTarget,
    matters: ExpandMatters,
    conflicts: bool,
    pass_force: bool,
    fatal: bool,
}

#[derive(Clone, Copy)]
enum ExpandTarget {
    Kind(JobKind),
    Request,
}

#[derive(Clone, Copy)]
enum ExpandMatters {
    Yes,
    No,
    UnlessForce,
}

const EXPAND_PULL_IN_START: &[ExpandRule] = &[
    ExpandRule {
        relation: UnitRelations::UnitRequires,
        target: ExpandTarget::Kind(JobKind::Start),
        matters: ExpandMatters::Yes,
        conflicts: false,
        pass_force: true,
        fatal: true,
    },
    ExpandRule {
        relation: UnitRelations::UnitBindsTo,
        target: ExpandTarget::Kind(JobKind::Start),
        matters: ExpandMatters::Yes,
        conflicts: false,
        pass_force: true,
        fatal: true,
    },
    ExpandRule {
        relation: UnitRelations::UnitRequiresOverridable,
        target: ExpandTarget::Kind(JobKind::Start),
        matters: ExpandMatters::UnlessForce,
        conflicts: false,
        pass_force: true,
        fatal: false,
    },
    ExpandRule {
        relation: UnitRelations::UnitWants,
        target: ExpandTarget::Kind(JobKind::Start),
        matters: ExpandMatters::No,
        conflicts: false,
        pass_force: false,
        fatal: false,
    },
    ExpandRule {
        relation: UnitRelations::UnitRequisite,
        target: ExpandTarget::Kind(JobKind::VerifyActive),
        matters: ExpandMatters::Yes,
        conflicts: false,
        pass_force: true,
        fatal: true,
    },
    ExpandRule {
        relation: UnitRelations::UnitRequisiteOverridable,
        target: ExpandTarget::Kind(JobKind::VerifyActive),
        matters: ExpandMatters::UnlessForce,
        conflicts: false,
        pass_force: true,
        fatal: false,
    },
    ExpandRule {
        relation: UnitRelations::UnitConflicts,
        target: ExpandTarget::Kind(JobKind::Stop),
        matters: ExpandMatters::Yes,
        conflicts: true,
        pass_force: true,
        fatal: true,
    },
    ExpandRule {
        relation: UnitRelations::UnitConflictedBy,
        target: ExpandTarget::Kind(JobKind::Stop),
        matters: ExpandMatters::No,
        conflicts: false,
        pass_force: true,
        fatal: false,
    },
];

const EXPAND_PROPAGATE_STOP: &[ExpandRule] = &[
    ExpandRule {
        relation: UnitRelations::UnitRequiredBy,
        target: ExpandTarget::Request,
        matters: ExpandMatters::Yes,
        conflicts: false,
        pass_force: true,
        fatal: true,
    },
    ExpandRule {
        relation: UnitRelations::UnitBoundBy,
        target: ExpandTarget::Request,
        matters: ExpandMatters::Yes,
        conflicts: false,
        pass_force: true,
        fatal: true,
    },
];

const EXPAND_PROPAGATE_RELOAD: &[ExpandRule] = &[ExpandRule {
    relation: UnitRelations::UnitPropagatesReloadTo,
    target: ExpandTarget::Kind(JobKind::Reload),
    matters: ExpandMatters::No,
    conflicts: false,
    pass_force: true,
    fatal: false,
}];

fn expand_rule_sets(kind: JobKind) -> &'static [&'static [ExpandRule]] {
    match kind {
        JobKind::Start => &[EXPAND_PULL_IN_START],
        JobKind::ReloadOrStart => &[EXPAND_PULL_IN_START, EXPAND_PROPAGATE_RELOAD],
        JobKind::Stop | JobKind::Restart | JobKind::TryRestart => &[EXPAND_PROPAGATE_STOP],
        JobKind::Reload => &[EXPAND_PROPAGATE_RELOAD],
        JobKind::VerifyActive => &[],
    }
}

/// Adds the requested job and, transitively, a job for every affected unit.
/// With no puller the job becomes the transaction's anchor; a transaction has
/// exactly one. On success every transitively required job exists; on failure
/// the caller reverts the partial expansion via [`Transaction::abort`].
pub fn job_trans_add_and_deps(
    tr: &Transaction,
    ja: &JobAlloc,
    db: &UnitDb,
    config: &JobConf,
    by: Option<&Rc<Job>>,
    flags: &TransAddFlags,
) -> Result<()> {
    let unit = config.get_unit();
    let kind = config.get_kind();

    trans_add_check_input(unit, kind)?;

    // record
    let (job, is_new) = tr.find_or_create(ja, unit, kind, flags.force);
    job.or_ignore_order(flags.ignore_order);

    // link to the puller, or become the anchor
    match by {
        Some(puller) => {
            JobDependency::new(puller, &job, flags.matters, flags.conflicts);
        }
        None => {
            assert!(tr.anchor().is_none());
            tr.set_anchor(&job);
        }
    }

    if !is_new || flags.ignore_requirements {
        return Ok(());
    }

    // everybody following this unit replicates the request, non-essentially
    for other in db.following_set(unit).iter() {
        let conf = JobConf::new(other, kind);
        let sub = TransAddFlags {
            matters: false,
            force: flags.force,
            conflicts: false,
            ignore_requirements: false,
            ignore_order: flags.ignore_order,
        };
        if let Err(err) = job_trans_add_and_deps(tr, ja, db, &conf, Some(&job), &sub) {
            log::warn!(
                "Cannot add follower job for unit {}, ignoring: {}",
                other.id(),
                err
            );
        }
    }

    // pull in the dependencies, per the table for this kind
    for rules in expand_rule_sets(kind).iter() {
        for rule in rules.iter() {
            for other in db.dep_gets(unit, rule.relation).iter() {
                let dep_kind = match rule.target {
                    ExpandTarget::Kind(k) => k,
                    ExpandTarget::Request => kind,
                };
                let conf = JobConf::new(other, dep_kind);
                let sub = TransAddFlags {
                    matters: match rule.matters {
                        ExpandMatters::Yes => true,
                        ExpandMatters::No => false,
                        ExpandMatters::UnlessForce => !flags.force,
                    },
                    force: rule.pass_force && flags.force,
                    conflicts: rule.conflicts,
                    ignore_requirements: false,
                    ignore_order: flags.ignore_order,
                };
                if let Err(err) = job_trans_add_and_deps(tr, ja, db, &conf, Some(&job), &sub) {
                    // an inapplicable dependency never aborts the outer request
                    if rule.fatal && !matches!(err, Error::JobTypeNotApplicable { .. }) {
                        return Err(err);
                    }
                    log::warn!(
                        "Cannot add dependency job for unit {}, ignoring: {}",
                        other.id(),
                        err
                    );
                }
            }
        }
    }

    Ok(())
    // jobs left over from a failing expansion are reverted by the up-level caller uniformly
}

/// Prepares a stop for every loaded unit that is running or busy and not yet
/// part of the transaction. Units marked ignore-on-isolate are spared.
pub fn job_trans_add_isolate(tr: &Transaction, ja: &JobAlloc, db: &UnitDb) -> Result<()> {
    let anchor = match tr.anchor() {
        Some(a) => a,
        None => return Err(Error::Internal),
    };

    for other in db.units_get_all().iter() {
        if other.load_state() != UnitLoadState::Loaded {
            continue;
        }

        // it is allowed not to be affected by isolation
        if other.ignore_on_isolate() {
            continue;
        }

        // no need to stop inactive units carrying no job
        if other.active_state().is_inactive_or_failed() && other.job().is_none() {
            continue;
        }

        // there is something assigned, not affected
        if tr.contains_unit(other) {
            continue;
        }

        let conf = JobConf::new(other, JobKind::Stop);
        let flags = TransAddFlags::new(true, false);
        if let Err(err) = job_trans_add_and_deps(tr, ja, db, &conf, Some(&anchor), &flags) {
            log::warn!(
                "Cannot add isolate job for unit {}, ignoring: {}",
                other.id(),
                err
            );
        }
    }

    Ok(())
}

fn trans_add_check_input(unit: &UnitX, kind: JobKind) -> Result<()> {
    let load_state = unit.load_state();
    if !matches!(
        load_state,
        UnitLoadState::Loaded | UnitLoadState::Error | UnitLoadState::Masked
    ) {
        return Err(Error::LoadFailed { unit: unit.id() });
    }

    if kind != JobKind::Stop && load_state == UnitLoadState::Error {
        return Err(Error::LoadFailed { unit: unit.id() });
    }

    if kind != JobKind::Stop && load_state == UnitLoadState::Masked {
        return Err(Error::Masked { unit: unit.id() });
    }

    if !job_kind_is_applicable(unit, kind) {
        return Err(Error::JobTypeNotApplicable {
            kind: format!("{:?}", kind),
            unit: unit.id(),
        });
    }

    Ok(())
}

/// Deletes one job from the transaction. An uninstalled job dies with its
/// last reference.
pub(super) fn job_trans_delete_job(tr: &Transaction, job: &Rc<Job>, delete_dependencies: bool) {
    job_trans_unlink_job(tr, job, delete_dependencies);
}

/// Takes the job out of the transaction and destroys its links. Jobs that
/// existed only to serve this one go away with it when requested.
pub(super) fn job_trans_unlink_job(tr: &Transaction, job: &Rc<Job>, delete_dependencies: bool) {
    tr.remove_job(job);

    // links where we pull: just unthread them
    loop {
        let link = match job.subject_pop() {
            Some(l) => l,
            None => break,
        };
        if let Some(object) = link.object() {
            object.object_remove(&link);
        }
    }

    // links where we are pulled: our essential pullers cannot stay
    loop {
        let link = match job.object_pop() {
            Some(l) => l,
            None => break,
        };
        let other = match link.matters() {
            true => link.subject(),
            false => None,
        };
        if let Some(subject) = link.subject() {
            subject.subject_remove(&link);
        }
        if delete_dependencies {
            if let Some(other) = other {
                log::debug!(
                    "Deleting job {}/{:?} as dependency of job {}/{:?}",
                    other.unit().id(),
                    other.kind(),
                    job.unit().id(),
                    job.kind()
                );
                job_trans_delete_job(tr, &other, delete_dependencies);
            }
        }
    }
}

/// Deletes all jobs of one unit from the transaction.
pub(super) fn job_trans_delete_unit(tr: &Transaction, unit: &Rc<UnitX>) {
    loop {
        let job = match tr.head(unit) {
            Some(j) => j,
            None => break,
        };
        job_trans_delete_job(tr, &job, true);
    }
}
