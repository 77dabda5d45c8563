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

use super::dependency::JobDependency;
use super::kind::{JobAttr, JobKind};
use crate::unit::UnitX;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// How a job left the live set
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum JobResult {
    ///
    Done,
    /// removed by an isolate sweep
    Cancelled,
    /// replaced by a conflicting installed job
    Superseded,
    /// a job it depended on went away without finishing
    Dependency,
    ///
    Failed,
}

/// Input of one request: which unit, which operation.
#[derive(Clone)]
pub struct JobConf {
    unit: Rc<UnitX>,
    kind: JobKind,
}

impl JobConf {
    ///
    pub fn new(unitr: &Rc<UnitX>, kind: JobKind) -> JobConf {
        JobConf {
            unit: Rc::clone(unitr),
            kind,
        }
    }

    pub(crate) fn get_unit(&self) -> &Rc<UnitX> {
        &self.unit
    }

    pub(crate) fn get_kind(&self) -> JobKind {
        self.kind
    }
}

/// Read-only snapshot of a job, safe to hand to callers.
#[derive(Clone)]
pub struct JobInfo {
    ///
    pub id: u128,
    ///
    pub unit: Rc<UnitX>,
    ///
    pub kind: JobKind,
    ///
    pub attr: JobAttr,
}

impl fmt::Debug for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("unit", &self.unit.id())
            .field("kind", &self.kind)
            .field("attr", &self.attr)
            .finish()
    }
}

impl JobInfo {
    pub(super) fn map(job: &Job) -> JobInfo {
        JobInfo {
            id: job.id(),
            unit: Rc::clone(job.unit()),
            kind: job.kind(),
            attr: job.attr(),
        }
    }
}

/// One pending operation on one unit. Owned by a transaction until the
/// applier moves it into the manager's live set; the scratch fields belong to
/// whichever graph traversal is currently running.
pub(crate) struct Job {
    // data
    /* config: input */
    id: u128,
    unit: Rc<UnitX>,
    kind: Cell<JobKind>,
    attr: RefCell<JobAttr>,

    /* status */
    installed: Cell<bool>,
    in_rqueue: Cell<bool>,

    /* reconciliation scratch */
    matters_to_anchor: Cell<bool>,
    generation: Cell<u32>,
    marker: RefCell<Option<Weak<Job>>>,

    /* links: this job pulls others (subject) / is pulled (object) */
    subject_list: RefCell<Vec<Rc<JobDependency>>>,
    object_list: RefCell<Vec<Rc<JobDependency>>>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {
    // nothing
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("unit", &self.unit.id())
            .field("kind", &self.kind.get())
            .field("attr", &self.attr)
            .field("installed", &self.installed.get())
            .finish()
    }
}

impl Job {
    pub(super) fn new(id: u128, unit: Rc<UnitX>, kind: JobKind, attr: JobAttr) -> Job {
        Job {
            id,
            unit,
            kind: Cell::new(kind),
            attr: RefCell::new(attr),
            installed: Cell::new(false),
            in_rqueue: Cell::new(false),
            matters_to_anchor: Cell::new(false),
            generation: Cell::new(0),
            marker: RefCell::new(None),
            subject_list: RefCell::new(Vec::new()),
            object_list: RefCell::new(Vec::new()),
        }
    }

    pub(super) fn id(&self) -> u128 {
        self.id
    }

    pub(super) fn unit(&self) -> &Rc<UnitX> {
        &self.unit
    }

    pub(super) fn kind(&self) -> JobKind {
        self.kind.get()
    }

    pub(super) fn set_kind(&self, kind: JobKind) {
        self.kind.set(kind);
    }

    pub(super) fn attr(&self) -> JobAttr {
        self.attr.borrow().clone()
    }

    pub(super) fn merge_attr(&self, other: &JobAttr) {
        self.attr.borrow_mut().or(other);
    }

    pub(super) fn or_ignore_order(&self, ignore_order: bool) {
        self.attr.borrow_mut().ignore_order |= ignore_order;
    }

    pub(super) fn is_installed(&self) -> bool {
        self.installed.get()
    }

    pub(super) fn set_installed(&self) {
        self.installed.set(true);
    }

    pub(super) fn clear_installed(&self) {
        self.installed.set(false);
    }

    pub(super) fn in_rqueue(&self) -> bool {
        self.in_rqueue.get()
    }

    pub(super) fn set_in_rqueue(&self, v: bool) {
        self.in_rqueue.set(v);
    }

    pub(super) fn matters_to_anchor(&self) -> bool {
        self.matters_to_anchor.get()
    }

    pub(super) fn set_matters_to_anchor(&self, v: bool) {
        self.matters_to_anchor.set(v);
    }

    pub(super) fn generation(&self) -> u32 {
        self.generation.get()
    }

    pub(super) fn set_generation(&self, generation: u32) {
        self.generation.set(generation);
    }

    pub(super) fn marker(&self) -> Option<Rc<Job>> {
        match self.marker.borrow().as_ref() {
            Some(weak) => weak.upgrade(),
            None => None,
        }
    }

    pub(super) fn set_marker(&self, marker: Option<&Rc<Job>>) {
        *self.marker.borrow_mut() = marker.map(Rc::downgrade);
    }

    pub(super) fn subject_push(&self, link: Rc<JobDependency>) {
        self.subject_list.borrow_mut().push(link);
    }

    pub(super) fn subject_pop(&self) -> Option<Rc<JobDependency>> {
        self.subject_list.borrow_mut().pop()
    }

    pub(super) fn subject_remove(&self, link: &Rc<JobDependency>) {
        self.subject_list
            .borrow_mut()
            .retain(|l| !Rc::ptr_eq(l, link));
    }

    pub(super) fn subject_links(&self) -> Vec<Rc<JobDependency>> {
        self.subject_list.borrow().iter().map(Rc::clone).collect()
    }

    pub(super) fn object_push(&self, link: Rc<JobDependency>) {
        self.object_list.borrow_mut().push(link);
    }

    pub(super) fn object_pop(&self) -> Option<Rc<JobDependency>> {
        self.object_list.borrow_mut().pop()
    }

    pub(super) fn object_remove(&self, link: &Rc<JobDependency>) {
        self.object_list
            .borrow_mut()
            .retain(|l| !Rc::ptr_eq(l, link));
    }

    pub(super) fn object_list_is_empty(&self) -> bool {
        self.object_list.borrow().is_empty()
    }

    /// True if at least one inbound link stems from a conflicting unit.
    pub(super) fn is_conflicted_by(&self) -> bool {
        self.object_list.borrow().iter().any(|l| l.conflicts())
    }
}
