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

use super::deps::UnitType;
use super::state::{UnitActiveState, UnitLoadState};
use crate::job::Job;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// A unit as the job engine sees it: an identity, the two state machines the
/// engine reads, the per-class capability gates, and the published pointer to
/// the unit's currently installed job. The engine never writes anything else.
pub struct UnitX {
    // key: input
    id: String,
    unit_type: UnitType,

    // config
    can_start: Cell<bool>,
    can_stop: Cell<bool>,
    can_reload: Cell<bool>,
    ignore_on_isolate: Cell<bool>,
    job_timeout_usec: Cell<u64>,

    // status
    load_state: Cell<UnitLoadState>,
    active_state: Cell<UnitActiveState>,

    /* the currently installed job, published by the job engine */
    job: RefCell<Weak<Job>>,
}

impl PartialEq for UnitX {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UnitX {
    // nothing
}

impl Hash for UnitX {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for UnitX {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitX")
            .field("id", &self.id)
            .field("unit_type", &self.unit_type)
            .field("load_state", &self.load_state.get())
            .field("active_state", &self.active_state.get())
            .finish()
    }
}

impl UnitX {
    /// Creates a unit of the given class with the class's capability
    /// defaults, loaded and inactive.
    pub fn new(name: &str, unit_type: UnitType) -> UnitX {
        let can_reload = matches!(unit_type, UnitType::UnitService | UnitType::UnitMount);
        UnitX {
            id: String::from(name),
            unit_type,
            can_start: Cell::new(true),
            can_stop: Cell::new(true),
            can_reload: Cell::new(can_reload),
            ignore_on_isolate: Cell::new(false),
            job_timeout_usec: Cell::new(0),
            load_state: Cell::new(UnitLoadState::Loaded),
            active_state: Cell::new(UnitActiveState::InActive),
            job: RefCell::new(Weak::new()),
        }
    }

    ///
    pub fn id(&self) -> String {
        self.id.clone()
    }

    ///
    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    ///
    pub fn load_state(&self) -> UnitLoadState {
        self.load_state.get()
    }

    ///
    pub fn set_load_state(&self, state: UnitLoadState) {
        self.load_state.set(state);
    }

    ///
    pub fn active_state(&self) -> UnitActiveState {
        self.active_state.get()
    }

    ///
    pub fn set_active_state(&self, state: UnitActiveState) {
        self.active_state.set(state);
    }

    ///
    pub fn can_start(&self) -> bool {
        self.can_start.get()
    }

    ///
    pub fn set_can_start(&self, v: bool) {
        self.can_start.set(v);
    }

    ///
    pub fn can_stop(&self) -> bool {
        self.can_stop.get()
    }

    ///
    pub fn set_can_stop(&self, v: bool) {
        self.can_stop.set(v);
    }

    ///
    pub fn can_reload(&self) -> bool {
        self.can_reload.get()
    }

    ///
    pub fn set_can_reload(&self, v: bool) {
        self.can_reload.set(v);
    }

    ///
    pub fn ignore_on_isolate(&self) -> bool {
        self.ignore_on_isolate.get()
    }

    ///
    pub fn set_ignore_on_isolate(&self, v: bool) {
        self.ignore_on_isolate.set(v);
    }

    /// Time budget for one job on this unit, in micro-seconds. 0 disables the timer.
    pub fn job_timeout_usec(&self) -> u64 {
        self.job_timeout_usec.get()
    }

    ///
    pub fn set_job_timeout_usec(&self, usec: u64) {
        self.job_timeout_usec.set(usec);
    }

    /// The unit's currently installed job, if any.
    pub(crate) fn job(&self) -> Option<Rc<Job>> {
        self.job.borrow().upgrade()
    }

    pub(crate) fn bind_job(&self, job: &Rc<Job>) {
        *self.job.borrow_mut() = Rc::downgrade(job);
    }

    pub(crate) fn unbind_job(&self, job: &Rc<Job>) {
        let bound = self.job.borrow().upgrade();
        if let Some(cur) = bound {
            if Rc::ptr_eq(&cur, job) {
                *self.job.borrow_mut() = Weak::new();
            }
        }
    }
}
