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

use super::entry::Job;
use super::kind::{JobAttr, JobKind};
use crate::unit::UnitX;
use std::cell::RefCell;
use std::rc::Rc;

/// Allocates jobs with ids that stay unique for the allocator's lifetime.
/// One allocator serves both the transactions and the live set; the live
/// table is keyed by these ids.
pub struct JobAlloc {
    // owned objects
    data: RefCell<JobAllocData>,
}

impl Default for JobAlloc {
    fn default() -> Self {
        JobAlloc::new()
    }
}

impl JobAlloc {
    ///
    pub fn new() -> JobAlloc {
        JobAlloc {
            data: RefCell::new(JobAllocData::new()),
        }
    }

    pub(super) fn alloc(&self, unit: Rc<UnitX>, kind: JobKind, attr: JobAttr) -> Rc<Job> {
        self.data.borrow_mut().alloc(unit, kind, attr)
    }
}

#[derive(Debug)]
struct JobAllocData {
    // status
    last_id: u128,
}

// the declaration "pub(self)" is for identification only.
impl JobAllocData {
    pub(self) fn new() -> JobAllocData {
        JobAllocData { last_id: 0 }
    }

    pub(self) fn alloc(&mut self, unit: Rc<UnitX>, kind: JobKind, attr: JobAttr) -> Rc<Job> {
        Rc::new(Job::new(self.alloc_id(), unit, kind, attr))
    }

    fn alloc_id(&mut self) -> u128 {
        let id = self.last_id;
        self.last_id += 1;
        id
    }
}
