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
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Cumulative counters over the live set's history.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct JobStatSnapshot {
    /// jobs moved into the live set
    pub add: u64,
    /// jobs that left the live set
    pub del: u64,
    /// live jobs updated in place by a merge
    pub update: u64,
}

#[derive(Debug)]
pub(super) struct JobStat {
    data: RefCell<JobStatData>,
}

impl JobStat {
    pub(super) fn new() -> JobStat {
        JobStat {
            data: RefCell::new(JobStatData::new()),
        }
    }

    #[allow(clippy::type_complexity)]
    pub(super) fn update_changes(&self, changes: &(&Vec<Rc<Job>>, &Vec<Rc<Job>>, &Vec<Rc<Job>>)) {
        self.data.borrow_mut().update_changes(changes)
    }

    pub(super) fn snapshot(&self) -> JobStatSnapshot {
        self.data.borrow().cnt
    }
}

#[derive(Debug)]
struct JobStatData {
    cnt: JobStatSnapshot, // history
}

// the declaration "pub(self)" is for identification only.
impl JobStatData {
    pub(self) fn new() -> JobStatData {
        JobStatData {
            cnt: JobStatSnapshot::default(),
        }
    }

    #[allow(clippy::type_complexity)]
    pub(self) fn update_changes(
        &mut self,
        changes: &(&Vec<Rc<Job>>, &Vec<Rc<Job>>, &Vec<Rc<Job>>),
    ) {
        let (adds, dels, updates) = changes;
        self.cnt.add = self.cnt.add.saturating_add(adds.len() as u64);
        self.cnt.del = self.cnt.del.saturating_add(dels.len() as u64);
        self.cnt.update = self.cnt.update.saturating_add(updates.len() as u64);
    }
}
