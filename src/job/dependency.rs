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
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Directed edge between two jobs: the subject pulled the object in. Both
/// endpoints hold the link in their lists; the link holds its endpoints
/// weakly so a freed job never stays alive through its edges.
pub(crate) struct JobDependency {
    subject: RefCell<Weak<Job>>,
    object: RefCell<Weak<Job>>,

    /* the object is essential to the subject */
    matters: bool,
    /* the object was pulled in because it conflicts with the subject */
    conflicts: bool,
}

impl JobDependency {
    /// Constructs the link and threads it into both endpoints' lists.
    pub(super) fn new(
        subject: &Rc<Job>,
        object: &Rc<Job>,
        matters: bool,
        conflicts: bool,
    ) -> Rc<JobDependency> {
        let link = Rc::new(JobDependency {
            subject: RefCell::new(Rc::downgrade(subject)),
            object: RefCell::new(Rc::downgrade(object)),
            matters,
            conflicts,
        });
        subject.subject_push(Rc::clone(&link));
        object.object_push(Rc::clone(&link));
        link
    }

    pub(super) fn matters(&self) -> bool {
        self.matters
    }

    pub(super) fn conflicts(&self) -> bool {
        self.conflicts
    }

    pub(super) fn subject(&self) -> Option<Rc<Job>> {
        self.subject.borrow().upgrade()
    }

    pub(super) fn object(&self) -> Option<Rc<Job>> {
        self.object.borrow().upgrade()
    }

    /* merging patches the surviving job in as the new endpoint */
    pub(super) fn set_subject(&self, job: &Rc<Job>) {
        *self.subject.borrow_mut() = Rc::downgrade(job);
    }

    pub(super) fn set_object(&self, job: &Rc<Job>) {
        *self.object.borrow_mut() = Rc::downgrade(job);
    }

    /// Removes the link from both endpoints' lists.
    pub(super) fn free(link: &Rc<JobDependency>) {
        if let Some(subject) = link.subject() {
            subject.subject_remove(link);
        }
        if let Some(object) = link.object() {
            object.object_remove(link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::kind::{JobAttr, JobKind};
    use super::*;
    use crate::unit::test_utils;

    fn create_job(id: u128, name: &str, kind: JobKind) -> Rc<Job> {
        let unit = test_utils::create_unit(name);
        Rc::new(Job::new(id, unit, kind, JobAttr::new(false, false)))
    }

    #[test]
    fn jd_new_threads_both_lists() {
        let subject = create_job(0, "test1.service", JobKind::Start);
        let object = create_job(1, "test2.service", JobKind::Start);

        let link = JobDependency::new(&subject, &object, true, false);
        assert_eq!(subject.subject_links().len(), 1);
        assert!(!object.object_list_is_empty());
        assert!(Rc::ptr_eq(&link.subject().unwrap(), &subject));
        assert!(Rc::ptr_eq(&link.object().unwrap(), &object));
        assert!(link.matters());
        assert!(!link.conflicts());
    }

    #[test]
    fn jd_free_unthreads_both_lists() {
        let subject = create_job(0, "test1.service", JobKind::Start);
        let object = create_job(1, "test2.service", JobKind::Stop);

        let link = JobDependency::new(&subject, &object, true, true);
        JobDependency::free(&link);
        assert!(subject.subject_links().is_empty());
        assert!(object.object_list_is_empty());
    }

    #[test]
    fn jd_conflicted_by() {
        let subject = create_job(0, "test1.service", JobKind::Start);
        let object = create_job(1, "test2.service", JobKind::Stop);

        let _link = JobDependency::new(&subject, &object, true, true);
        assert!(object.is_conflicted_by());
        assert!(!subject.is_conflicted_by());
    }
}
