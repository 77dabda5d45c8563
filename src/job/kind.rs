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

//! The operations a job can carry, and the algebra over them: the merge
//! lattice, the redundancy and subsumption tests, and the per-class
//! applicability gate.

use crate::unit::{UnitActiveState, UnitX};
use serde::{Deserialize, Serialize};

/// Operation a job performs on its unit
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum JobKind {
    // 'type' is better, but it's keyword in rust
    ///
    Start,
    /// check that the unit is active, start nothing
    VerifyActive,
    ///
    Stop,
    ///
    Reload,
    ///
    Restart,
    /// restart only if the unit is running
    TryRestart,
    /// reload if running, start otherwise
    ReloadOrStart,
}

/// How a request treats what is already installed
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobMode {
    /// refuse the request if it would disturb running services or pending jobs
    Fail,
    /// replace conflicting pending jobs
    Replace,
    /// apply the transaction and stop every unit not in it
    Isolate,
}

/// Flags a job carries beyond its kind
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobAttr {
    /// the request was made with the force-through flavor; overridable
    /// requirement dependencies stop mattering
    pub force: bool,
    /// ordering edges through this job are ignored during cycle checking
    pub ignore_order: bool,
}

impl JobAttr {
    pub(crate) fn new(force: bool, ignore_order: bool) -> JobAttr {
        JobAttr {
            force,
            ignore_order,
        }
    }

    pub(crate) fn or(&mut self, other: &Self) -> &Self {
        self.force |= other.force;
        self.ignore_order |= other.ignore_order;
        self
    }
}

/// The least upper bound of two kinds on one unit, or None if they collide.
/// Merging is commutative and associative; Stop is absorbed by Stop alone.
pub(crate) fn job_kind_merge(a: JobKind, b: JobKind) -> Option<JobKind> {
    use JobKind::*;
    if a == b {
        return Some(a);
    }
    let merged = match (a, b) {
        (Start, VerifyActive) | (VerifyActive, Start) => Start,
        (Start, Reload) | (Reload, Start) => ReloadOrStart,
        (Start, ReloadOrStart) | (ReloadOrStart, Start) => ReloadOrStart,
        (Start, Restart) | (Restart, Start) => Restart,
        (Start, TryRestart) | (TryRestart, Start) => Restart,
        (VerifyActive, Reload) | (Reload, VerifyActive) => Reload,
        (VerifyActive, ReloadOrStart) | (ReloadOrStart, VerifyActive) => ReloadOrStart,
        (VerifyActive, Restart) | (Restart, VerifyActive) => Restart,
        (VerifyActive, TryRestart) | (TryRestart, VerifyActive) => TryRestart,
        (Stop, TryRestart) | (TryRestart, Stop) => Stop,
        (Reload, ReloadOrStart) | (ReloadOrStart, Reload) => ReloadOrStart,
        (Reload, Restart) | (Restart, Reload) => Restart,
        (Reload, TryRestart) | (TryRestart, Reload) => TryRestart,
        (ReloadOrStart, Restart) | (Restart, ReloadOrStart) => Restart,
        (ReloadOrStart, TryRestart) | (TryRestart, ReloadOrStart) => Restart,
        (Restart, TryRestart) | (TryRestart, Restart) => Restart,
        _ => return None, // the remaining pairs all collide with Stop
    };
    Some(merged)
}

pub(crate) fn job_kind_is_mergeable(a: JobKind, b: JobKind) -> bool {
    job_kind_merge(a, b).is_some()
}

/// Stop fights everything that is not a stop.
pub(crate) fn job_kind_is_conflicting(a: JobKind, b: JobKind) -> bool {
    (a == JobKind::Stop) != (b == JobKind::Stop)
}

/// Whether applying the kind to a unit in the given state changes nothing.
pub(crate) fn job_kind_is_redundant(kind: JobKind, state: UnitActiveState) -> bool {
    match kind {
        JobKind::Start => state.is_active_or_reloading(),
        JobKind::VerifyActive => state.is_active_or_reloading(),
        JobKind::Stop => state.is_inactive_or_failed(),
        JobKind::Reload => state == UnitActiveState::Reloading,
        JobKind::ReloadOrStart => state == UnitActiveState::Reloading,
        JobKind::Restart => state == UnitActiveState::Activating,
        JobKind::TryRestart => state == UnitActiveState::Activating,
    }
}

/// Whether executing `a` subsumes executing `b`.
pub(crate) fn job_kind_is_superset(a: JobKind, b: JobKind) -> bool {
    use JobKind::*;
    if a == b {
        return true;
    }
    match a {
        Start => b == VerifyActive,
        Reload => b == VerifyActive,
        ReloadOrStart => matches!(b, Reload | Start),
        Restart => matches!(b, Start | VerifyActive | Reload | ReloadOrStart),
        TryRestart => matches!(b, VerifyActive | Reload),
        _ => false,
    }
}

/// Class gate: some unit kinds cannot carry some operations at all.
pub(crate) fn job_kind_is_applicable(unit: &UnitX, kind: JobKind) -> bool {
    match kind {
        JobKind::Start | JobKind::VerifyActive | JobKind::Stop => true,
        JobKind::Restart | JobKind::TryRestart => unit.can_start() && unit.can_stop(),
        JobKind::Reload => unit.can_reload(),
        JobKind::ReloadOrStart => unit.can_reload() && unit.can_start(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{test_utils, UnitType};

    const ALL_KINDS: [JobKind; 7] = [
        JobKind::Start,
        JobKind::VerifyActive,
        JobKind::Stop,
        JobKind::Reload,
        JobKind::Restart,
        JobKind::TryRestart,
        JobKind::ReloadOrStart,
    ];

    #[test]
    fn jk_merge_lattice() {
        assert_eq!(
            job_kind_merge(JobKind::Start, JobKind::VerifyActive),
            Some(JobKind::Start)
        );
        assert_eq!(
            job_kind_merge(JobKind::Start, JobKind::Reload),
            Some(JobKind::ReloadOrStart)
        );
        assert_eq!(
            job_kind_merge(JobKind::Start, JobKind::Restart),
            Some(JobKind::Restart)
        );
        assert_eq!(
            job_kind_merge(JobKind::Reload, JobKind::Restart),
            Some(JobKind::Restart)
        );
        assert_eq!(
            job_kind_merge(JobKind::TryRestart, JobKind::Restart),
            Some(JobKind::Restart)
        );
        assert_eq!(
            job_kind_merge(JobKind::Stop, JobKind::TryRestart),
            Some(JobKind::Stop)
        );
        assert_eq!(job_kind_merge(JobKind::Stop, JobKind::Start), None);
        assert_eq!(job_kind_merge(JobKind::Stop, JobKind::Reload), None);
        assert_eq!(job_kind_merge(JobKind::Stop, JobKind::Restart), None);
    }

    #[test]
    fn jk_merge_is_commutative() {
        for a in ALL_KINDS.iter() {
            for b in ALL_KINDS.iter() {
                assert_eq!(job_kind_merge(*a, *b), job_kind_merge(*b, *a));
                assert_eq!(
                    job_kind_is_mergeable(*a, *b),
                    job_kind_is_mergeable(*b, *a)
                );
            }
        }
    }

    #[test]
    fn jk_stop_absorbed_by_stop_alone() {
        for kind in ALL_KINDS.iter() {
            let merged = job_kind_merge(JobKind::Stop, *kind);
            match kind {
                JobKind::Stop | JobKind::TryRestart => assert_eq!(merged, Some(JobKind::Stop)),
                _ => assert_eq!(merged, None),
            }
        }
    }

    #[test]
    fn jk_conflicting() {
        assert!(job_kind_is_conflicting(JobKind::Stop, JobKind::Start));
        assert!(job_kind_is_conflicting(JobKind::TryRestart, JobKind::Stop));
        assert!(!job_kind_is_conflicting(JobKind::Stop, JobKind::Stop));
        assert!(!job_kind_is_conflicting(JobKind::Start, JobKind::Reload));
    }

    #[test]
    fn jk_redundant() {
        assert!(job_kind_is_redundant(
            JobKind::Start,
            UnitActiveState::Active
        ));
        assert!(job_kind_is_redundant(
            JobKind::VerifyActive,
            UnitActiveState::Reloading
        ));
        assert!(job_kind_is_redundant(
            JobKind::Stop,
            UnitActiveState::InActive
        ));
        assert!(job_kind_is_redundant(JobKind::Stop, UnitActiveState::Failed));
        assert!(!job_kind_is_redundant(
            JobKind::Start,
            UnitActiveState::InActive
        ));
        assert!(!job_kind_is_redundant(
            JobKind::Reload,
            UnitActiveState::Active
        ));
        assert!(!job_kind_is_redundant(
            JobKind::Stop,
            UnitActiveState::Active
        ));
    }

    #[test]
    fn jk_superset() {
        assert!(job_kind_is_superset(JobKind::Start, JobKind::VerifyActive));
        assert!(job_kind_is_superset(
            JobKind::ReloadOrStart,
            JobKind::Reload
        ));
        assert!(job_kind_is_superset(JobKind::ReloadOrStart, JobKind::Start));
        assert!(job_kind_is_superset(JobKind::Restart, JobKind::Start));
        assert!(!job_kind_is_superset(JobKind::VerifyActive, JobKind::Start));
        assert!(!job_kind_is_superset(JobKind::Start, JobKind::Stop));
        assert!(!job_kind_is_superset(JobKind::Stop, JobKind::Start));
    }

    #[test]
    fn jk_applicable() {
        let service = test_utils::create_unit("test1.service");
        assert!(job_kind_is_applicable(&service, JobKind::Reload));
        assert!(job_kind_is_applicable(&service, JobKind::Restart));

        let target = test_utils::create_unit_with_type("test2.target", UnitType::UnitTarget);
        assert!(job_kind_is_applicable(&target, JobKind::Start));
        assert!(job_kind_is_applicable(&target, JobKind::Stop));
        assert!(!job_kind_is_applicable(&target, JobKind::Reload));
        assert!(!job_kind_is_applicable(&target, JobKind::ReloadOrStart));
    }
}
