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

//! The transaction engine. The module contains:
//!
//! `[alloc]`: the job allocator; ids stay unique across transactions and the
//! live set.
//!
//! `[dependency]`: the typed link between two jobs of one transaction.
//!
//! `[entry]`: the job itself, one pending operation on one unit.
//!
//! `[kind]`: the operations and the algebra over them (merge lattice,
//! redundancy, subsumption, applicability).
//!
//! `[manager]`: the facade; executes requests against the live set and feeds
//! the hand-off queues.
//!
//! `[reconcile]`: the passes that rewrite a built transaction until it is
//! consistent.
//!
//! `[table]`: the live job set, at most one installed job per unit.
//!
//! `[transaction]`: the pending job set of one request and its builder.

pub use alloc::JobAlloc;
pub use entry::{JobConf, JobInfo, JobResult};
pub use kind::{JobAttr, JobKind, JobMode};
pub use manager::{JobAffect, JobBusEvent, JobManager};
pub use stat::JobStatSnapshot;
pub use transaction::{
    job_trans_add_and_deps, job_trans_add_isolate, TransAddFlags, Transaction,
};

pub(crate) use entry::Job;

mod alloc;
mod dependency;
mod entry;
mod kind;
mod manager;
mod reconcile;
mod stat;
mod table;
mod transaction;
