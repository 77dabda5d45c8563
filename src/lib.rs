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

//! jobtrans is the transaction engine of a unit manager: it takes one
//! request ("start this unit", "isolate that one"), expands it over the unit
//! dependency graph into a transaction of pending jobs, reconciles that
//! transaction against the currently installed jobs, and installs the
//! outcome atomically.
//!
//! A request travels through three stages:
//!
//! 1. the builder ([`job::job_trans_add_and_deps`]) creates a job for every
//!    transitively affected unit and links it to its puller;
//! 2. the reconciler marks the jobs the request genuinely needs, drops the
//!    rest where allowed, breaks ordering cycles, and collapses each unit's
//!    jobs into one;
//! 3. the applier moves the survivors into the live set, all or nothing, and
//!    hands them to the run, timer and bus queues.
//!
//! [`job::JobManager::exec`] drives all three for one request. The engine is
//! single-threaded and performs no I/O; the owning manager serializes calls.

pub mod error;
pub mod job;
pub mod unit;
