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

//! The unit model the job engine runs against. The module contains:
//!
//! `[datastore]`: the registry of loaded units, their typed dependency edges
//! and the follower-replication table.
//!
//! `[deps]`: the dependency relations and unit classes.
//!
//! `[entry]`: the unit object itself, with the states and capability gates
//! the engine reads and the published pointer to its installed job.
//!
//! `[state]`: the load and active state machines.

pub use datastore::UnitDb;
pub use deps::{UnitRelations, UnitType};
pub use entry::UnitX;
pub use state::{UnitActiveState, UnitLoadState};

mod datastore;
mod deps;
mod entry;
mod state;
#[cfg(test)]
pub(crate) mod test_utils;
