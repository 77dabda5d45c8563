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

//! Error define. One unified Error is shared by the unit model and the job
//! engine to avoid frequent conversions at the boundary; every rejection a
//! client can observe is a dedicated variant.

use snafu::prelude::*;

/// jobtrans Error
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    /// The unit's definition could not be loaded and the request is not a stop.
    #[snafu(display("unit {} is not loaded properly", unit))]
    LoadFailed { unit: String },

    /// The unit is masked and the request is not a stop.
    #[snafu(display("unit {} is masked", unit))]
    Masked { unit: String },

    /// The unit's class does not support the requested operation. Builder
    /// callers that recurse with "log & continue" suppress this one.
    #[snafu(display("job type {} is not applicable for unit {}", kind, unit))]
    JobTypeNotApplicable { kind: String, unit: String },

    /// Two jobs for one unit can neither be merged nor dropped.
    #[snafu(display(
        "transaction contains conflicting jobs {} and {} for {}",
        first,
        second,
        unit
    ))]
    TransactionJobsConflicting {
        first: String,
        second: String,
        unit: String,
    },

    /// The ordering graph is cyclic and no job on the cycle may be dropped.
    #[snafu(display("transaction order is cyclic"))]
    TransactionOrderIsCyclic,

    /// Applying the transaction in fail mode would replace incompatible live jobs.
    #[snafu(display("transaction is destructive"))]
    TransactionIsDestructive,

    /// Job errno
    Input,
    Internal,

    /// Retry signal of the restartable reconciler passes. Never escapes to
    /// callers; the activate loop consumes it.
    Again,
}

/// new Result
pub type Result<T, E = Error> = std::result::Result<T, E>;
