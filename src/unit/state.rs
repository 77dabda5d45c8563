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

//! The states of a unit the job engine reads: how far the definition got
//! loaded, and where the unit currently is in its activation life cycle.

/// Active state of a unit
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnitActiveState {
    /// unit is activated
    Active,
    /// unit is in reloading
    Reloading,
    /// unit is not active
    InActive,
    /// unit action is failed
    Failed,
    /// unit is in starting
    Activating,
    /// unit is in stopping
    DeActivating,
    /// unit is in maintenance
    Maintenance,
}

impl UnitActiveState {
    ///
    pub fn is_active_or_reloading(&self) -> bool {
        matches!(self, UnitActiveState::Active | UnitActiveState::Reloading)
    }

    ///
    pub fn is_inactive_or_failed(&self) -> bool {
        matches!(self, UnitActiveState::InActive | UnitActiveState::Failed)
    }

    ///
    pub fn is_active_or_activating(&self) -> bool {
        matches!(
            self,
            UnitActiveState::Active | UnitActiveState::Reloading | UnitActiveState::Activating
        )
    }
}

/// Load state of a unit
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnitLoadState {
    /// the unit definition has not been loaded yet
    Stub,
    /// the unit definition is loaded and usable
    Loaded,
    /// no definition exists for the unit
    NotFound,
    /// loading the unit definition failed
    Error,
    /// the unit is administratively masked
    Masked,
}
