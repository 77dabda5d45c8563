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
use super::entry::UnitX;
use std::rc::Rc;

pub(crate) fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn create_unit(name: &str) -> Rc<UnitX> {
    log_init();
    Rc::new(UnitX::new(name, UnitType::UnitService))
}

pub(crate) fn create_unit_with_type(name: &str, unit_type: UnitType) -> Rc<UnitX> {
    log_init();
    Rc::new(UnitX::new(name, unit_type))
}
