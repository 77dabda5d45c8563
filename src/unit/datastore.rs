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

use super::deps::{unit_relation_to_inverse, UnitRelations};
use super::entry::UnitX;
use crate::error::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The unit registry the engine runs against: all loaded units by name, the
/// typed dependency multimap, and the follower-replication table. The job
/// engine only ever reads it.
pub struct UnitDb {
    // owned objects
    // key: unit-name, value: unit
    t_units: RefCell<HashMap<String, Rc<UnitX>>>,
    t_deps: RefCell<UnitDepData>,
    // key: leader, value: units replicating the leader's jobs
    t_following: RefCell<HashMap<Rc<UnitX>, Vec<Rc<UnitX>>>>,
}

impl Default for UnitDb {
    fn default() -> Self {
        UnitDb::new()
    }
}

impl UnitDb {
    ///
    pub fn new() -> UnitDb {
        UnitDb {
            t_units: RefCell::new(HashMap::new()),
            t_deps: RefCell::new(UnitDepData::new()),
            t_following: RefCell::new(HashMap::new()),
        }
    }

    ///
    pub fn units_insert(&self, name: String, unit: Rc<UnitX>) -> Option<Rc<UnitX>> {
        self.t_units.borrow_mut().insert(name, unit)
    }

    ///
    pub fn units_get(&self, name: &str) -> Option<Rc<UnitX>> {
        self.t_units.borrow().get(name).cloned()
    }

    ///
    pub fn units_get_all(&self) -> Vec<Rc<UnitX>> {
        let mut units = self
            .t_units
            .borrow()
            .values()
            .map(Rc::clone)
            .collect::<Vec<_>>();
        units.sort_by_key(|u| u.id());
        units
    }

    /// Records the edge and its inverse. Self-edges are refused.
    pub fn dep_insert(
        &self,
        source: Rc<UnitX>,
        relation: UnitRelations,
        dest: Rc<UnitX>,
    ) -> Result<()> {
        if source.as_ref() == dest.as_ref() {
            return Err(Error::Input);
        }

        let inverse = unit_relation_to_inverse(relation);
        let mut deps = self.t_deps.borrow_mut();
        deps.insert_one_way(Rc::clone(&source), relation, Rc::clone(&dest));
        deps.insert_one_way(dest, inverse, source);
        Ok(())
    }

    /// All units the source points at through the relation, in insertion order.
    pub fn dep_gets(&self, source: &UnitX, relation: UnitRelations) -> Vec<Rc<UnitX>> {
        self.t_deps.borrow().gets(source, relation)
    }

    ///
    pub fn dep_is_dep_with(&self, source: &UnitX, relation: UnitRelations, dest: &UnitX) -> bool {
        self.t_deps.borrow().is_dep_with(source, relation, dest)
    }

    /// Marks the follower as replicating the leader's requests.
    pub fn following_insert(&self, leader: &Rc<UnitX>, follower: &Rc<UnitX>) -> Result<()> {
        if leader.as_ref() == follower.as_ref() {
            return Err(Error::Input);
        }

        let mut t = self.t_following.borrow_mut();
        let followers = t.entry(Rc::clone(leader)).or_insert_with(Vec::new);
        if !followers.iter().any(|u| u.as_ref() == follower.as_ref()) {
            followers.push(Rc::clone(follower));
        }
        Ok(())
    }

    ///
    pub fn following_set(&self, unit: &UnitX) -> Vec<Rc<UnitX>> {
        match self.t_following.borrow().get(unit) {
            Some(followers) => followers.iter().map(Rc::clone).collect(),
            None => Vec::new(),
        }
    }
}

struct UnitDepData {
    // key: unit-source + relation, value: unit-destination list
    t: HashMap<Rc<UnitX>, HashMap<UnitRelations, Vec<Rc<UnitX>>>>,
}

// the declaration "pub(self)" is for identification only.
impl UnitDepData {
    pub(self) fn new() -> UnitDepData {
        UnitDepData { t: HashMap::new() }
    }

    pub(self) fn insert_one_way(
        &mut self,
        source: Rc<UnitX>,
        relation: UnitRelations,
        dest: Rc<UnitX>,
    ) {
        let table = self.t.entry(source).or_insert_with(HashMap::new);
        let dests = table.entry(relation).or_insert_with(Vec::new);
        if !dests.iter().any(|u| u.as_ref() == dest.as_ref()) {
            dests.push(dest);
        }
    }

    pub(self) fn gets(&self, source: &UnitX, relation: UnitRelations) -> Vec<Rc<UnitX>> {
        match self.t.get(source).and_then(|table| table.get(&relation)) {
            Some(dests) => dests.iter().map(Rc::clone).collect(),
            None => Vec::new(),
        }
    }

    pub(self) fn is_dep_with(
        &self,
        source: &UnitX,
        relation: UnitRelations,
        dest: &UnitX,
    ) -> bool {
        match self.t.get(source).and_then(|table| table.get(&relation)) {
            Some(dests) => dests.iter().any(|u| u.as_ref() == dest),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::deps::UnitType;
    use super::super::test_utils;
    use super::*;

    #[test]
    fn udb_units_api() {
        let db = UnitDb::new();
        let unit_test1 = test_utils::create_unit("test1.service");
        assert!(db.units_get("test1.service").is_none());
        db.units_insert(unit_test1.id(), Rc::clone(&unit_test1));
        assert!(db.units_get("test1.service").is_some());
        assert_eq!(db.units_get_all().len(), 1);
    }

    #[test]
    fn udb_dep_inserts_inverse() {
        let db = UnitDb::new();
        let unit_test1 = test_utils::create_unit("test1.service");
        let unit_test2 = test_utils::create_unit("test2.service");
        db.dep_insert(
            Rc::clone(&unit_test1),
            UnitRelations::UnitRequires,
            Rc::clone(&unit_test2),
        )
        .unwrap();

        let forward = db.dep_gets(&unit_test1, UnitRelations::UnitRequires);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].id(), "test2.service");

        let backward = db.dep_gets(&unit_test2, UnitRelations::UnitRequiredBy);
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].id(), "test1.service");

        assert!(db.dep_is_dep_with(&unit_test1, UnitRelations::UnitRequires, &unit_test2));
        assert!(!db.dep_is_dep_with(&unit_test2, UnitRelations::UnitRequires, &unit_test1));
    }

    #[test]
    fn udb_dep_refuses_self_edge() {
        let db = UnitDb::new();
        let unit_test1 = test_utils::create_unit("test1.service");
        let ret = db.dep_insert(
            Rc::clone(&unit_test1),
            UnitRelations::UnitConflicts,
            Rc::clone(&unit_test1),
        );
        assert!(ret.is_err());
    }

    #[test]
    fn udb_dep_dedups() {
        let db = UnitDb::new();
        let unit_test1 = test_utils::create_unit("test1.service");
        let unit_test2 = test_utils::create_unit_with_type("test2.target", UnitType::UnitTarget);
        for _ in 0..2 {
            db.dep_insert(
                Rc::clone(&unit_test1),
                UnitRelations::UnitWants,
                Rc::clone(&unit_test2),
            )
            .unwrap();
        }
        assert_eq!(db.dep_gets(&unit_test1, UnitRelations::UnitWants).len(), 1);
    }

    #[test]
    fn udb_following() {
        let db = UnitDb::new();
        let unit_test1 = test_utils::create_unit("test1.service");
        let unit_test2 = test_utils::create_unit("test2.service");
        assert!(db.following_set(&unit_test1).is_empty());
        db.following_insert(&unit_test1, &unit_test2).unwrap();
        db.following_insert(&unit_test1, &unit_test2).unwrap();
        assert_eq!(db.following_set(&unit_test1).len(), 1);
        assert!(db.following_insert(&unit_test1, &unit_test1).is_err());
    }
}
