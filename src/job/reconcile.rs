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

//! Rewrites a built transaction until it is consistent: marks the jobs the
//! anchor depends on, drops what the request does not need, breaks ordering
//! cycles, collapses each unit's jobs into one, and refuses destructive
//! outcomes in fail mode. Every pass restarts its predecessors through the
//! internal again signal.

use super::entry::Job;
use super::kind::{
    job_kind_is_conflicting, job_kind_is_mergeable, job_kind_is_redundant, job_kind_is_superset,
    job_kind_merge, JobKind, JobMode,
};
use super::transaction::{
    job_trans_delete_job, job_trans_delete_unit, Transaction,
};
use crate::error::*;
use crate::unit::{UnitDb, UnitRelations, UnitX};
use std::rc::Rc;

/// Runs the reconciliation passes to a fixed point or a terminal error. On
/// error the transaction is left abandonable via [`Transaction::abort`]; it
/// is never partially rewritten into the live set.
pub(super) fn job_trans_reconcile(tr: &Transaction, db: &UnitDb, mode: JobMode) -> Result<()> {
    let mut generation: u32 = 1;

    // first step: figure out which jobs matter to the anchor
    let anchor = match tr.anchor() {
        Some(a) => a,
        None => return Err(Error::Internal),
    };
    trans_find_matter_to_anchor(&anchor, generation);
    generation += 1;

    // second step: do not stop running services unless we are asked to
    if mode == JobMode::Fail {
        trans_minimize_impact(tr);
    }

    // third step: drop jobs that change nothing
    trans_drop_redundant(tr);

    loop {
        // fourth step: remove unneeded jobs that might be lurking
        if mode != JobMode::Isolate {
            trans_collect_garbage(tr);
        }

        // fifth step: verify order, correct cycles where possible
        match trans_verify_order(tr, db, &mut generation) {
            Ok(()) => break,
            Err(Error::Again) => continue,
            Err(err) => {
                log::warn!(
                    "Requested transaction contains an unfixable cyclic ordering dependency: {}",
                    err
                );
                return Err(err);
            }
        }
    }

    loop {
        // sixth step: merge entries, drop unmergeable ones where possible
        match trans_merge_jobs(tr) {
            Ok(()) => break,
            Err(Error::Again) => {
                // seventh step: an entry got dropped, collect its dependencies
                if mode != JobMode::Isolate {
                    trans_collect_garbage(tr);
                }
            }
            Err(err) => {
                log::warn!("Requested transaction contains unmergeable jobs: {}", err);
                return Err(err);
            }
        }
    }

    // eighth step: merging may have made more jobs redundant
    trans_drop_redundant(tr);

    // ninth step: check whether we can actually apply this
    if mode == JobMode::Fail {
        trans_is_destructive(tr)?;
    }

    Ok(())
}

/// Marks every job reachable from the anchor over paths of mattering links.
/// These are the jobs whose removal would silently alter the requested
/// outcome.
fn trans_find_matter_to_anchor(job: &Rc<Job>, generation: u32) {
    job.set_matters_to_anchor(true);
    job.set_generation(generation);

    for link in job.subject_links().iter() {
        // this link does not matter
        if !link.matters() {
            continue;
        }

        let object = match link.object() {
            Some(o) => o,
            None => continue,
        };

        // this job has already been marked
        if object.generation() == generation {
            continue;
        }

        trans_find_matter_to_anchor(&object, generation);
    }
}

/// Drops non-essential jobs that would stop a running service or disturb a
/// live job.
fn trans_minimize_impact(tr: &Transaction) {
    loop {
        let mut again = false;

        for job in tr.all_jobs().iter() {
            if !tr.contains_job(job) {
                continue;
            }

            // if it matters, we must not drop it
            if job.matters_to_anchor() {
                continue;
            }

            let stops_running_service = job.kind() == JobKind::Stop
                && job.unit().active_state().is_active_or_activating();
            let changes_existing_job = match job.unit().job() {
                Some(uj) => job_kind_is_conflicting(job.kind(), uj.kind()),
                None => false,
            };

            if !stops_running_service && !changes_existing_job {
                continue;
            }

            if stops_running_service {
                log::debug!(
                    "{}/{:?} would stop a running service.",
                    job.unit().id(),
                    job.kind()
                );
            }
            if changes_existing_job {
                log::debug!(
                    "{}/{:?} would change existing job.",
                    job.unit().id(),
                    job.kind()
                );
            }

            log::debug!(
                "Deleting {}/{:?} to minimize impact.",
                job.unit().id(),
                job.kind()
            );
            job_trans_delete_job(tr, job, true);
            again = true;
            break;
        }

        if !again {
            break;
        }
    }
}

/// Drops every unit whose jobs all change nothing. The anchor gets no
/// exemption: a request whose effect the current state already delivers
/// converges to an empty transaction.
fn trans_drop_redundant(tr: &Transaction) {
    loop {
        let mut again = false;

        for unit in tr.units().iter() {
            let list = tr.unit_jobs(unit);
            if list.is_empty() {
                continue;
            }

            let mut changes_something = false;
            for k in list.iter() {
                let noop = k.is_installed()
                    || job_kind_is_redundant(k.kind(), unit.active_state());
                let undisturbing = match unit.job() {
                    Some(uj) => !job_kind_is_conflicting(k.kind(), uj.kind()),
                    None => true,
                };
                if noop && undisturbing {
                    continue;
                }
                changes_something = true;
                break;
            }
            if changes_something {
                continue;
            }

            log::debug!(
                "Found redundant job {}/{:?}, dropping.",
                unit.id(),
                list[0].kind()
            );
            job_trans_delete_job(tr, &list[0], false);
            again = true;
            break;
        }

        if !again {
            break;
        }
    }
}

/// Drops jobs that no other job pulls in anymore.
fn trans_collect_garbage(tr: &Transaction) {
    loop {
        let mut again = false;

        for job in tr.all_jobs().iter() {
            if !tr.contains_job(job) {
                continue;
            }
            if tr.is_anchor(job) || !job.object_list_is_empty() {
                continue;
            }

            log::debug!("Garbage collecting job {}/{:?}", job.unit().id(), job.kind());
            job_trans_delete_job(tr, job, true);
            again = true;
            break;
        }

        if !again {
            break;
        }
    }
}

/// Checks whether at least one of the unit's jobs matters to the anchor.
fn unit_matters_to_anchor(tr: &Transaction, unit: &UnitX) -> bool {
    tr.unit_jobs(unit).iter().any(|j| j.matters_to_anchor())
}

/// Checks the ordering graph for cycles and breaks them by dropping a
/// dispensable job where one exists.
fn trans_verify_order(tr: &Transaction, db: &UnitDb, generation: &mut u32) -> Result<()> {
    let g = *generation;
    *generation += 1;

    for job in tr.heads().iter() {
        trans_verify_order_one(tr, db, job, None, g)?;
    }

    Ok(())
}

fn trans_verify_order_one(
    tr: &Transaction,
    db: &UnitDb,
    job: &Rc<Job>,
    from: Option<&Rc<Job>>,
    generation: u32,
) -> Result<()> {
    // have we seen this job in this pass before?
    if job.generation() == generation {
        // an empty marker means it has already been found loop-free
        if job.marker().is_none() {
            return Ok(());
        }

        // so we have a cycle: walk the path backwards along the markers and
        // look for a job we can remove to break it
        log::warn!("Found ordering cycle on {}/{:?}", job.unit().id(), job.kind());

        let mut delete: Option<Rc<Job>> = None;
        let mut walk = from.map(Rc::clone);
        while let Some(cur) = walk {
            log::info!("Walked on cycle path to {}/{:?}", cur.unit().id(), cur.kind());

            if delete.is_none()
                && !cur.is_installed()
                && !unit_matters_to_anchor(tr, cur.unit())
            {
                delete = Some(Rc::clone(&cur));
            }

            // was this the beginning of the cycle?
            if Rc::ptr_eq(&cur, job) {
                break;
            }

            walk = match cur.generation() == generation {
                true => match cur.marker() {
                    Some(m) if !Rc::ptr_eq(&m, &cur) => Some(m),
                    _ => None,
                },
                false => None,
            };
        }

        if let Some(victim) = delete {
            log::warn!(
                "Breaking ordering cycle by deleting job {}/{:?}",
                victim.unit().id(),
                victim.kind()
            );
            job_trans_delete_unit(tr, victim.unit());
            return Err(Error::Again);
        }

        log::error!("Unable to break cycle");
        return Err(Error::TransactionOrderIsCyclic);
    }

    // the marker records the way back; the start points at itself
    job.set_marker(Some(from.unwrap_or(job)));
    job.set_generation(generation);

    // ordering dependencies are bidirectional, following the before edges covers everything
    for other in db.dep_gets(job.unit(), UnitRelations::UnitBefore).iter() {
        // is there a job for this unit, pending or installed?
        let o = match tr.head(other) {
            Some(o) => o,
            None => match other.job() {
                Some(o) => o,
                None => continue,
            },
        };

        if job.attr().ignore_order || o.attr().ignore_order {
            continue;
        }

        trans_verify_order_one(tr, db, &o, Some(job), generation)?;
    }

    // backtrack: this job is not on the path anymore
    job.set_marker(None);
    Ok(())
}

/// Collapses each unit's jobs into a single one, dropping dispensable
/// conflicting jobs where the kinds refuse to merge.
fn trans_merge_jobs(tr: &Transaction) -> Result<()> {
    // first step: check whether any of the jobs for one unit conflict, and if
    // so, try to get rid of one of them
    for unit in tr.units().iter() {
        let list = tr.unit_jobs(unit);
        let mut t = match list.first() {
            Some(j) => j.kind(),
            None => continue,
        };
        for k in list.iter().skip(1) {
            match job_kind_merge(t, k.kind()) {
                Some(merged) => t = merged,
                None => {
                    if trans_delete_one_unmergeable(tr, &list) {
                        // a job got dropped; our callers garbage-collect and re-run us
                        return Err(Error::Again);
                    }
                    return Err(Error::TransactionJobsConflicting {
                        first: format!("{:?}", t),
                        second: format!("{:?}", k.kind()),
                        unit: unit.id(),
                    });
                }
            }
        }
    }

    // second step: merge the jobs
    for unit in tr.units().iter() {
        let list = tr.unit_jobs(unit);
        let head = match list.first() {
            Some(j) => Rc::clone(j),
            None => continue,
        };

        let mut t = head.kind();
        for k in list.iter().skip(1) {
            t = match job_kind_merge(t, k.kind()) {
                Some(merged) => merged,
                None => unreachable!("unmergeable jobs survived the conflict check"),
            };
        }

        // if the installed job is mergeable, fold its kind in too. this may
        // fail, which is fine
        if let Some(uj) = unit.job() {
            if let Some(merged) = job_kind_merge(t, uj.kind()) {
                t = merged;
            }
        }

        head.set_kind(t);
        for k in list.iter().skip(1) {
            trans_merge_and_delete_job(tr, &head, k, t);
        }
    }

    Ok(())
}

/// Tries to delete one job of the unit's list that conflicts with another
/// one. Returns whether something was dropped.
fn trans_delete_one_unmergeable(tr: &Transaction, list: &[Rc<Job>]) -> bool {
    // if a merged with b does not merge with c, neither a nor b merges with c
    for (i, j) in list.iter().enumerate() {
        for k in list.iter().skip(i + 1) {
            // this pair is mergeable, skip it
            if job_kind_is_mergeable(j.kind(), k.kind()) {
                continue;
            }

            let j_disposable = !j.matters_to_anchor() && !j.is_installed();
            let k_disposable = !k.matters_to_anchor() && !k.is_installed();

            let victim = if j_disposable && k_disposable {
                // neither matters: rather remove stops than starts, except
                // when the stop was pulled in by a conflicting unit
                if j.kind() == JobKind::Stop {
                    match j.is_conflicted_by() {
                        true => k,
                        false => j,
                    }
                } else if k.kind() == JobKind::Stop {
                    match k.is_conflicted_by() {
                        true => j,
                        false => k,
                    }
                } else {
                    j
                }
            } else if j_disposable {
                j
            } else if k_disposable {
                k
            } else {
                return false;
            };

            log::debug!(
                "Fixing conflicting jobs by deleting job {}/{:?}",
                victim.unit().id(),
                victim.kind()
            );
            job_trans_delete_job(tr, victim, true);
            return true;
        }
    }

    false
}

/// Merges `other` into `into` and deletes it. The surviving job takes over
/// the links, the flags and the essentiality of the dead one.
fn trans_merge_and_delete_job(tr: &Transaction, into: &Rc<Job>, other: &Rc<Job>, t: JobKind) {
    assert!(Rc::ptr_eq(into.unit(), other.unit()));
    assert!(!into.is_installed());

    into.set_kind(t);
    into.merge_attr(&other.attr());
    if other.matters_to_anchor() {
        into.set_matters_to_anchor(true);
    }

    // patch the surviving job in as the new owner of the links
    loop {
        let link = match other.subject_pop() {
            Some(l) => l,
            None => break,
        };
        link.set_subject(into);
        into.subject_push(link);
    }
    loop {
        let link = match other.object_pop() {
            Some(l) => l,
            None => break,
        };
        link.set_object(into);
        into.object_push(link);
    }

    // kill the other job; its lists are empty, nothing cascades
    job_trans_delete_job(tr, other, true);
}

/// Refuses, in fail mode, transactions that would replace live jobs with
/// something weaker.
fn trans_is_destructive(tr: &Transaction) -> Result<()> {
    for job in tr.heads().iter() {
        // assume merged
        let uj = match job.unit().job() {
            Some(uj) => uj,
            None => continue,
        };
        if !Rc::ptr_eq(&uj, job) && !job_kind_is_superset(job.kind(), uj.kind()) {
            return Err(Error::TransactionIsDestructive);
        }
    }

    Ok(())
}
