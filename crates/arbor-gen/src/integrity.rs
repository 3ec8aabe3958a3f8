//! Cross-structure integrity checks.
//!
//! Run after every mutating operation when enabled. A violation is logged as
//! an internal-state error and execution continues: the engine favors
//! availability over crashing on a detected inconsistency.

use crate::manager::ManagerState;

pub(crate) fn check(state: &ManagerState) -> Vec<String> {
    let mut violations = Vec::new();

    if let Err(err) = state.build_deps.check_integrity() {
        violations.push(format!("build graph: {err}"));
    }
    if let Err(err) = state.reconcile_deps.check_integrity() {
        violations.push(format!("reconcile graph: {err}"));
    }
    if let Err(err) = state.non_deps.check_integrity() {
        violations.push(format!("non-dependency graph: {err}"));
    }

    // Reconcile-graph values and the visible registry must match exactly,
    // in both directions.
    for child in state.reconcile_deps.values() {
        if !state.visible.contains_key(child) {
            violations.push(format!(
                "reconcile-generated file without visible working copy: {}",
                child.display()
            ));
        }
    }
    for path in state.visible.keys() {
        if !state.reconcile_deps.contains_value(path) {
            violations.push(format!(
                "visible working copy not in the reconcile graph: {}",
                path.display()
            ));
        }
    }

    for path in &state.clear_during_reconcile {
        if !state.build_deps.contains_child(path) {
            violations.push(format!(
                "clear-during-reconcile entry not in the build graph: {}",
                path.display()
            ));
        }
    }

    for path in state.hidden.keys() {
        if !state.non_deps.contains_value(path) {
            violations.push(format!(
                "hidden working copy without a masking edge: {}",
                path.display()
            ));
        }
    }

    for parent in state.non_deps.keys() {
        for child in state.non_deps.values_of(parent) {
            if state.reconcile_deps.contains_pair(parent, &child) {
                violations.push(format!(
                    "pair in both reconcile and non-dependency graphs: {} -> {}",
                    parent.display(),
                    child.display()
                ));
            }
            if !state.build_deps.contains_pair(parent, &child) {
                violations.push(format!(
                    "non-dependency pair missing from the build graph: {} -> {}",
                    parent.display(),
                    child.display()
                ));
            }
        }
    }

    // Registry keys must agree with the handle they hold; this is the
    // closest analogue of "no null working-copy values".
    for (path, wc) in state.visible.iter().chain(state.hidden.iter()) {
        if wc.path() != path {
            violations.push(format!(
                "registry key {} holds a working copy for {}",
                path.display(),
                wc.path().display()
            ));
        }
    }

    // A file's working copy lives in exactly one registry at a time.
    for path in state.visible.keys() {
        if state.hidden.contains_key(path) {
            violations.push(format!(
                "working copy registered both visible and hidden: {}",
                path.display()
            ));
        }
    }

    violations
}
