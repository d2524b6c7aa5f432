//! Dependency state: readiness, missing/incomplete deps, cycle detection.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Task, TaskStatus};

pub type TaskIndex = BTreeMap<String, Task>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyInfo {
    pub depends_on: Vec<String>,
    pub missing: Vec<String>,
    pub incomplete: Vec<String>,
}

impl DependencyInfo {
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty() && self.incomplete.is_empty()
    }
}

pub type DependencyState = BTreeMap<String, DependencyInfo>;

/// Index tasks by id, keeping the first record for duplicate ids.
pub fn index_tasks(tasks: &[Task]) -> (TaskIndex, Vec<String>) {
    let mut warnings = Vec::new();
    let mut index = TaskIndex::new();
    for (position, task) in tasks.iter().enumerate() {
        let task_id = task.id.trim();
        if task_id.is_empty() {
            warnings.push(format!("tasks[{position}] is missing a non-empty id"));
            continue;
        }
        if index.contains_key(task_id) {
            warnings.push(format!(
                "Duplicate task id found: {task_id} (keeping first, ignoring later entries)"
            ));
            continue;
        }
        index.insert(task_id.to_string(), task.clone());
    }
    (index, warnings)
}

/// Trims, drops empties and dedups a declared dependency list.
pub fn normalize_depends_on(raw: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for value in raw {
        let dep = value.trim();
        if dep.is_empty() || !seen.insert(dep.to_string()) {
            continue;
        }
        out.push(dep.to_string());
    }
    out
}

/// Pure function of the task set: per-task dependency info plus warnings
/// for self-dependencies and cycles.
pub fn compute_dependency_state(index: &TaskIndex) -> (DependencyState, Vec<String>) {
    let mut warnings = Vec::new();
    let mut state = DependencyState::new();
    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (task_id, task) in index {
        let depends_on = normalize_depends_on(&task.depends_on);
        if depends_on.iter().any(|dep| dep == task_id) {
            warnings.push(format!("{task_id}: depends_on contains itself"));
        }
        let mut missing = BTreeSet::new();
        let mut incomplete = BTreeSet::new();
        for dep_id in &depends_on {
            let Some(dep) = index.get(dep_id) else {
                missing.insert(dep_id.clone());
                continue;
            };
            if dep.status != TaskStatus::Done {
                incomplete.insert(dep_id.clone());
                continue;
            }
            let commit_ok = dep.commit.as_ref().is_some_and(|commit| commit.is_valid());
            if !commit_ok {
                incomplete.insert(dep_id.clone());
            }
        }
        state.insert(
            task_id.clone(),
            DependencyInfo {
                depends_on: depends_on.clone(),
                missing: missing.into_iter().collect(),
                incomplete: incomplete.into_iter().collect(),
            },
        );
        edges.insert(task_id.clone(), depends_on);
    }

    for cycle in detect_cycles(&edges) {
        warnings.push(format!("Dependency cycle detected: {}", cycle.join(" -> ")));
    }

    (state, warnings)
}

/// DFS with a visiting stack; each cycle is reported once, closed on the
/// repeated node.
pub fn detect_cycles(edges: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    fn visit(
        node: &str,
        edges: &BTreeMap<String, Vec<String>>,
        visiting: &mut BTreeSet<String>,
        visited: &mut BTreeSet<String>,
        stack: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if visited.contains(node) {
            return;
        }
        if visiting.contains(node) {
            if let Some(start) = stack.iter().position(|entry| entry == node) {
                let mut cycle: Vec<String> = stack[start..].to_vec();
                cycle.push(node.to_string());
                cycles.push(cycle);
            }
            return;
        }
        visiting.insert(node.to_string());
        stack.push(node.to_string());
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if edges.contains_key(dep) {
                    visit(dep, edges, visiting, visited, stack, cycles);
                }
            }
        }
        stack.pop();
        visiting.remove(node);
        visited.insert(node.to_string());
    }

    let mut cycles = Vec::new();
    let mut visiting = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut stack = Vec::new();
    for node in edges.keys() {
        visit(node, edges, &mut visiting, &mut visited, &mut stack, &mut cycles);
    }
    cycles
}

/// Readiness of one task: all declared deps present, DONE and carrying a
/// valid commit record.
pub fn readiness(task_id: &str, index: &TaskIndex, state: &DependencyState) -> (bool, Vec<String>) {
    let mut warnings = Vec::new();
    if !index.contains_key(task_id) {
        warnings.push(format!("Unknown task id: {task_id}"));
        return (false, warnings);
    }
    let info = state.get(task_id).cloned().unwrap_or_default();
    if !info.missing.is_empty() {
        warnings.push(format!("{task_id}: missing deps: {}", info.missing.join(", ")));
    }
    if !info.incomplete.is_empty() {
        warnings.push(format!(
            "{task_id}: incomplete deps: {}",
            info.incomplete.join(", ")
        ));
    }
    (info.is_ready(), warnings)
}
