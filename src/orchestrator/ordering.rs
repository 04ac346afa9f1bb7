use std::collections::{BTreeSet, HashMap};

use super::tasks::FileTask;
use super::types::OrchestrationError;
use crate::priority::Priority;

/// Execution order for `tasks`.
///
/// Dependencies always run first. Among tasks that are ready, fewer declared
/// dependencies go first, then higher priority, then path. Dependencies on
/// files outside the task set are ignored. A cycle is a producer bug and is
/// reported as an error instead of being broken arbitrarily.
pub fn order_tasks(tasks: Vec<FileTask>) -> Result<Vec<FileTask>, OrchestrationError> {
    let index: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(position, task)| (task.path.clone(), position))
        .collect();

    let mut remaining: Vec<usize> = vec![0; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (position, task) in tasks.iter().enumerate() {
        let mut seen = Vec::new();
        for dependency in &task.dependencies {
            if let Some(&dep) = index.get(dependency) {
                if dep != position && !seen.contains(&dep) {
                    seen.push(dep);
                    remaining[position] += 1;
                    dependents[dep].push(position);
                }
            }
        }
    }

    let key = |position: usize| -> (usize, Priority, String, usize) {
        let task = &tasks[position];
        (task.dependencies.len(), task.priority, task.path.clone(), position)
    };

    let mut ready: BTreeSet<(usize, Priority, String, usize)> = (0..tasks.len())
        .filter(|&position| remaining[position] == 0)
        .map(key)
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(next) = ready.pop_first() {
        let position = next.3;
        order.push(position);
        for &dependent in &dependents[position] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(key(dependent));
            }
        }
    }

    if order.len() < tasks.len() {
        let mut files: Vec<String> = (0..tasks.len())
            .filter(|position| remaining[*position] > 0)
            .map(|position| tasks[position].path.clone())
            .collect();
        files.sort();
        return Err(OrchestrationError::CyclicDependencies { files });
    }

    let mut slots: Vec<Option<FileTask>> = tasks.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect())
}
