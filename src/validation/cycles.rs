// Dependency-cycle detection over changed files

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::index::imports::resolved_imports;

/// Adjacency map from each changed file to the changed files it imports
pub fn build_import_graph(contents: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    let known: HashSet<String> = contents.keys().cloned().collect();
    contents
        .iter()
        .map(|(path, content)| {
            let mut targets = resolved_imports(path, content, &known);
            targets.retain(|target| target != path);
            targets.sort();
            targets.dedup();
            (path.clone(), targets)
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// First cycle found by depth-first search, as a path that starts and ends
/// on the same file. Nodes are visited in sorted order so the result is
/// deterministic.
pub fn find_cycle(graph: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();

    for start in graph.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }
        if let Some(cycle) = visit(graph, start, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    graph: &'a BTreeMap<String, Vec<String>>,
    node: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(node, Mark::InProgress);
    path.push(node);

    for next in graph.get(node).into_iter().flatten() {
        match marks.get(next.as_str()) {
            Some(Mark::InProgress) => {
                let start = path.iter().position(|entry| *entry == next.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|entry| entry.to_string()).collect();
                cycle.push(next.clone());
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(graph, next, marks, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks.insert(node, Mark::Done);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| (from.to_string(), to.iter().map(|t| t.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_acyclic_graph() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &[])]);
        assert_eq!(find_cycle(&g), None);
    }

    #[test]
    fn test_cycle_is_sliced_from_first_occurrence() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        assert_eq!(find_cycle(&g), Some(vec!["b".to_string(), "c".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_graph_from_imports() {
        let mut contents = BTreeMap::new();
        contents.insert("src/a.ts".to_string(), "import { b } from './b';\n".to_string());
        contents.insert("src/b.ts".to_string(), "import { a } from './a';\nimport x from 'lodash';\n".to_string());
        let g = build_import_graph(&contents);
        assert_eq!(g["src/a.ts"], vec!["src/b.ts"]);
        assert_eq!(g["src/b.ts"], vec!["src/a.ts"]);
        assert_eq!(
            find_cycle(&g),
            Some(vec!["src/a.ts".to_string(), "src/b.ts".to_string(), "src/a.ts".to_string()])
        );
    }
}
