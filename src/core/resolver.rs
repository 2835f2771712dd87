//! SSG-006: Stack dependency DAG and deployment order.
//!
//! Builds a DAG from the explicit and import-derived dependency edges of every
//! stack and computes a topological order using Kahn's algorithm with
//! deterministic (alphabetical) tie-breaking.

use super::types::App;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

struct Graph<'a> {
    in_degree: FxHashMap<&'a str, usize>,
    dependents: FxHashMap<&'a str, Vec<&'a str>>,
}

fn build_graph(app: &App) -> Result<Graph<'_>, String> {
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

    for name in app.stacks.keys() {
        in_degree.insert(name.as_str(), 0);
        dependents.insert(name.as_str(), Vec::new());
    }

    for (name, stack) in &app.stacks {
        for dep in &stack.dependencies {
            if dep == name {
                return Err(format!("stack '{}' depends on itself", name));
            }
            let Some(edges) = dependents.get_mut(dep.as_str()) else {
                return Err(format!("stack '{}' depends on unknown '{}'", name, dep));
            };
            edges.push(name.as_str());
            if let Some(d) = in_degree.get_mut(name.as_str()) {
                *d += 1;
            }
        }
    }

    Ok(Graph {
        in_degree,
        dependents,
    })
}

fn cycle_error(app: &App, ordered: &[String]) -> String {
    let done: FxHashSet<&str> = ordered.iter().map(String::as_str).collect();
    let mut members: Vec<&str> = app
        .stacks
        .keys()
        .map(String::as_str)
        .filter(|n| !done.contains(n))
        .collect();
    members.sort_unstable();
    format!("dependency cycle detected involving: {}", members.join(", "))
}

/// Build a topological deployment order from stack dependencies.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_execution_order(app: &App) -> Result<Vec<String>, String> {
    let Graph {
        mut in_degree,
        dependents,
    } = build_graph(app)?;

    let mut zero_degree: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    zero_degree.sort_unstable();
    let mut queue: VecDeque<&str> = zero_degree.into_iter().collect();

    let mut order = Vec::with_capacity(app.stacks.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        for neighbor in dependents.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(neighbor) {
                *degree -= 1;
                if *degree == 0 {
                    next_ready.push(*neighbor);
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != app.stacks.len() {
        return Err(cycle_error(app, &order));
    }

    tracing::debug!(stacks = order.len(), "execution order computed");
    Ok(order)
}

/// Group stacks into waves whose members have no edges between them.
/// Every stack's dependencies sit in an earlier wave.
pub fn deployment_waves(app: &App) -> Result<Vec<Vec<String>>, String> {
    let order = build_execution_order(app)?;
    let mut level: FxHashMap<&str, usize> = FxHashMap::default();
    let mut waves: Vec<Vec<String>> = Vec::new();

    for name in &order {
        let depth = app
            .stacks
            .get(name)
            .map(|s| {
                s.dependencies
                    .iter()
                    .filter_map(|d| level.get(d.as_str()))
                    .map(|l| l + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        level.insert(name.as_str(), depth);
        if waves.len() <= depth {
            waves.resize_with(depth + 1, Vec::new);
        }
        waves[depth].push(name.clone());
    }

    Ok(waves)
}

/// All stacks `name` transitively depends on, in deployment order.
pub fn transitive_dependencies(app: &App, name: &str) -> Result<Vec<String>, String> {
    if !app.stacks.contains_key(name) {
        return Err(format!("unknown stack '{}'", name));
    }
    let mut needed: FxHashSet<&str> = FxHashSet::default();
    let mut stack = vec![name];
    while let Some(current) = stack.pop() {
        if let Some(s) = app.stacks.get(current) {
            for dep in &s.dependencies {
                if needed.insert(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
    }
    Ok(build_execution_order(app)?
        .into_iter()
        .filter(|s| needed.contains(s.as_str()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Stack;

    fn app_with(edges: &[(&str, &[&str])]) -> App {
        let mut app = App::new("SSG-Stack", None, "dev");
        for (name, deps) in edges {
            let mut s = Stack::new(name, name);
            for d in *deps {
                s.add_dependency(d);
            }
            app.stacks.insert(name.to_string(), s);
        }
        app
    }

    #[test]
    fn test_ssg006_topo_linear() {
        let app = app_with(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let order = build_execution_order(&app).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ssg006_topo_alphabetical_tiebreak() {
        let app = app_with(&[
            ("SsgZoneStack", &[]),
            ("SsgEcrStack", &[]),
            ("SsgVpc", &[]),
            ("SsgBatch", &["SsgVpc", "SsgEcrStack"]),
        ]);
        let order = build_execution_order(&app).unwrap();
        assert_eq!(
            order,
            vec!["SsgEcrStack", "SsgVpc", "SsgZoneStack", "SsgBatch"]
        );
    }

    #[test]
    fn test_ssg006_topo_cycle() {
        let app = app_with(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let err = build_execution_order(&app).unwrap_err();
        assert!(err.contains("cycle"));
        assert!(err.ends_with("involving: a, b"));
    }

    #[test]
    fn test_ssg006_unknown_dependency() {
        let app = app_with(&[("a", &["ghost"])]);
        let err = build_execution_order(&app).unwrap_err();
        assert!(err.contains("unknown 'ghost'"));
    }

    #[test]
    fn test_ssg006_deterministic() {
        let app = app_with(&[
            ("d", &["a", "b"]),
            ("b", &[]),
            ("a", &[]),
            ("c", &["a"]),
        ]);
        let first = build_execution_order(&app).unwrap();
        for _ in 0..10 {
            assert_eq!(build_execution_order(&app).unwrap(), first);
        }
        assert_eq!(first, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_ssg006_waves() {
        let app = app_with(&[
            ("vpc", &[]),
            ("ecr", &[]),
            ("batch", &["vpc", "ecr"]),
            ("scheduler", &["batch", "ecr"]),
        ]);
        let waves = deployment_waves(&app).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["ecr", "vpc"]);
        assert_eq!(waves[1], vec!["batch"]);
        assert_eq!(waves[2], vec!["scheduler"]);
    }

    #[test]
    fn test_ssg006_transitive_dependencies() {
        let app = app_with(&[
            ("vpc", &[]),
            ("ecr", &[]),
            ("zone", &[]),
            ("batch", &["vpc", "ecr"]),
            ("scheduler", &["batch"]),
        ]);
        let deps = transitive_dependencies(&app, "scheduler").unwrap();
        assert_eq!(deps, vec!["ecr", "vpc", "batch"]);
        assert!(transitive_dependencies(&app, "zone").unwrap().is_empty());
        assert!(transitive_dependencies(&app, "nope").is_err());
    }

    #[test]
    fn test_ssg006_empty_app() {
        let app = App::new("SSG-Stack", None, "dev");
        assert!(build_execution_order(&app).unwrap().is_empty());
        assert!(deployment_waves(&app).unwrap().is_empty());
    }
}
