//! Module dependency resolution
//!
//! Computes a deterministic initialization order for registered modules and
//! detects dependency cycles.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::debug;

use crate::registry::types::{ModuleDescriptor, RegistryError};

/// Dependency resolution result
#[derive(Debug, Clone)]
pub struct DependencyResolution {
    /// Modules in initialization order (dependencies first)
    pub load_order: Vec<String>,
    /// Dependencies declared but not present in the input set
    pub missing: Vec<String>,
}

/// Dependency resolver
///
/// Resolution is pure: it never mutates registry state, so the registry can
/// invoke it speculatively before committing a registration.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve initialization order for a set of descriptors
    ///
    /// Dependencies on modules absent from the input impose no ordering
    /// constraint; they are reported in `missing` and handled by the mesh
    /// as pending edges. A cycle fails the whole resolution, returning every
    /// module participating in a cycle and no partial order.
    pub fn resolve(descriptors: &[ModuleDescriptor]) -> Result<DependencyResolution, RegistryError> {
        let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for descriptor in descriptors {
            graph.insert(descriptor.name.clone(), descriptor.dependencies.clone());
        }
        Self::resolve_graph(&graph)
    }

    /// Resolve over an explicit name → dependencies map
    pub fn resolve_graph(
        graph: &BTreeMap<String, Vec<String>>,
    ) -> Result<DependencyResolution, RegistryError> {
        let mut missing: BTreeSet<String> = BTreeSet::new();
        // Edges restricted to modules present in the input; absent targets
        // cannot constrain the order among present ones.
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for name in graph.keys() {
            in_degree.insert(name.as_str(), 0);
        }
        for (name, deps) in graph {
            for dep in deps {
                if !graph.contains_key(dep) {
                    missing.insert(dep.clone());
                    continue;
                }
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
                *in_degree.get_mut(name.as_str()).expect("node present") += 1;
            }
        }

        // Kahn's algorithm; the ready set is a min-heap on name so that
        // modules with no mutual ordering constraint come out in ascending
        // name order, keeping the plan reproducible.
        let mut ready: BinaryHeap<Reverse<&str>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(name, _)| Reverse(*name))
            .collect();

        let mut load_order = Vec::with_capacity(graph.len());
        while let Some(Reverse(name)) = ready.pop() {
            load_order.push(name.to_string());
            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    let degree = in_degree.get_mut(dependent).expect("node present");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*dependent));
                    }
                }
            }
        }

        if load_order.len() != graph.len() {
            let members = Self::cycle_members(graph, &load_order);
            return Err(RegistryError::CyclicDependency { members });
        }

        debug!(order = ?load_order, "dependency resolution complete");
        Ok(DependencyResolution {
            load_order,
            missing: missing.into_iter().collect(),
        })
    }

    /// Collect every module that sits on a dependency cycle
    ///
    /// The nodes left over after Kahn's algorithm include both cycle members
    /// and modules that merely depend on a cycle; only nodes that can reach
    /// themselves are actual participants.
    fn cycle_members(graph: &BTreeMap<String, Vec<String>>, resolved: &[String]) -> Vec<String> {
        let resolved: BTreeSet<&str> = resolved.iter().map(String::as_str).collect();
        let remaining: BTreeSet<&str> = graph
            .keys()
            .map(String::as_str)
            .filter(|name| !resolved.contains(name))
            .collect();

        let mut members = Vec::new();
        for &start in &remaining {
            if Self::reaches(graph, &remaining, start, start) {
                members.push(start.to_string());
            }
        }
        members
    }

    /// Depth-first reachability from `from` back to `target` within `scope`
    fn reaches(
        graph: &BTreeMap<String, Vec<String>>,
        scope: &BTreeSet<&str>,
        from: &str,
        target: &str,
    ) -> bool {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            let Some(deps) = graph.get(node) else {
                continue;
            };
            for dep in deps {
                if !scope.contains(dep.as_str()) {
                    continue;
                }
                if dep == target {
                    return true;
                }
                if visited.insert(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
        false
    }
}
