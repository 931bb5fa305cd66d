//! # Dependency Graph
//!
//! Derived from the reference handles found in a batch's desired states. An
//! edge `B -> A` means B references A, so A must be materialized first and
//! deleted last. The graph is rebuilt for every batch and never stored.

use crate::error::ConfigurationError;
use crate::resolver::references;
use crate::value::{InstanceKey, State};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Declaration order, used to keep traversal deterministic.
    order: Vec<InstanceKey>,
    dependencies: BTreeMap<InstanceKey, BTreeSet<InstanceKey>>,
    dependents: BTreeMap<InstanceKey, BTreeSet<InstanceKey>>,
}

impl DependencyGraph {
    /// Builds the graph and rejects duplicate keys, references to undeclared
    /// instances and cycles.
    pub fn build<'a, I>(instances: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (&'a InstanceKey, &'a State)>,
    {
        let instances: Vec<(&InstanceKey, &State)> = instances.into_iter().collect();
        let mut graph = Self::default();

        for (key, _) in &instances {
            if graph.dependencies.contains_key(*key) {
                return Err(ConfigurationError::DuplicateInstance((*key).clone()));
            }
            graph.order.push((*key).clone());
            graph.dependencies.insert((*key).clone(), BTreeSet::new());
            graph.dependents.insert((*key).clone(), BTreeSet::new());
        }

        for (key, desired) in &instances {
            for (_, target) in references(desired) {
                if !graph.dependencies.contains_key(&target) {
                    return Err(ConfigurationError::UndeclaredReference {
                        from: (*key).clone(),
                        missing: target,
                    });
                }
                graph
                    .dependencies
                    .entry((*key).clone())
                    .or_default()
                    .insert(target.clone());
                graph
                    .dependents
                    .entry(target)
                    .or_default()
                    .insert((*key).clone());
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(ConfigurationError::Cycle(cycle));
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.dependencies.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &InstanceKey> {
        self.order.iter()
    }

    /// Instances `key` references directly.
    pub fn dependencies(&self, key: &InstanceKey) -> impl Iterator<Item = &InstanceKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    /// Instances that reference `key` directly.
    pub fn dependents(&self, key: &InstanceKey) -> impl Iterator<Item = &InstanceKey> {
        self.dependents.get(key).into_iter().flatten()
    }

    /// Every instance that depends on `key`, directly or not.
    pub fn transitive_dependents(&self, key: &InstanceKey) -> BTreeSet<InstanceKey> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&InstanceKey> = self.dependents(key).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(self.dependents(next));
            }
        }
        seen
    }

    /// Dependencies before dependents; ties keep declaration order.
    pub fn topological_order(&self) -> Vec<InstanceKey> {
        let mut remaining: BTreeMap<&InstanceKey, usize> = self
            .dependencies
            .iter()
            .map(|(k, deps)| (k, deps.len()))
            .collect();
        let mut out = Vec::with_capacity(self.order.len());

        while out.len() < self.order.len() {
            let ready: Vec<&InstanceKey> = self
                .order
                .iter()
                .filter(|k| remaining.get(k) == Some(&0))
                .collect();
            if ready.is_empty() {
                break;
            }
            for key in ready {
                remaining.remove(key);
                for dependent in self.dependents(key) {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                    }
                }
                out.push(key.clone());
            }
        }
        out
    }

    /// Returns one cycle as a key path that starts and ends on the same key.
    fn find_cycle(&self) -> Option<Vec<InstanceKey>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'g>(
            graph: &'g DependencyGraph,
            key: &'g InstanceKey,
            marks: &mut BTreeMap<&'g InstanceKey, Mark>,
            stack: &mut Vec<&'g InstanceKey>,
        ) -> Option<Vec<InstanceKey>> {
            match marks.get(key) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|k| *k == key).unwrap_or(0);
                    let mut cycle: Vec<InstanceKey> =
                        stack[start..].iter().map(|k| (*k).clone()).collect();
                    cycle.push(key.clone());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(key, Mark::Visiting);
            stack.push(key);
            for dependency in graph.dependencies(key) {
                if let Some(cycle) = visit(graph, dependency, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(key, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        self.order
            .iter()
            .find_map(|key| visit(self, key, &mut marks, &mut stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ReferenceHandle;

    fn refs(targets: &[&str]) -> State {
        targets.iter().enumerate().fold(State::new(), |state, (i, t)| {
            state.with(format!("ref{i}"), State::new().with("id", ReferenceHandle::to(*t)))
        })
    }

    fn keys(names: &[&str]) -> Vec<InstanceKey> {
        names.iter().map(|n| InstanceKey::new(*n)).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let k = keys(&["service", "slate", "live", "ads"]);
        let states = [refs(&["live", "ads", "slate"]), refs(&[]), refs(&[]), refs(&[])];
        let graph = DependencyGraph::build(k.iter().zip(states.iter())).unwrap();

        assert_eq!(
            graph.topological_order(),
            keys(&["slate", "live", "ads", "service"])
        );
        assert_eq!(
            graph.transitive_dependents(&InstanceKey::new("ads")),
            BTreeSet::from([InstanceKey::new("service")])
        );
    }

    #[test]
    fn test_cycle_is_reported_with_its_path() {
        let k = keys(&["a", "b", "c"]);
        let states = [refs(&["b"]), refs(&["c"]), refs(&["a"])];
        let err = DependencyGraph::build(k.iter().zip(states.iter())).unwrap_err();

        assert_eq!(err, ConfigurationError::Cycle(keys(&["a", "b", "c", "a"])));
        assert!(err.to_string().contains("a -> b -> c -> a"));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let k = keys(&["a"]);
        let states = [refs(&["a"])];
        assert!(matches!(
            DependencyGraph::build(k.iter().zip(states.iter())),
            Err(ConfigurationError::Cycle(_))
        ));
    }

    #[test]
    fn test_undeclared_and_duplicate_instances() {
        let k = keys(&["a"]);
        let states = [refs(&["ghost"])];
        assert!(matches!(
            DependencyGraph::build(k.iter().zip(states.iter())),
            Err(ConfigurationError::UndeclaredReference { .. })
        ));

        let k = keys(&["a", "a"]);
        let states = [refs(&[]), refs(&[])];
        assert_eq!(
            DependencyGraph::build(k.iter().zip(states.iter())).unwrap_err(),
            ConfigurationError::DuplicateInstance(InstanceKey::new("a"))
        );
    }
}
