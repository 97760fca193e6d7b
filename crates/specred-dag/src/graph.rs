//! The dependency graph structure and ordering algorithms.
//!
//! [`DependencyGraph`] stores, for every declared product kind, the kinds
//! its step consumes, plus a forward index (`dependents`) for downstream
//! queries.
//!
//! # Invariants
//!
//! - The graph is acyclic.
//! - Every dependency resolves to a declared kind.
//! - Each kind is declared once.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use specred_types::ProductKind;

use crate::error::{DagError, DagResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Declared kinds and their direct dependencies.
    nodes: BTreeMap<ProductKind, Vec<ProductKind>>,
    /// Forward-edge index: dependency -> kinds consuming it.
    dependents: BTreeMap<ProductKind, Vec<ProductKind>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The spectrograph calibration chain:
    ///
    /// ```text
    /// bias -> arc -> bpm -> trace -> tilt -> flat
    ///    \______\_____\______/  \      \
    ///                            \----> wave
    /// ```
    ///
    /// The bad-pixel mask takes its shape from the arc image; trace needs
    /// the bias and mask; tilt fits arc lines along each trace; flat and
    /// wave both need traces and tilts.
    pub fn standard() -> Self {
        use ProductKind::*;
        let mut graph = Self::new();
        let edges: [(ProductKind, &[ProductKind]); 7] = [
            (Bias, &[]),
            (Arc, &[Bias]),
            (Bpm, &[Bias, Arc]),
            (Trace, &[Bias, Bpm]),
            (Tilt, &[Arc, Trace]),
            (Flat, &[Bias, Trace, Tilt]),
            (Wave, &[Arc, Trace, Tilt]),
        ];
        for (kind, deps) in edges {
            // Declared in dependency order, so add_node cannot fail.
            if let Err(e) = graph.add_node(kind, deps.to_vec()) {
                unreachable!("standard graph is well-formed: {e}");
            }
        }
        graph
    }

    /// Build a graph from arbitrary edges and validate it.
    ///
    /// Unlike [`add_node`](Self::add_node), declaration order does not
    /// matter; dangling dependencies and cycles are reported by
    /// [`validate`](Self::validate).
    pub fn from_edges<I>(edges: I) -> DagResult<Self>
    where
        I: IntoIterator<Item = (ProductKind, Vec<ProductKind>)>,
    {
        let mut graph = Self::new();
        for (kind, deps) in edges {
            if graph.nodes.contains_key(&kind) {
                return Err(DagError::DuplicateNode(kind));
            }
            for dep in &deps {
                graph.dependents.entry(*dep).or_default().push(kind);
            }
            graph.nodes.insert(kind, deps);
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Total number of declared kinds.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no kinds are declared.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Declare a kind and its direct dependencies.
    ///
    /// Every dependency must already be declared, which keeps the graph
    /// acyclic by construction.
    pub fn add_node(&mut self, kind: ProductKind, deps: Vec<ProductKind>) -> DagResult<()> {
        if self.nodes.contains_key(&kind) {
            return Err(DagError::DuplicateNode(kind));
        }
        for dep in &deps {
            if !self.nodes.contains_key(dep) {
                return Err(DagError::DanglingDependency {
                    kind,
                    dependency: *dep,
                });
            }
        }
        for dep in &deps {
            self.dependents.entry(*dep).or_default().push(kind);
        }
        debug!(%kind, deps = deps.len(), "declared calibration dependency");
        self.nodes.insert(kind, deps);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Returns `true` if the kind is declared.
    pub fn contains(&self, kind: ProductKind) -> bool {
        self.nodes.contains_key(&kind)
    }

    /// Direct dependencies of a kind.
    pub fn dependencies(&self, kind: ProductKind) -> DagResult<&[ProductKind]> {
        self.nodes
            .get(&kind)
            .map(Vec::as_slice)
            .ok_or(DagError::UnknownKind(kind))
    }

    /// Kinds that directly consume `kind`.
    pub fn dependents(&self, kind: ProductKind) -> &[ProductKind] {
        self.dependents
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every kind transitively upstream of `kind`, excluding itself.
    pub fn ancestors(&self, kind: ProductKind) -> DagResult<BTreeSet<ProductKind>> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<ProductKind> = self.dependencies(kind)?.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                queue.extend(self.dependencies(current)?.iter().copied());
            }
        }
        Ok(seen)
    }

    /// Check that every direct dependency of `kind` is already resolved.
    ///
    /// Returns [`DagError::DependencyOrder`] listing the missing
    /// prerequisites otherwise.
    pub fn check_ready<F>(&self, kind: ProductKind, is_resolved: F) -> DagResult<()>
    where
        F: Fn(ProductKind) -> bool,
    {
        let missing: Vec<ProductKind> = self
            .dependencies(kind)?
            .iter()
            .copied()
            .filter(|dep| !is_resolved(*dep))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DagError::DependencyOrder { kind, missing })
        }
    }

    /// Kinds in dependency order (Kahn's algorithm).
    ///
    /// Ties are broken by [`ProductKind`] ordering, so the output is
    /// deterministic. Kinds caught in a cycle are omitted; use
    /// [`validate`](Self::validate) to detect that case.
    pub fn topological_order(&self) -> Vec<ProductKind> {
        let mut in_degree: BTreeMap<ProductKind, usize> = self
            .nodes
            .iter()
            .map(|(kind, deps)| (*kind, deps.len()))
            .collect();

        let mut ready: BTreeSet<ProductKind> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(kind, _)| *kind)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(current) = ready.pop_first() {
            result.push(current);
            for child in self.dependents(current) {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }
        result
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    /// Verify structural invariants: closed and acyclic.
    pub fn validate(&self) -> DagResult<()> {
        for (kind, deps) in &self.nodes {
            for dep in deps {
                if !self.nodes.contains_key(dep) {
                    return Err(DagError::DanglingDependency {
                        kind: *kind,
                        dependency: *dep,
                    });
                }
            }
        }

        let ordered = self.topological_order();
        if ordered.len() != self.nodes.len() {
            let stuck = self
                .nodes
                .keys()
                .find(|k| !ordered.contains(k))
                .copied()
                .unwrap_or(ProductKind::Bias);
            return Err(DagError::CycleDetected(stuck));
        }
        Ok(())
    }
}
