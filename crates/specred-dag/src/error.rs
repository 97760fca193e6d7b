//! Error types for the dependency graph.

use specred_types::ProductKind;

/// Errors that can occur while building or querying the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// A kind was declared twice.
    #[error("duplicate node: {0}")]
    DuplicateNode(ProductKind),

    /// A dependency points at a kind that is not declared.
    #[error("dangling dependency: {kind} depends on undeclared {dependency}")]
    DanglingDependency {
        /// The kind declaring the bad edge.
        kind: ProductKind,
        /// The undeclared dependency.
        dependency: ProductKind,
    },

    /// A cycle was detected, which violates the DAG invariant.
    #[error("cycle detected involving {0}")]
    CycleDetected(ProductKind),

    /// A kind was queried that the graph does not declare.
    #[error("kind not declared in dependency graph: {0}")]
    UnknownKind(ProductKind),

    /// A step read a product it does not declare as a dependency.
    #[error("undeclared dependency: {kind} step read {dependency}")]
    UndeclaredDependency {
        kind: ProductKind,
        dependency: ProductKind,
    },

    /// A step was invoked before its prerequisites were resolved.
    #[error("dependency order violated: {kind} requested before {missing:?}")]
    DependencyOrder {
        /// The kind whose step was invoked.
        kind: ProductKind,
        /// Prerequisites not yet available.
        missing: Vec<ProductKind>,
    },
}

/// Convenience alias for graph results.
pub type DagResult<T> = Result<T, DagError>;
