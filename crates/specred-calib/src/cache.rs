//! The per-run calibration cache.
//!
//! [`CalibrationCache::get_or_compute`] resolves one `(setup, kind)` pair:
//!
//! 1. A product already in the in-memory record is returned as is.
//! 2. Otherwise, when the master mode reads the store, a persisted master
//!    is loaded and recorded.
//! 3. Otherwise the caller's step runs against its declared upstream
//!    products, and the result is recorded and optionally saved.
//!
//! A corrupt master poisons its setup for the rest of the run. Every other
//! store failure degrades to a miss.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use specred_dag::{DagError, DependencyGraph};
use specred_store::{MasterKey, MasterStore, StoreError};
use specred_types::{
    ArcImage, BadPixelMask, BiasFrame, CalibProduct, FlatField, ProductKind, SetupId, SlitTrace,
    TiltSolution, TypeError, WaveSolution,
};

use crate::bundle::CalibrationBundle;
use crate::error::{CalibError, CalibResult};
use crate::policy::{MasterMode, MasterPolicy};
use crate::record::CalibRecord;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Per-kind counters of how products were resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    hits: BTreeMap<ProductKind, usize>,
    loads: BTreeMap<ProductKind, usize>,
    computes: BTreeMap<ProductKind, usize>,
}

impl CacheStats {
    /// In-memory hits for `kind`.
    pub fn hits(&self, kind: ProductKind) -> usize {
        self.hits.get(&kind).copied().unwrap_or(0)
    }

    /// Masters loaded from the store for `kind`.
    pub fn loads(&self, kind: ProductKind) -> usize {
        self.loads.get(&kind).copied().unwrap_or(0)
    }

    /// Step invocations for `kind`.
    pub fn computes(&self, kind: ProductKind) -> usize {
        self.computes.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.values().sum()
    }

    pub fn total_loads(&self) -> usize {
        self.loads.values().sum()
    }

    pub fn total_computes(&self) -> usize {
        self.computes.values().sum()
    }

    fn bump(map: &mut BTreeMap<ProductKind, usize>, kind: ProductKind) {
        *map.entry(kind).or_insert(0) += 1;
    }
}

// ---------------------------------------------------------------------------
// Upstream view
// ---------------------------------------------------------------------------

/// Read-only view of the products a step declares as dependencies.
///
/// Reading a kind outside the declared set fails with
/// [`DagError::UndeclaredDependency`], so the graph stays the single
/// source of truth for what a step consumes.
pub struct Upstream<'a> {
    kind: ProductKind,
    declared: &'a [ProductKind],
    record: &'a CalibRecord,
}

impl<'a> Upstream<'a> {
    /// The kind being computed.
    pub fn kind(&self) -> ProductKind {
        self.kind
    }

    pub fn get(&self, dependency: ProductKind) -> CalibResult<&'a CalibProduct> {
        if !self.declared.contains(&dependency) {
            return Err(DagError::UndeclaredDependency {
                kind: self.kind,
                dependency,
            }
            .into());
        }
        self.record.get(dependency).ok_or_else(|| {
            DagError::DependencyOrder {
                kind: self.kind,
                missing: vec![dependency],
            }
            .into()
        })
    }

    pub fn bias(&self) -> CalibResult<&'a Arc<BiasFrame>> {
        Ok(self.get(ProductKind::Bias)?.as_bias()?)
    }

    pub fn arc(&self) -> CalibResult<&'a Arc<ArcImage>> {
        Ok(self.get(ProductKind::Arc)?.as_arc()?)
    }

    pub fn bpm(&self) -> CalibResult<&'a Arc<BadPixelMask>> {
        Ok(self.get(ProductKind::Bpm)?.as_bpm()?)
    }

    pub fn trace(&self) -> CalibResult<&'a Arc<SlitTrace>> {
        Ok(self.get(ProductKind::Trace)?.as_trace()?)
    }

    pub fn tilt(&self) -> CalibResult<&'a Arc<TiltSolution>> {
        Ok(self.get(ProductKind::Tilt)?.as_tilt()?)
    }

    pub fn flat(&self) -> CalibResult<&'a Arc<FlatField>> {
        Ok(self.get(ProductKind::Flat)?.as_flat()?)
    }

    pub fn wave(&self) -> CalibResult<&'a Arc<WaveSolution>> {
        Ok(self.get(ProductKind::Wave)?.as_wave()?)
    }
}

// ---------------------------------------------------------------------------
// CalibrationCache
// ---------------------------------------------------------------------------

/// Memoized calibration products for one run, keyed by setup.
///
/// The cache is an explicit value owned by the orchestrator; nothing
/// survives between runs except what is saved to the master store.
pub struct CalibrationCache {
    graph: DependencyGraph,
    policy: MasterPolicy,
    store: Option<Arc<dyn MasterStore>>,
    records: HashMap<SetupId, CalibRecord>,
    /// Setups disqualified by a corrupt master, with the offending kind.
    poisoned: HashMap<SetupId, ProductKind>,
    stats: CacheStats,
}

impl CalibrationCache {
    /// Cache over the standard calibration chain.
    pub fn new(policy: MasterPolicy) -> CalibResult<Self> {
        Self::with_graph(DependencyGraph::standard(), policy)
    }

    /// Cache over a caller-supplied graph, validated up front.
    pub fn with_graph(graph: DependencyGraph, policy: MasterPolicy) -> CalibResult<Self> {
        graph.validate()?;
        Ok(Self {
            graph,
            policy,
            store: None,
            records: HashMap::new(),
            poisoned: HashMap::new(),
            stats: CacheStats::default(),
        })
    }

    /// Attach a master store for loads and saves.
    pub fn with_store(mut self, store: Arc<dyn MasterStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn policy(&self) -> MasterPolicy {
        self.policy
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Record for `setup`, if anything has been resolved for it.
    pub fn record(&self, setup: &SetupId) -> Option<&CalibRecord> {
        self.records.get(setup)
    }

    /// Cached product, without consulting the store or computing.
    pub fn get(&self, setup: &SetupId, kind: ProductKind) -> Option<CalibProduct> {
        self.records.get(setup)?.get(kind).cloned()
    }

    pub fn is_poisoned(&self, setup: &SetupId) -> bool {
        self.poisoned.contains_key(setup)
    }

    /// Number of setups requested so far.
    pub fn setup_count(&self) -> usize {
        self.records.len()
    }

    /// Resolve `(setup, kind)`, invoking `compute` at most once per run.
    ///
    /// `compute` receives the declared upstream products of `kind`. Calling
    /// this before those are resolved is a [`DagError::DependencyOrder`].
    pub fn get_or_compute<F>(
        &mut self,
        setup: &SetupId,
        kind: ProductKind,
        compute: F,
    ) -> CalibResult<CalibProduct>
    where
        F: FnOnce(&Upstream<'_>) -> CalibResult<CalibProduct>,
    {
        if let Some(bad) = self.poisoned.get(setup) {
            return Err(CalibError::SetupPoisoned {
                setup: setup.clone(),
                kind: *bad,
            });
        }

        let record = self.records.entry(setup.clone()).or_default();
        if let Some(hit) = record.get(kind) {
            CacheStats::bump(&mut self.stats.hits, kind);
            debug!(%setup, %kind, "calibration cache hit");
            return Ok(hit.clone());
        }

        self.graph.check_ready(kind, |dep| record.contains(dep))?;

        let key = MasterKey::new(kind, setup.clone());
        if self.policy.mode.reads_store() {
            let loaded = match &self.store {
                Some(store) => match store.load(&key) {
                    Ok(found) => found,
                    Err(StoreError::Corrupt { reason, .. }) => {
                        error!(%setup, %kind, %reason, "corrupt master; abandoning setup");
                        self.poisoned.insert(setup.clone(), kind);
                        return Err(CalibError::CorruptMaster {
                            setup: setup.clone(),
                            kind,
                            reason,
                        });
                    }
                    Err(e) => {
                        warn!(%setup, %kind, error = %e, "master store failed; treating as miss");
                        None
                    }
                },
                None => None,
            };

            match loaded {
                Some(product) => {
                    CacheStats::bump(&mut self.stats.loads, kind);
                    info!(%setup, %kind, master = %key, "loaded master");
                    return Ok(record.insert(product));
                }
                None if self.policy.mode == MasterMode::Force => {
                    return Err(CalibError::MissingMaster {
                        setup: setup.clone(),
                        kind,
                    });
                }
                None => {}
            }
        }

        let upstream = Upstream {
            kind,
            declared: self.graph.dependencies(kind)?,
            record: &*record,
        };
        let product = compute(&upstream)?;
        if product.kind() != kind {
            return Err(TypeError::KindMismatch {
                expected: kind,
                actual: product.kind(),
            }
            .into());
        }
        CacheStats::bump(&mut self.stats.computes, kind);
        info!(%setup, %kind, "computed calibration product");

        if self.policy.save {
            if let Some(store) = &self.store {
                if let Err(e) = store.save(&key, &product) {
                    warn!(%setup, %kind, error = %e, "failed to save master");
                }
            }
        }

        Ok(record.insert(product))
    }

    /// Immutable bundle of every product resolved for `setup`.
    pub fn bundle(&self, setup: &SetupId) -> CalibResult<CalibrationBundle> {
        if let Some(bad) = self.poisoned.get(setup) {
            return Err(CalibError::SetupPoisoned {
                setup: setup.clone(),
                kind: *bad,
            });
        }
        let empty = CalibRecord::new();
        let record = self.records.get(setup).unwrap_or(&empty);
        CalibrationBundle::from_record(setup.clone(), record)
    }
}

impl std::fmt::Debug for CalibrationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationCache")
            .field("policy", &self.policy)
            .field("store", &self.store.as_ref().map(|s| s.describe()))
            .field("setups", &self.records.len())
            .field("poisoned", &self.poisoned.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use proptest::prelude::*;
    use specred_store::{encode_master, DirectoryMasterStore, InMemoryMasterStore};
    use specred_types::DetectorId;
    use std::cell::Cell;

    fn setup(config: &str) -> SetupId {
        SetupId::derive(config, DetectorId::new(1).unwrap())
    }

    fn bias() -> CalibProduct {
        CalibProduct::from(BiasFrame::Image(Array2::from_elem((4, 4), 100.0)))
    }

    fn arc() -> CalibProduct {
        CalibProduct::from(ArcImage {
            image: Array2::from_elem((4, 4), 7.0),
        })
    }

    fn rebuild() -> CalibrationCache {
        CalibrationCache::new(MasterPolicy::default()).unwrap()
    }

    #[test]
    fn second_request_is_a_hit() {
        let mut cache = rebuild();
        let calls = Cell::new(0);
        let first = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| {
                calls.set(calls.get() + 1);
                Ok(bias())
            })
            .unwrap();
        let second = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| {
                calls.set(calls.get() + 1);
                Ok(bias())
            })
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert!(first.ptr_eq(&second));
        assert_eq!(cache.stats().hits(ProductKind::Bias), 1);
        assert_eq!(cache.stats().computes(ProductKind::Bias), 1);
    }

    #[test]
    fn setups_do_not_share_products() {
        let mut cache = rebuild();
        cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
        cache
            .get_or_compute(&setup("B"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
        assert_eq!(cache.stats().computes(ProductKind::Bias), 2);
        assert_eq!(cache.setup_count(), 2);
    }

    #[test]
    fn step_before_dependency_is_order_violation() {
        let mut cache = rebuild();
        let err = cache
            .get_or_compute(&setup("A"), ProductKind::Arc, |_| Ok(arc()))
            .unwrap_err();
        assert!(err.is_contract_violation());
        match err {
            CalibError::Dependency(DagError::DependencyOrder { kind, missing }) => {
                assert_eq!(kind, ProductKind::Arc);
                assert_eq!(missing, vec![ProductKind::Bias]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cache.stats().total_computes(), 0);
    }

    #[test]
    fn upstream_exposes_declared_dependencies_only() {
        let mut cache = rebuild();
        let s = setup("A");
        cache
            .get_or_compute(&s, ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
        cache
            .get_or_compute(&s, ProductKind::Arc, |up| {
                assert_eq!(up.kind(), ProductKind::Arc);
                assert!(up.bias()?.image().is_some());
                let err = up.trace().unwrap_err();
                assert!(err.is_contract_violation());
                Ok(arc())
            })
            .unwrap();
    }

    #[test]
    fn wrong_kind_from_step_is_rejected() {
        let mut cache = rebuild();
        let err = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(arc()))
            .unwrap_err();
        assert!(matches!(err, CalibError::Type(TypeError::KindMismatch { .. })));
        assert!(cache.get(&setup("A"), ProductKind::Bias).is_none());
    }

    #[test]
    fn failed_step_records_nothing() {
        let mut cache = rebuild();
        let s = setup("A");
        let err = cache
            .get_or_compute(&s, ProductKind::Bias, |_| {
                Err(CalibError::Step {
                    setup: s.clone(),
                    kind: ProductKind::Bias,
                    source: crate::StepError::Failed("no bias frames".into()),
                })
            })
            .unwrap_err();
        assert!(err.to_string().contains("no bias frames"));
        let again = cache.get_or_compute(&s, ProductKind::Bias, |_| Ok(bias()));
        assert!(again.is_ok());
    }

    #[test]
    fn reuse_loads_master_instead_of_computing() {
        let store = Arc::new(InMemoryMasterStore::new());
        store
            .save(&MasterKey::new(ProductKind::Bias, setup("A")), &bias())
            .unwrap();
        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Reuse, false))
            .unwrap()
            .with_store(store.clone());

        let product = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| {
                panic!("must not compute when a master exists")
            })
            .unwrap();
        assert_eq!(product, bias());
        assert_eq!(cache.stats().loads(ProductKind::Bias), 1);
        assert_eq!(cache.stats().total_computes(), 0);

        cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| unreachable!())
            .unwrap();
        assert_eq!(store.load_count(), 1, "hits must not touch the store");
    }

    #[test]
    fn rebuild_ignores_store() {
        let store = Arc::new(InMemoryMasterStore::new());
        store
            .save(&MasterKey::new(ProductKind::Bias, setup("A")), &bias())
            .unwrap();
        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Rebuild, false))
            .unwrap()
            .with_store(store.clone());
        cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| {
                Ok(CalibProduct::from(BiasFrame::Overscan))
            })
            .unwrap();
        assert_eq!(store.load_count(), 0);
        assert_eq!(cache.stats().computes(ProductKind::Bias), 1);
    }

    #[test]
    fn reuse_miss_computes_and_saves() {
        let store = Arc::new(InMemoryMasterStore::new());
        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Reuse, true))
            .unwrap()
            .with_store(store.clone());
        cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(
            store.keys(),
            vec![MasterKey::new(ProductKind::Bias, setup("A"))]
        );
    }

    #[test]
    fn force_without_master_fails() {
        let store = Arc::new(InMemoryMasterStore::new());
        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Force, false))
            .unwrap()
            .with_store(store);
        let err = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap_err();
        assert!(matches!(err, CalibError::MissingMaster { .. }));
        assert!(!cache.is_poisoned(&setup("A")));
    }

    #[test]
    fn corrupt_master_poisons_only_its_setup() {
        let store = Arc::new(InMemoryMasterStore::new());
        store.insert_raw(
            MasterKey::new(ProductKind::Bias, setup("A")),
            b"garbage".to_vec(),
        );
        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Reuse, false))
            .unwrap()
            .with_store(store);

        let err = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap_err();
        assert!(matches!(err, CalibError::CorruptMaster { .. }));
        assert!(err.is_setup_fatal());
        assert!(cache.is_poisoned(&setup("A")));

        let later = cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap_err();
        assert!(matches!(later, CalibError::SetupPoisoned { .. }));
        assert!(cache.bundle(&setup("A")).is_err());

        cache
            .get_or_compute(&setup("B"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
    }

    #[test]
    fn unreadable_store_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryMasterStore::open(dir.path()).unwrap();
        let key = MasterKey::new(ProductKind::Bias, setup("A"));
        // A directory where the master file should be makes the read fail
        // with an I/O error rather than a decode error.
        std::fs::create_dir(store.path_for(&key)).unwrap();

        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Reuse, false))
            .unwrap()
            .with_store(Arc::new(store));
        cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
        assert_eq!(cache.stats().computes(ProductKind::Bias), 1);
        assert!(!cache.is_poisoned(&setup("A")));
    }

    #[test]
    fn loaded_master_with_valid_frame_is_recorded() {
        let store = Arc::new(InMemoryMasterStore::new());
        let key = MasterKey::new(ProductKind::Arc, setup("A"));
        store.insert_raw(key, encode_master(&arc()).unwrap());
        let mut cache = CalibrationCache::new(MasterPolicy::new(MasterMode::Reuse, false))
            .unwrap()
            .with_store(store);
        cache
            .get_or_compute(&setup("A"), ProductKind::Bias, |_| Ok(bias()))
            .unwrap();
        cache
            .get_or_compute(&setup("A"), ProductKind::Arc, |_| unreachable!())
            .unwrap();
        assert_eq!(cache.get(&setup("A"), ProductKind::Arc), Some(arc()));
    }

    #[test]
    fn invalid_graph_is_rejected_at_construction() {
        // Graphs deserialized from configuration bypass add_node checks.
        let cyclic: DependencyGraph = serde_json::from_str(
            r#"{"nodes":{"bias":["arc"],"arc":["bias"]},"dependents":{"bias":["arc"],"arc":["bias"]}}"#,
        )
        .unwrap();
        let err = CalibrationCache::with_graph(cyclic, MasterPolicy::default()).unwrap_err();
        assert!(matches!(err, CalibError::Dependency(DagError::CycleDetected(_))));
    }

    fn flat_graph() -> DependencyGraph {
        DependencyGraph::from_edges(ProductKind::ALL.into_iter().map(|k| (k, Vec::new()))).unwrap()
    }

    fn product_for(kind: ProductKind) -> CalibProduct {
        let grid = Array2::<f64>::zeros((2, 2));
        match kind {
            ProductKind::Bias => CalibProduct::from(BiasFrame::Overscan),
            ProductKind::Arc => arc(),
            ProductKind::Bpm => CalibProduct::from(BadPixelMask {
                mask: Array2::zeros((2, 2)),
            }),
            ProductKind::Trace => CalibProduct::from(SlitTrace {
                lcen: grid.clone(),
                rcen: grid.clone(),
                pixcen: Array2::zeros((2, 2)),
                pixwid: vec![1, 1],
                slitpix: Array2::zeros((2, 2)),
            }),
            ProductKind::Tilt => CalibProduct::from(TiltSolution {
                tilts: grid,
                satmask: Array2::zeros((2, 2)),
            }),
            ProductKind::Flat => CalibProduct::from(FlatField {
                pixelflat_norm: grid.clone(),
                slit_profiles: grid,
            }),
            ProductKind::Wave => CalibProduct::from(WaveSolution {
                coefficients: vec![vec![4000.0, 1.5]],
                rms: vec![0.05],
                wave_map: grid,
            }),
        }
    }

    proptest! {
        #[test]
        fn computes_once_per_distinct_pair(
            requests in proptest::collection::vec((0usize..3, 0usize..7), 1..60)
        ) {
            let mut cache =
                CalibrationCache::with_graph(flat_graph(), MasterPolicy::default()).unwrap();
            let configs = ["A", "B", "C"];
            let mut first_seen: HashMap<(usize, usize), CalibProduct> = HashMap::new();

            for (s, k) in &requests {
                let kind = ProductKind::ALL[*k];
                let product = cache
                    .get_or_compute(&setup(configs[*s]), kind, |_| Ok(product_for(kind)))
                    .unwrap();
                let first = first_seen.entry((*s, *k)).or_insert_with(|| product.clone());
                prop_assert!(first.ptr_eq(&product));
            }

            prop_assert_eq!(cache.stats().total_computes(), first_seen.len());
            prop_assert_eq!(
                cache.stats().total_hits(),
                requests.len() - first_seen.len()
            );
        }
    }
}
