use std::collections::BTreeMap;

use specred_types::{CalibProduct, ProductKind};

/// Products resolved so far for one setup.
///
/// Entries are added monotonically and never evicted for the lifetime of
/// the run. A kind that is not present is `absent`.
#[derive(Clone, Debug, Default)]
pub struct CalibRecord {
    products: BTreeMap<ProductKind, CalibProduct>,
}

impl CalibRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ProductKind) -> Option<&CalibProduct> {
        self.products.get(&kind)
    }

    pub fn contains(&self, kind: ProductKind) -> bool {
        self.products.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Insert a product unless one is already present.
    ///
    /// Returns the product held afterwards, which is the earlier one when
    /// the kind was already resolved.
    pub(crate) fn insert(&mut self, product: CalibProduct) -> CalibProduct {
        self.products
            .entry(product.kind())
            .or_insert(product)
            .clone()
    }
}
