use std::collections::BTreeMap;

use crate::walker::Walker;

/// Per-coordinate extent of the phantoms above a likelihood floor.
#[derive(Debug, Clone, PartialEq)]
pub struct PhantomBounds {
    /// Smallest value of each parameter.
    pub param_min: Vec<f64>,
    /// Largest value of each parameter.
    pub param_max: Vec<f64>,
    /// Smallest value of each hyperparameter.
    pub hyper_min: Vec<f64>,
    /// Largest value of each hyperparameter.
    pub hyper_max: Vec<f64>,
    /// Number of phantoms that contributed.
    pub count: usize,
}

/// Every accepted trial position, kept sorted by log likelihood.
///
/// Entries are stratified by parameter count so that dynamic models, whose
/// walkers differ in length, only ever compare like with like. Within a pass
/// the collection is read-only; trials are merged in after the pass.
#[derive(Debug, Clone, Default)]
pub struct PhantomCollection {
    strata: BTreeMap<usize, Vec<Walker>>,
}

impl PhantomCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of phantoms.
    pub fn len(&self) -> usize {
        self.strata.values().map(Vec::len).sum()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.strata.values().all(Vec::is_empty)
    }

    /// Inserts one phantom, keeping its stratum sorted.
    pub fn store(&mut self, walker: Walker) {
        let stratum = self.strata.entry(walker.params.len()).or_default();
        let at = stratum.partition_point(|w| w.log_l <= walker.log_l);
        stratum.insert(at, walker);
    }

    /// Inserts many phantoms.
    pub fn extend(&mut self, walkers: impl IntoIterator<Item = Walker>) {
        for walker in walkers {
            self.store(walker);
        }
    }

    /// Removes every phantom below `low_l`, returned worst first.
    pub fn prune(&mut self, low_l: f64) -> Vec<Walker> {
        let mut removed = Vec::new();
        for stratum in self.strata.values_mut() {
            let cut = stratum.partition_point(|w| w.log_l < low_l);
            removed.extend(stratum.drain(..cut));
        }
        self.strata.retain(|_, stratum| !stratum.is_empty());
        removed.sort_by(|a, b| a.log_l.total_cmp(&b.log_l));
        removed
    }

    /// Number of phantoms at or above `low_l`.
    pub fn count_above(&self, low_l: f64) -> usize {
        self.strata
            .values()
            .map(|s| s.len() - s.partition_point(|w| w.log_l < low_l))
            .sum()
    }

    /// The phantom with the highest log likelihood.
    pub fn best(&self) -> Option<&Walker> {
        self.strata
            .values()
            .filter_map(|s| s.last())
            .max_by(|a, b| a.log_l.total_cmp(&b.log_l))
    }

    /// Highest log likelihood seen, or minus infinity.
    pub fn best_log_l(&self) -> f64 {
        self.best().map_or(f64::NEG_INFINITY, |w| w.log_l)
    }

    /// Bounding box of the phantoms with `npars` parameters and logL >= `low_l`.
    pub fn bounds(&self, npars: usize, low_l: f64) -> Option<PhantomBounds> {
        let stratum = self.strata.get(&npars)?;
        let above = &stratum[stratum.partition_point(|w| w.log_l < low_l)..];
        let first = above.first()?;
        let mut bounds = PhantomBounds {
            param_min: first.params.clone(),
            param_max: first.params.clone(),
            hyper_min: first.hypars.clone(),
            hyper_max: first.hypars.clone(),
            count: above.len(),
        };
        for walker in &above[1..] {
            widen(&mut bounds.param_min, &mut bounds.param_max, &walker.params);
            widen(&mut bounds.hyper_min, &mut bounds.hyper_max, &walker.hypars);
        }
        Some(bounds)
    }

    /// Iterates over all phantoms, stratum by stratum.
    pub fn iter(&self) -> impl Iterator<Item = &Walker> {
        self.strata.values().flatten()
    }
}

fn widen(min: &mut [f64], max: &mut [f64], values: &[f64]) {
    for ((lo, hi), v) in min.iter_mut().zip(max.iter_mut()).zip(values) {
        *lo = lo.min(*v);
        *hi = hi.max(*v);
    }
}
