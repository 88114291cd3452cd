use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use nest_core::numeric::LN_10;
use nest_core::{log_sum_exp, weighted_mean_std, LOG_ZERO};
use nest_model::{Model, Problem};
use sha2::{Digest, Sha256};

use crate::walker::Walker;

/// A discarded walker, frozen with its posterior weight.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Identifier of the walker it came from.
    pub id: usize,
    /// Identifier of that walker's parent.
    pub parent: Option<usize>,
    /// Iteration at which the walker was created.
    pub start: usize,
    /// Model the parameters belong to.
    pub model: Arc<dyn Model>,
    /// Model parameters.
    pub params: Vec<f64>,
    /// Nuisance parameters, empty unless the problem has errors in x.
    pub nuisance: Vec<f64>,
    /// Hyperparameters.
    pub hypars: Vec<f64>,
    /// Log likelihood.
    pub log_l: f64,
    /// Log weight; normalized once the run has finished.
    pub log_w: f64,
}

impl Sample {
    /// Freezes a walker with log weight `log_w`.
    pub fn from_walker(walker: &Walker, log_w: f64) -> Self {
        Self {
            id: walker.id,
            parent: walker.parent,
            start: walker.start,
            model: Arc::clone(walker.problem.model()),
            params: walker.model_params().to_vec(),
            nuisance: walker.nuisance().to_vec(),
            hypars: walker.hypars.clone(),
            log_l: walker.log_l,
            log_w,
        }
    }

    /// Linear weight.
    pub fn weight(&self) -> f64 {
        self.log_w.exp()
    }
}

/// Posterior samples in the order they were discarded, plus the evidence.
#[derive(Debug, Clone)]
pub struct SampleList {
    samples: Vec<Sample>,
    log_z: f64,
    info: f64,
    circular: Vec<Option<(f64, f64)>>,
}

impl Default for SampleList {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            log_z: LOG_ZERO,
            info: 0.0,
            circular: Vec::new(),
        }
    }
}

impl SampleList {
    /// An empty list; circular model parameters are taken from `problem`.
    pub fn new(problem: &Problem) -> Self {
        let circular = (0..problem.nmodel())
            .map(|k| {
                let prior = problem.prior(k)?;
                let period = prior.period()?;
                let lo = prior.limits().map_or(0.0, |l| l[0]);
                Some((lo, period))
            })
            .collect();
        Self {
            circular,
            ..Self::default()
        }
    }

    /// Appends a sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates in discard order.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Sample at `index`.
    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    /// The samples as a slice.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub(crate) fn set_evidence(&mut self, log_z: f64, info: f64) {
        self.log_z = log_z;
        self.info = info;
    }

    /// Natural log of the evidence.
    pub fn log_z(&self) -> f64 {
        self.log_z
    }

    /// Information H in nats.
    pub fn info(&self) -> f64 {
        self.info
    }

    /// 10-log of the evidence.
    pub fn evidence(&self) -> f64 {
        self.log_z / LN_10
    }

    /// Rescales the log weights so that the weights sum to one.
    pub fn normalize(&mut self) {
        let log_ws: Vec<f64> = self.samples.iter().map(|s| s.log_w).collect();
        let total = log_sum_exp(&log_ws);
        if !total.is_finite() {
            return;
        }
        for sample in &mut self.samples {
            sample.log_w -= total;
        }
    }

    /// Trims samples from whichever end has the lower weight until at most
    /// `max` remain, so the list stays a contiguous stretch of the run.
    pub fn weed(&mut self, max: usize) {
        let excess = self.samples.len().saturating_sub(max);
        if excess == 0 {
            return;
        }
        let (mut lo, mut hi) = (0, self.samples.len());
        for _ in 0..excess {
            if self.samples[lo].log_w <= self.samples[hi - 1].log_w {
                lo += 1;
            } else {
                hi -= 1;
            }
        }
        self.samples.truncate(hi);
        self.samples.drain(..lo);
    }

    /// Linear weights in discard order.
    pub fn weights(&self) -> Vec<f64> {
        self.samples.iter().map(Sample::weight).collect()
    }

    /// Weighted means of the model parameters.
    ///
    /// With a dynamic model only samples of the most probable parameter
    /// count take part. Circular parameters use the circular mean.
    pub fn parameters(&self) -> Vec<f64> {
        self.model_moments().0
    }

    /// Weighted standard deviations of the model parameters.
    pub fn stdevs(&self) -> Vec<f64> {
        self.model_moments().1
    }

    /// Weighted means of the hyperparameters.
    pub fn hypars(&self) -> Vec<f64> {
        self.moments(|s| &s.hypars, |_| None).0
    }

    /// Weighted standard deviations of the hyperparameters.
    pub fn hyper_stdevs(&self) -> Vec<f64> {
        self.moments(|s| &s.hypars, |_| None).1
    }

    /// Weighted means of the nuisance parameters.
    pub fn nuisance(&self) -> Vec<f64> {
        self.moments(|s| &s.nuisance, |_| None).0
    }

    fn model_moments(&self) -> (Vec<f64>, Vec<f64>) {
        let Some(npars) = self.dominant_npars() else {
            return (Vec::new(), Vec::new());
        };
        let samples: Vec<&Sample> = self.samples.iter().filter(|s| s.params.len() == npars).collect();
        moments_of(&samples, |s| &s.params, |k| self.circular.get(k).copied().flatten())
    }

    fn moments<F, C>(&self, values: F, circular: C) -> (Vec<f64>, Vec<f64>)
    where
        F: Fn(&Sample) -> &Vec<f64>,
        C: Fn(usize) -> Option<(f64, f64)>,
    {
        let samples: Vec<&Sample> = self.samples.iter().collect();
        moments_of(&samples, values, circular)
    }

    fn dominant_npars(&self) -> Option<usize> {
        self.weights_by_npars()
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(npars, _)| npars)
    }

    /// Summed weight per model parameter count.
    pub fn weights_by_npars(&self) -> BTreeMap<usize, f64> {
        let mut totals = BTreeMap::new();
        for sample in &self.samples {
            *totals.entry(sample.params.len()).or_insert(0.0) += sample.weight();
        }
        totals
    }

    /// First sample at which the cumulative weight reaches one half.
    pub fn median_index(&self) -> Option<usize> {
        let total: f64 = self.weights().iter().sum();
        let mut running = 0.0;
        for (index, sample) in self.samples.iter().enumerate() {
            running += sample.weight();
            if running >= 0.5 * total {
                return Some(index);
            }
        }
        None
    }

    /// Sample with the largest weight.
    pub fn modus_index(&self) -> Option<usize> {
        self.argmax(|s| s.log_w)
    }

    /// Sample with the largest likelihood.
    pub fn max_likelihood_index(&self) -> Option<usize> {
        self.argmax(|s| s.log_l)
    }

    fn argmax(&self, key: impl Fn(&Sample) -> f64) -> Option<usize> {
        self.samples
            .iter()
            .enumerate()
            .max_by(|a, b| key(a.1).total_cmp(&key(b.1)))
            .map(|(index, _)| index)
    }

    /// Weighted average of the model results at `x` over all samples.
    pub fn average(&self, x: &[f64]) -> Vec<f64> {
        let mut sum: Vec<f64> = Vec::new();
        let mut total = 0.0;
        for sample in &self.samples {
            let w = sample.weight();
            let result = sample.model.result(x, &sample.params);
            if sum.is_empty() {
                sum = vec![0.0; result.len()];
            }
            for (acc, r) in sum.iter_mut().zip(&result) {
                *acc += w * r;
            }
            total += w;
        }
        if total > 0.0 {
            sum.iter_mut().for_each(|v| *v /= total);
        }
        sum
    }

    /// Content hash over identifiers, parameters and weights.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.samples.len() as u64).to_le_bytes());
        for sample in &self.samples {
            hasher.update((sample.id as u64).to_le_bytes());
            hasher.update((sample.params.len() as u64).to_le_bytes());
            for value in sample.params.iter().chain(&sample.nuisance).chain(&sample.hypars) {
                hasher.update(value.to_bits().to_le_bytes());
            }
            hasher.update(sample.log_l.to_bits().to_le_bytes());
            hasher.update(sample.log_w.to_bits().to_le_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        format!("samples-{hex}")
    }
}

fn moments_of<F, C>(samples: &[&Sample], values: F, circular: C) -> (Vec<f64>, Vec<f64>)
where
    F: Fn(&Sample) -> &Vec<f64>,
    C: Fn(usize) -> Option<(f64, f64)>,
{
    let Some(width) = samples.iter().map(|s| values(s).len()).min() else {
        return (Vec::new(), Vec::new());
    };
    let weights: Vec<f64> = samples.iter().map(|s| s.weight()).collect();
    let mut means = Vec::with_capacity(width);
    let mut stdevs = Vec::with_capacity(width);
    for k in 0..width {
        let column: Vec<f64> = samples.iter().map(|s| values(s)[k]).collect();
        let (mean, std) = match circular(k) {
            Some((lo, period)) => circular_mean_std(&column, &weights, lo, period),
            None => weighted_mean_std(&column, &weights),
        };
        means.push(mean);
        stdevs.push(std);
    }
    (means, stdevs)
}

fn circular_mean_std(values: &[f64], weights: &[f64], lo: f64, period: f64) -> (f64, f64) {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let (mut s, mut c) = (0.0, 0.0);
    for (v, w) in values.iter().zip(weights) {
        let angle = TAU * (v - lo) / period;
        s += w * angle.sin();
        c += w * angle.cos();
    }
    let (s, c) = (s / total, c / total);
    let resultant = s.hypot(c).min(1.0);
    let mean = lo + (s.atan2(c) / TAU * period).rem_euclid(period);
    let std = if resultant > 0.0 {
        period / TAU * (-2.0 * resultant.ln()).sqrt()
    } else {
        f64::INFINITY
    };
    (mean, std)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nest_model::PolynomialModel;

    use super::{circular_mean_std, Sample, SampleList};

    fn sample(id: usize, log_w: f64) -> Sample {
        Sample {
            id,
            parent: None,
            start: id,
            model: Arc::new(PolynomialModel::new(0)),
            params: vec![0.0],
            nuisance: Vec::new(),
            hypars: Vec::new(),
            log_l: log_w,
            log_w,
        }
    }

    #[test]
    fn weed_trims_the_lighter_end() {
        let mut list = SampleList::default();
        for (id, log_w) in [-9.0, -3.0, -20.0, -1.0, -2.0, -4.0, -5.0].into_iter().enumerate() {
            list.push(sample(id, log_w));
        }
        list.weed(4);
        let ids: Vec<usize> = list.iter().map(|s| s.id).collect();
        // -9 goes first, then the tail -5 and -4; the light -20 inside stays.
        assert_eq!(ids, vec![1, 2, 3, 4]);
        list.weed(10);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn circular_mean_straddles_the_wrap() {
        let (mean, std) = circular_mean_std(&[350.0, 10.0], &[1.0, 1.0], 0.0, 360.0);
        assert!(mean.abs() < 1e-9 || (mean - 360.0).abs() < 1e-9);
        assert!(std > 0.0 && std < 20.0);
    }
}
