use std::fmt;
use std::sync::Arc;

use nest_core::RngHandle;

use crate::prior::Prior;

/// Relative step used by the numeric partial and derivative defaults.
const NUMERIC_STEP: f64 = 1.0e-7;

/// Outcome of a structural change to a dynamic model.
///
/// `at..at + count` is the parameter range that was inserted (grow) or
/// removed (shrink), relative to the model that produced the alteration.
#[derive(Debug, Clone)]
pub struct Alteration {
    /// The altered model.
    pub model: Arc<dyn Model>,
    /// First parameter slot affected.
    pub at: usize,
    /// Number of parameter slots inserted or removed.
    pub count: usize,
}

/// Contract the sampler needs from a parametric model.
///
/// `result` and `partial` operate on flattened outputs: for a model with
/// `ndout` outputs the value for datum `i` and output `o` sits at
/// `i * ndout + o`. `partial` returns one column per parameter.
pub trait Model: fmt::Debug + Send + Sync {
    /// Short human readable name.
    fn name(&self) -> String;

    /// Number of parameters.
    fn npars(&self) -> usize;

    /// Number of outputs per datum.
    fn ndout(&self) -> usize {
        1
    }

    /// Model values at `x` for `params`.
    fn result(&self, x: &[f64], params: &[f64]) -> Vec<f64>;

    /// Partial derivatives with respect to each parameter.
    fn partial(&self, x: &[f64], params: &[f64]) -> Vec<Vec<f64>> {
        numeric_partial(self, x, params)
    }

    /// Derivative of the (first) output with respect to `x`.
    fn derivative(&self, x: &[f64], params: &[f64]) -> Vec<f64> {
        numeric_derivative(self, x, params)
    }

    /// Prior of parameter `k`, if one was attached.
    fn prior(&self, k: usize) -> Option<&Prior>;

    /// True if the model is linear in its parameters.
    fn is_linear(&self) -> bool {
        false
    }

    /// Period of the output if it is cyclic (angles and the like).
    fn cyclic(&self) -> Option<f64> {
        None
    }

    /// True if the parameter count may change at runtime.
    fn is_dynamic(&self) -> bool {
        false
    }

    /// Number of components of a dynamic model.
    fn ncomp(&self) -> usize {
        0
    }

    /// Prior on the number of components of a dynamic model.
    fn grow_prior(&self) -> Option<&Prior> {
        None
    }

    /// Adds a component; `None` when the model cannot grow any further.
    fn grow(&self, _rng: &mut RngHandle) -> Option<Alteration> {
        None
    }

    /// Removes a component; `None` when the model cannot shrink any further.
    fn shrink(&self, _rng: &mut RngHandle) -> Option<Alteration> {
        None
    }

    /// True if the internal structure may vary while `npars` stays fixed.
    fn is_modifiable(&self) -> bool {
        false
    }

    /// Number of structural locations that [`Model::vary`] accepts.
    fn nvary(&self) -> usize {
        0
    }

    /// Returns a copy with the structure at `location` perturbed.
    fn vary(&self, _location: usize, _rng: &mut RngHandle) -> Option<Arc<dyn Model>> {
        None
    }

    /// Sub-models of a chain; empty for a leaf model.
    fn components(&self) -> Vec<&dyn Model> {
        Vec::new()
    }

    /// Returns a copy of a chain with component `index` replaced.
    fn with_component(&self, _index: usize, _component: Arc<dyn Model>) -> Option<Arc<dyn Model>> {
        None
    }
}

/// A component located inside a model chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink<'a> {
    /// Position of the component in the chain (0 for a leaf model).
    pub index: usize,
    /// Offset of the component's first parameter in the full parameter vector.
    pub offset: usize,
    /// The component itself.
    pub model: &'a dyn Model,
}

/// Walks a model chain and returns every component with its parameter offset.
pub fn model_chain(model: &dyn Model) -> Vec<ChainLink<'_>> {
    let components = model.components();
    if components.is_empty() {
        return vec![ChainLink {
            index: 0,
            offset: 0,
            model,
        }];
    }
    let mut offset = 0;
    components
        .into_iter()
        .enumerate()
        .map(|(index, component)| {
            let link = ChainLink {
                index,
                offset,
                model: component,
            };
            offset += component.npars();
            link
        })
        .collect()
}

/// Applies an alteration produced by a chain component to the full model.
///
/// Returns the new full model and the absolute slot range affected.
pub fn apply_alteration(
    full: &dyn Model,
    link: &ChainLink<'_>,
    alteration: Alteration,
) -> Option<Alteration> {
    let at = link.offset + alteration.at;
    let model = if full.components().is_empty() {
        alteration.model
    } else {
        full.with_component(link.index, alteration.model)?
    };
    Some(Alteration {
        model,
        at,
        count: alteration.count,
    })
}

/// Central-difference partial derivatives.
pub fn numeric_partial<M: Model + ?Sized>(model: &M, x: &[f64], params: &[f64]) -> Vec<Vec<f64>> {
    let mut work = params.to_vec();
    (0..params.len())
        .map(|k| {
            let h = NUMERIC_STEP * params[k].abs().max(1.0);
            work[k] = params[k] + h;
            let up = model.result(x, &work);
            work[k] = params[k] - h;
            let down = model.result(x, &work);
            work[k] = params[k];
            up.iter()
                .zip(&down)
                .map(|(u, d)| (u - d) / (2.0 * h))
                .collect()
        })
        .collect()
}

/// Central-difference derivative with respect to `x`.
pub fn numeric_derivative<M: Model + ?Sized>(model: &M, x: &[f64], params: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|&xi| {
            let h = NUMERIC_STEP * xi.abs().max(1.0);
            let up = model.result(&[xi + h], params);
            let down = model.result(&[xi - h], params);
            match (up.first(), down.first()) {
                (Some(u), Some(d)) => (u - d) / (2.0 * h),
                _ => 0.0,
            }
        })
        .collect()
}
