use std::sync::Arc;

use nest_core::NestResult;
use nest_model::{model_chain, Model};

use super::{Engine, EngineContext};
use crate::walker::Walker;

/// Perturbs the internal structure of a modifiable model, one location at a
/// time, keeping the parameters where they are.
pub(crate) fn execute(
    engine: &mut Engine,
    walker: &mut Walker,
    low_l: f64,
    ctx: &EngineContext<'_>,
) -> NestResult<usize> {
    let nvary = {
        let full = walker.problem.model();
        model_chain(full.as_ref())
            .into_iter()
            .find(|link| link.model.is_modifiable())
            .map_or(0, |link| link.model.nvary())
    };
    let mut moves = 0;
    for location in 0..nvary {
        let full: Arc<dyn Model> = Arc::clone(walker.problem.model());
        let Some(link) = model_chain(full.as_ref())
            .into_iter()
            .find(|link| link.model.is_modifiable())
        else {
            break;
        };
        let Some(varied) = link.model.vary(location, engine.rng()) else {
            continue;
        };
        let model = if full.components().is_empty() {
            varied
        } else {
            match full.with_component(link.index, varied) {
                Some(model) => model,
                None => continue,
            }
        };
        let problem = walker.problem.with_model(model);
        let (params, hypars) = (walker.params.clone(), walker.hypars.clone());
        if let Some(trial) = engine.try_position(walker, &problem, params, hypars, low_l, ctx) {
            walker.problem = problem;
            engine.commit(walker, trial, ctx);
            moves += 1;
        }
    }
    Ok(moves)
}
