//! Moving-window exploration of the `(Q1, Q2)` grid.
//!
//! Each pass fits, in one parallel wave, every unexplored cell within
//! Chebyshev distance `depth` of the current best cell together with the
//! split/merge seeds that fitted neighbours have not proposed yet. The
//! window then recentres on the best cell. Exploration stops when the
//! best BICL has not improved for `max_steps_without_improvement`
//! passes, after `max_pass` passes, or when a pass has nothing to fit.

use crate::backend::TaskMap;
use crate::collection::{Coord, ModelCollection};
use crate::vem::Assignment;
use log::{debug, info};

/// Explore `collection` from `start` and return it with the new cells
pub fn explore<B: TaskMap>(
    mut collection: ModelCollection,
    start: Coord,
    depth: usize,
    max_pass: usize,
    max_steps_without_improvement: usize,
    backend: &B,
) -> ModelCollection {
    let mut center = collection.clamp(start);
    let mut best_bicl = collection.best_fit().map(|m| m.bicl());
    let mut stable = 0;

    for pass in 1..=max_pass {
        let mut tasks: Vec<(Coord, Assignment)> = vec![];
        for q in collection.window(center, depth) {
            if collection.cell(q).and_then(|c| c.best.as_ref()).is_none() {
                collection.mark_fitting(q);
                tasks.extend(collection.fresh_starts(q).into_iter().map(|a| (q, a)));
            }
            tasks.extend(collection.seeds_for(q).into_iter().map(|a| (q, a)));
        }

        if tasks.is_empty() {
            debug!("pass {}: nothing left to fit around {:?}", pass, center);
            break;
        }

        let num_tasks = tasks.len();
        let fitted = {
            let fitter = collection.fitter();
            backend.map(tasks, |(q, init)| (q, fitter.fit(init)))
        };
        for (q, model) in fitted {
            collection.offer(q, model);
        }

        let Some(best) = collection.store_criteria_and_best_fit() else {
            break;
        };
        let bicl = collection.best_fit().map(|m| m.bicl());

        let improved = match (best_bicl, bicl) {
            (Some(old), Some(new)) => new > old,
            (None, Some(_)) => true,
            _ => false,
        };

        info!(
            "pass {}: {} run(s), best {:?} BICL {:.4}",
            pass,
            num_tasks,
            best,
            bicl.unwrap_or(f64::NAN)
        );

        if improved {
            stable = 0;
            best_bicl = bicl;
        } else {
            stable += 1;
            if stable >= max_steps_without_improvement {
                debug!("no improvement for {} pass(es)", stable);
                break;
            }
        }
        center = best;
    }

    collection
}
