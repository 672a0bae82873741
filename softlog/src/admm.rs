//! Consensus optimization with the alternating direction method of multipliers.
//!
//! Each iteration runs three phases in strict order: every term minimizes its augmented
//! objective over its own local variables (parallel, no shared mutable state), then each
//! consensus variable becomes the clipped mean of its freshly minimized locals, then the
//! Lagrange multipliers absorb the remaining disagreement. The consensus phase must only
//! start after every minimization task finished; the parallel iterator calls below return
//! only once all tasks completed, which is exactly that barrier.
use log::{debug, info};
use partial_ref::{partial, PartialRef};
use rayon::prelude::*;

use crate::config::{AdmmConfig, ConfigError};
use crate::context::{AtomsP, Context, ReasonerP, TermStoreP};
use crate::state::ReasonerState;
use crate::term::store::{GlobalVars, LocalVarLoc, TermStore};
use crate::term::Term;

/// The consensus reasoner.
///
/// Holds the validated configuration and the iteration statistics of the last run. The
/// optimization state itself (locals, multipliers, consensus values) lives in the term
/// store.
pub struct Reasoner {
    config: AdmmConfig,
    state: ReasonerState,
    iterations: u64,
    primal_residual: f64,
    dual_residual: f64,
    prev_consensus: Vec<f64>,
}

impl Default for Reasoner {
    fn default() -> Reasoner {
        Reasoner {
            config: AdmmConfig::default(),
            state: ReasonerState::Initialized,
            iterations: 0,
            primal_residual: 0.0,
            dual_residual: 0.0,
            prev_consensus: vec![],
        }
    }
}

impl Reasoner {
    /// Creates a reasoner, validating the configuration.
    pub fn new(config: AdmmConfig) -> Result<Reasoner, ConfigError> {
        config.check()?;
        Ok(Reasoner {
            config,
            ..Reasoner::default()
        })
    }

    /// The reasoner's current state.
    pub fn state(&self) -> ReasonerState {
        self.state
    }

    /// Iterations performed by the last optimization run.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// RMS primal residual of the last iteration.
    pub fn primal_residual(&self) -> f64 {
        self.primal_residual
    }

    /// RMS consensus change of the last iteration.
    pub fn dual_residual(&self) -> f64 {
        self.dual_residual
    }

    /// The validated configuration.
    pub fn config(&self) -> &AdmmConfig {
        &self.config
    }
}

/// Runs the consensus optimization to a terminal state.
///
/// Starts from the current consensus values with zeroed multipliers, iterates until both
/// residuals drop below their epsilons or the iteration cap is reached, then writes the
/// final consensus values back to the unknown atoms. Returns the terminal state.
pub(crate) fn optimize(
    mut ctx: partial!(Context, mut TermStoreP, mut ReasonerP, mut AtomsP),
) -> ReasonerState {
    let (reasoner, mut ctx) = ctx.split_part_mut(ReasonerP);
    let (term_store, mut ctx) = ctx.split_part_mut(TermStoreP);

    let TermStore {
        terms, globals, ..
    } = term_store;

    reasoner.iterations = 0;
    reasoner.primal_residual = 0.0;
    reasoner.dual_residual = 0.0;

    if terms.is_empty() {
        reasoner.state = ReasonerState::Converged;
        info!("consensus optimization converged trivially: no terms");
        return reasoner.state;
    }

    reasoner.state = ReasonerState::Iterating;

    // Initial state: locals at their consensus values, multipliers at zero.
    for term in terms.iter_mut() {
        term.reset(&globals.consensus);
    }

    let local_count: usize = terms.iter().map(|term| term.arity()).sum();
    let global_count = globals.live_count();
    let step = reasoner.config.step_size;

    reasoner.prev_consensus.clear();
    reasoner
        .prev_consensus
        .extend_from_slice(&globals.consensus);

    while reasoner.state == ReasonerState::Iterating {
        reasoner.iterations += 1;

        iterate(terms, globals, step, &mut reasoner.prev_consensus);

        let primal_sq = dual_update(terms, &globals.consensus, step);
        let dual_sq: f64 = globals
            .consensus
            .par_iter()
            .zip(reasoner.prev_consensus.par_iter())
            .map(|(value, prev)| {
                let delta = value - prev;
                delta * delta
            })
            .sum();

        reasoner.primal_residual = (primal_sq / local_count as f64).sqrt();
        reasoner.dual_residual = (dual_sq / global_count.max(1) as f64).sqrt();

        debug!(
            "iteration {}: primal residual {:.3e}, dual residual {:.3e}",
            reasoner.iterations, reasoner.primal_residual, reasoner.dual_residual
        );

        if reasoner.primal_residual < reasoner.config.primal_epsilon
            && reasoner.dual_residual < reasoner.config.dual_epsilon
        {
            reasoner.state = ReasonerState::Converged;
        } else if reasoner.iterations >= reasoner.config.max_iterations {
            reasoner.state = ReasonerState::MaxIterationsReached;
        }
    }

    // Commit the consensus values to the unknown atoms. Atom values are never written
    // during the iterations; the loop operates on the local/consensus copies only.
    let atoms = ctx.part_mut(AtomsP);
    for (atom, value) in globals.live() {
        atoms.set_value(atom, value);
    }

    info!(
        "consensus optimization finished with {:?} after {} iterations \
         (primal residual {:.3e}, dual residual {:.3e})",
        reasoner.state, reasoner.iterations, reasoner.primal_residual, reasoner.dual_residual
    );

    reasoner.state
}

/// One minimization plus consensus-averaging round.
fn iterate(terms: &mut Vec<Term>, globals: &mut GlobalVars, step: f64, prev: &mut Vec<f64>) {
    // Local minimization: one task per term, each writing only its own locals. The
    // consensus array is immutable during this phase.
    {
        let consensus = &globals.consensus;
        terms
            .par_iter_mut()
            .for_each(|term| term.minimize(step, consensus));
    }

    // Full barrier above: every local value below is a freshly minimized one.
    prev.copy_from_slice(&globals.consensus);

    let GlobalVars {
        consensus,
        locations,
        ..
    } = globals;
    let locations: &[Vec<LocalVarLoc>] = locations;
    let terms: &[Term] = terms;

    consensus
        .par_iter_mut()
        .enumerate()
        .for_each(|(slot, value)| {
            let shadows = &locations[slot];
            if shadows.is_empty() {
                return;
            }
            let total: f64 = shadows
                .iter()
                .map(|loc| terms[loc.term()].locals()[loc.local()].value())
                .sum();
            // Consensus values stay within the atoms' legal range.
            *value = (total / shadows.len() as f64).max(0.0).min(1.0);
        });
}

/// Updates all multipliers and returns the summed squared primal residual.
fn dual_update(terms: &mut Vec<Term>, consensus: &[f64], step: f64) -> f64 {
    terms
        .par_iter_mut()
        .map(|term| {
            let mut acc = 0.0;
            for local in term.locals_mut().iter_mut() {
                let residual = local.update_lagrange(step, consensus[local.global().index()]);
                acc += residual * residual;
            }
            acc
        })
        .sum()
}
