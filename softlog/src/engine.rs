//! Inference engine facade.
use anyhow::Error;
use log::{debug, info};
use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};
use thiserror::Error;

use softlog_model::{GroundKey, Model, RuleId};

use crate::admm::{self, Reasoner};
use crate::config::{AdmmConfig, ConfigError, GrounderConfig};
use crate::context::{clear_grounding, AtomsP, Context, GroundStoreP, ReasonerP, TermStoreP};
use crate::facts::FactStore;
use crate::ground;
use crate::state::ReasonerState;
use crate::term::generate;

/// Errors of the engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("rule {0:?} is not part of the model")]
    UnknownRule(RuleId),
    #[error("unknown atom {key} has no counterpart in the supervising data")]
    LatentVariable { key: GroundKey },
}

/// A grounding and consensus inference engine.
///
/// Drives the core pipeline: grounding reads the model and the fact store and fills the
/// ground rule store, term generation lowers ground rules into the term store, the
/// consensus reasoner optimizes the term store in place, and `commit` writes the solved
/// values back to the fact store. Incremental callers can retract and re-ground individual
/// rules between runs.
#[derive(Default)]
pub struct Engine {
    ctx: Box<Context>,
    grounder_config: GrounderConfig,
}

impl Engine {
    /// Create an engine with default configuration.
    pub fn new() -> Engine {
        Engine::default()
    }

    /// Create an engine with validated custom configuration.
    pub fn with_config(
        grounder_config: GrounderConfig,
        admm_config: AdmmConfig,
    ) -> Result<Engine, EngineError> {
        grounder_config.check()?;
        let reasoner = Reasoner::new(admm_config)?;

        let mut engine = Engine {
            grounder_config,
            ..Engine::default()
        };
        let mut ctx = engine.ctx.into_partial_ref_mut();
        *ctx.part_mut(ReasonerP) = reasoner;
        Ok(engine)
    }

    /// Grounds every rule of the model against the fact store.
    ///
    /// Returns the number of new ground rules. Grounding an unchanged model against an
    /// unchanged fact store a second time produces nothing.
    pub fn ground(&mut self, model: &Model, facts: &dyn FactStore) -> usize {
        info!("grounding model with {} rules", model.len());
        let mut ctx = self.ctx.into_partial_ref_mut();
        ground::ground_all(ctx.borrow(), &self.grounder_config, model, facts)
    }

    /// Grounds a single rule of the model.
    pub fn ground_rule(
        &mut self,
        model: &Model,
        rule: RuleId,
        facts: &dyn FactStore,
    ) -> Result<usize, EngineError> {
        let rule_data = model.rule(rule).ok_or(EngineError::UnknownRule(rule))?;
        let mut ctx = self.ctx.into_partial_ref_mut();
        Ok(ground::ground_rule(
            ctx.borrow(),
            &self.grounder_config,
            rule,
            rule_data,
            facts,
        ))
    }

    /// Lowers every ground rule without terms into optimization terms.
    ///
    /// Returns the number of new terms.
    pub fn generate_terms(&mut self, model: &Model) -> usize {
        let mut ctx = self.ctx.into_partial_ref_mut();
        generate::generate_terms(ctx.borrow(), model)
    }

    /// Runs the consensus optimization to a terminal state.
    pub fn optimize(&mut self) -> ReasonerState {
        let mut ctx = self.ctx.into_partial_ref_mut();
        admm::optimize(ctx.borrow())
    }

    /// Writes the solved values of all consensus-backed unknown atoms to the fact store.
    ///
    /// Observed atoms are never written.
    pub fn commit(&mut self, facts: &mut dyn FactStore) -> Result<(), Error> {
        let ctx = self.ctx.into_partial_ref();
        let term_store = ctx.part(TermStoreP);
        let atoms = ctx.part(AtomsP);

        let mut committed = 0usize;
        for (atom, value) in term_store.globals.live() {
            facts.commit_value(&atoms.key(atom), value)?;
            committed += 1;
        }

        info!("committed {} solved atom values", committed);
        Ok(())
    }

    /// Full inference pass: ground, generate terms, optimize and commit.
    pub fn infer(
        &mut self,
        model: &Model,
        facts: &mut dyn FactStore,
    ) -> Result<ReasonerState, Error> {
        let produced = self.ground(model, &*facts);
        let generated = self.generate_terms(model);
        debug!(
            "generated {} terms from {} new ground rules",
            generated, produced
        );

        let state = self.optimize();
        self.commit(facts)?;
        Ok(state)
    }

    /// Retracts every ground rule and term of the given rule.
    ///
    /// Consensus variables left without terms are released; variables still referenced by
    /// other rules keep their values. Returns the number of retracted ground rules.
    pub fn retract_rule(&mut self, rule: RuleId) -> usize {
        let mut ctx = self.ctx.into_partial_ref_mut();

        let retracted = ctx.part_mut(GroundStoreP).remove_all(rule).len();
        let terms = ctx.part_mut(TermStoreP).retract_rule(rule);

        debug!(
            "retracted {} ground rules and {} terms of rule {:?}",
            retracted, terms, rule
        );
        retracted
    }

    /// Retracts and re-grounds a single rule.
    ///
    /// Against an unchanged fact store this restores exactly the previous instances.
    pub fn reground_rule(
        &mut self,
        model: &Model,
        rule: RuleId,
        facts: &dyn FactStore,
    ) -> Result<usize, EngineError> {
        self.retract_rule(rule);
        self.ground_rule(model, rule, facts)
    }

    /// Drops all grounding state while keeping the interned atoms.
    pub fn clear(&mut self) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        clear_grounding(ctx.borrow());
    }

    /// Total number of ground rules.
    pub fn size(&self) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(GroundStoreP).len()
    }

    /// Number of ground rules of the given rule.
    pub fn count(&self, rule: RuleId) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(GroundStoreP).count(rule)
    }

    /// Number of optimization terms.
    pub fn term_count(&self) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(TermStoreP).term_count()
    }

    /// Number of live consensus variables.
    pub fn global_count(&self) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(TermStoreP).global_count()
    }

    /// Total number of local variables over all terms.
    pub fn local_count(&self) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(TermStoreP).local_count()
    }

    /// The reasoner's state after the last optimization run.
    pub fn reasoner_state(&self) -> ReasonerState {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(ReasonerP).state()
    }

    /// The current value of an atom the engine has seen, by identity key.
    pub fn atom_value(&self, key: &GroundKey) -> Option<f64> {
        let ctx = self.ctx.into_partial_ref();
        let atoms = ctx.part(AtomsP);
        Some(atoms.value(atoms.lookup(key)?))
    }

    /// Number of local variables shadowing the atom's consensus variable, if it has one.
    pub fn atom_fan_in(&self, key: &GroundKey) -> Option<usize> {
        let ctx = self.ctx.into_partial_ref();
        let atom = ctx.part(AtomsP).lookup(key)?;
        let term_store = ctx.part(TermStoreP);
        Some(term_store.fan_in(term_store.global_of(atom)?))
    }

    /// Total weighted incompatibility over all ground rules of weighted rules.
    pub fn total_weighted_incompatibility(&mut self, model: &Model) -> f64 {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let (ground_store, ctx) = ctx.split_part_mut(GroundStoreP);
        ground_store.total_weighted_incompatibility(model, ctx.part(AtomsP))
    }

    /// Euclidean norm of the infeasibilities over all constraint ground rules.
    pub fn infeasibility_norm(&mut self, model: &Model) -> f64 {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let (ground_store, ctx) = ctx.split_part_mut(GroundStoreP);
        ground_store.infeasibility_norm(model, ctx.part(AtomsP))
    }

    /// Looks up the supervising value for every unknown atom the engine has interned.
    ///
    /// Learning callers compare inferred values against these labels. An unknown atom
    /// without a counterpart in the label store is a latent variable and surfaces as an
    /// error instead of being silently defaulted.
    pub fn supervised_values(
        &mut self,
        labels: &dyn FactStore,
    ) -> Result<Vec<(GroundKey, f64)>, EngineError> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let atoms = ctx.part_mut(AtomsP);

        let keys: Vec<GroundKey> = atoms
            .random_variables()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|id| atoms.key(id))
            .collect();

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            if !labels.is_observed(&key) {
                return Err(EngineError::LatentVariable { key });
            }
            let value = labels.value(&key);
            values.push((key, value));
        }
        Ok(values)
    }
}
