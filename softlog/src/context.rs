//! Central engine data structure.
use partial_ref::{part, partial, PartialRef, PartialRefTarget};

use crate::admm::Reasoner;
use crate::atoms::AtomStore;
use crate::ground::store::GroundRuleStore;
use crate::term::store::TermStore;

/// Part declarations for the [`Context`] struct.
mod parts {
    use super::*;

    part!(pub AtomsP: AtomStore);
    part!(pub GroundStoreP: GroundRuleStore);
    part!(pub ReasonerP: Reasoner);
    part!(pub TermStoreP: TermStore);
}

pub use parts::*;

/// Central engine data structure.
///
/// This struct contains all data kept by the engine. Functions operating on multiple fields
/// of the context use partial references provided by the `partial_ref` crate. This documents
/// the data dependencies and makes the borrow checker happy without the overhead of passing
/// individual references.
#[derive(PartialRefTarget, Default)]
pub struct Context {
    #[part = "AtomsP"]
    atoms: AtomStore,
    #[part = "GroundStoreP"]
    ground_store: GroundRuleStore,
    #[part = "ReasonerP"]
    reasoner: Reasoner,
    #[part = "TermStoreP"]
    term_store: TermStore,
}

/// Drops all grounding state while keeping the interned atoms.
///
/// Used by drivers that re-ground a fully edited model from scratch.
pub fn clear_grounding(
    mut ctx: partial!(Context, mut GroundStoreP, mut TermStoreP),
) {
    *ctx.part_mut(GroundStoreP) = GroundRuleStore::default();
    *ctx.part_mut(TermStoreP) = TermStore::default();
}
