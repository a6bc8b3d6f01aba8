//! Delta candidate selection and economic accept/reject decisions.
//!
//! Computing a delta is cheap; storing a bad one is not — an uneconomic
//! delta wastes space over the full object, and an overly deep chain makes
//! every read of it slower and every link in it a single point of failure.
//! This module separates the concern into three small collaborators:
//! [`CandidateFinder`] picks plausible bases from a bounded window of
//! recently written objects, [`Compressor`] turns a candidate into an actual
//! delta, and [`DecisionStrategy`] judges whether the result is worth
//! keeping.

use git_hash::ObjectId;
use git_object::ObjectType;

use crate::delta::compute::compute_delta;

/// Economic thresholds applied when deciding whether to store an object as
/// a delta against a candidate base, or as a full object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionStrategy {
    /// Reject a delta whose encoded size exceeds `max_ratio * target_size`.
    pub max_ratio: f32,
    /// Never attempt to deltify objects smaller than this; the delta header
    /// overhead alone would eat any savings.
    pub min_size: u64,
    /// Never extend a delta chain past this depth. A write that would
    /// exceed it stores the full object instead of failing.
    pub max_chain_depth: u32,
}

impl Default for DecisionStrategy {
    /// Defaults for on-disk storage: shallower chains than a transfer pack,
    /// since every read has to walk back to a full object.
    fn default() -> Self {
        Self {
            max_ratio: 0.75,
            min_size: 50,
            max_chain_depth: 10,
        }
    }
}

impl DecisionStrategy {
    /// Looser chain depth for packs meant to interoperate with C git over
    /// the wire, where deep chains are normal and re-deltified on receipt.
    pub fn for_transfer() -> Self {
        Self {
            max_chain_depth: 50,
            ..Self::default()
        }
    }

    fn worth_deltifying(&self, target_size: u64) -> bool {
        target_size >= self.min_size
    }

    fn is_economic(&self, target_size: u64, delta_size: u64) -> bool {
        (delta_size as f64) <= self.max_ratio as f64 * target_size as f64
    }

    fn chain_allowed(&self, base_chain_depth: u32) -> bool {
        base_chain_depth + 1 <= self.max_chain_depth
    }
}

/// A previously written object available as a delta base.
pub struct Candidate<'a> {
    pub oid: ObjectId,
    pub obj_type: ObjectType,
    pub data: &'a [u8],
    /// How many deltas already separate `oid` from a full object. A delta
    /// against this candidate would sit at `chain_depth + 1`.
    pub chain_depth: u32,
}

/// Picks plausible bases for a target object out of a bounded window of
/// recently written objects, rather than scanning the whole object set on
/// every write.
pub struct CandidateFinder<'a, 'c> {
    window: &'c [Candidate<'a>],
}

impl<'a, 'c> CandidateFinder<'a, 'c> {
    pub fn new(window: &'c [Candidate<'a>]) -> Self {
        Self { window }
    }

    /// Same-type candidates, nearest in size to `target_size` first —
    /// similarly sized objects of the same type tend to share the most
    /// content and produce the smallest deltas.
    pub fn candidates_for(&self, obj_type: ObjectType, target_size: u64) -> Vec<&Candidate<'a>> {
        let mut matches: Vec<&Candidate<'a>> = self
            .window
            .iter()
            .filter(|c| c.obj_type == obj_type)
            .collect();
        matches.sort_by_key(|c| (c.data.len() as i64 - target_size as i64).unsigned_abs());
        matches
    }
}

/// Outcome of running the decision strategy against a target object.
pub enum Decision {
    /// Store as a delta against `base_oid`.
    Delta {
        base_oid: ObjectId,
        delta: Vec<u8>,
        chain_depth: u32,
    },
    /// No candidate cleared the economic or chain-depth bar; store full.
    Full,
}

/// Runs candidate selection and delta computation, returning the smallest
/// accepted delta or [`Decision::Full`] if nothing qualifies.
pub struct Compressor {
    strategy: DecisionStrategy,
}

impl Compressor {
    pub fn new(strategy: DecisionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DecisionStrategy {
        self.strategy
    }

    /// Decide how to store `target`, considering every same-type object in
    /// `window` as a candidate base.
    pub fn decide(&self, obj_type: ObjectType, target: &[u8], window: &[Candidate<'_>]) -> Decision {
        if !self.strategy.worth_deltifying(target.len() as u64) {
            return Decision::Full;
        }

        let finder = CandidateFinder::new(window);
        let mut best: Option<(ObjectId, Vec<u8>, u32)> = None;

        for candidate in finder.candidates_for(obj_type, target.len() as u64) {
            if !self.strategy.chain_allowed(candidate.chain_depth) {
                continue;
            }
            let delta = compute_delta(candidate.data, target);
            if !self.strategy.is_economic(target.len() as u64, delta.len() as u64) {
                continue;
            }
            let is_better = best
                .as_ref()
                .map(|(_, best_delta, _)| delta.len() < best_delta.len())
                .unwrap_or(true);
            if is_better {
                best = Some((candidate.oid, delta, candidate.chain_depth + 1));
            }
        }

        match best {
            Some((base_oid, delta, chain_depth)) => Decision::Delta {
                base_oid,
                delta,
                chain_depth,
            },
            None => Decision::Full,
        }
    }
}
