//! Vote ledger state machine.
//!
//! The rule is "at most one live ledger row per (item, client)". Submitting
//! the value already on record cancels it (toggle off), submitting the
//! opposite value switches direction (flip), and a first vote inserts. Both
//! store backends derive their ledger write and counter update from
//! [`transition`], so the semantics live in exactly one place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Id;

/// A vote direction. Serialized as the integer `1` or `-1` on the wire and
/// in the ledger; any other integer is rejected at deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_int(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = String;
    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(format!("vote value must be 1 or -1, got {other}")),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(v: VoteValue) -> i64 {
        v.as_int()
    }
}

/// Denormalized counters cached on the votable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteTally {
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    pub fn apply(&self, delta: CounterDelta) -> VoteTally {
        VoteTally {
            upvotes: self.upvotes + delta.up,
            downvotes: self.downvotes + delta.down,
        }
    }
}

/// One client's recorded stances for a post view: their vote on the post
/// plus their votes on that post's comments, keyed by comment id.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClientVotes {
    #[schema(value_type = Option<i64>)]
    pub post_vote: Option<VoteValue>,
    #[schema(value_type = Object)]
    pub comment_votes: HashMap<Id, VoteValue>,
}

/// What the ledger write for one `apply_vote` call looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    /// No row existed; insert one with the requested value.
    Insert,
    /// Row existed with the requested value; delete it (toggle off).
    Remove,
    /// Row existed with the opposite value; update it in place.
    Flip,
}

/// Counter adjustment committed in the same atomic unit as the ledger write.
/// Each component is -1, 0 or +1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    pub up: i64,
    pub down: i64,
}

/// Decide the ledger write and counter delta for a requested vote given the
/// client's existing stance. Pure; the caller is responsible for executing
/// both effects atomically against the store.
pub fn transition(existing: Option<VoteValue>, requested: VoteValue) -> (LedgerOp, CounterDelta) {
    let direction = |v: VoteValue, sign: i64| match v {
        VoteValue::Up => CounterDelta { up: sign, down: 0 },
        VoteValue::Down => CounterDelta { up: 0, down: sign },
    };
    match existing {
        None => (LedgerOp::Insert, direction(requested, 1)),
        Some(prev) if prev == requested => (LedgerOp::Remove, direction(requested, -1)),
        Some(prev) => {
            let gain = direction(requested, 1);
            let loss = direction(prev, -1);
            (
                LedgerOp::Flip,
                CounterDelta { up: gain.up + loss.up, down: gain.down + loss.down },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_vote_inserts() {
        let (op, d) = transition(None, VoteValue::Up);
        assert_eq!(op, LedgerOp::Insert);
        assert_eq!(d, CounterDelta { up: 1, down: 0 });

        let (op, d) = transition(None, VoteValue::Down);
        assert_eq!(op, LedgerOp::Insert);
        assert_eq!(d, CounterDelta { up: 0, down: 1 });
    }

    #[test]
    fn repeat_vote_toggles_off() {
        let (op, d) = transition(Some(VoteValue::Up), VoteValue::Up);
        assert_eq!(op, LedgerOp::Remove);
        assert_eq!(d, CounterDelta { up: -1, down: 0 });

        let (op, d) = transition(Some(VoteValue::Down), VoteValue::Down);
        assert_eq!(op, LedgerOp::Remove);
        assert_eq!(d, CounterDelta { up: 0, down: -1 });
    }

    #[test]
    fn opposite_vote_flips_both_counters() {
        let (op, d) = transition(Some(VoteValue::Up), VoteValue::Down);
        assert_eq!(op, LedgerOp::Flip);
        assert_eq!(d, CounterDelta { up: -1, down: 1 });

        let (op, d) = transition(Some(VoteValue::Down), VoteValue::Up);
        assert_eq!(op, LedgerOp::Flip);
        assert_eq!(d, CounterDelta { up: 1, down: -1 });
    }

    #[test]
    fn toggle_then_revote_round_trips_tally() {
        let start = VoteTally { upvotes: 3, downvotes: 1 };
        let (_, first) = transition(None, VoteValue::Up);
        let after_vote = start.apply(first);
        assert_eq!(after_vote, VoteTally { upvotes: 4, downvotes: 1 });
        let (_, second) = transition(Some(VoteValue::Up), VoteValue::Up);
        assert_eq!(after_vote.apply(second), start);
    }

    #[test]
    fn vote_value_rejects_out_of_range() {
        assert!(VoteValue::try_from(0).is_err());
        assert!(VoteValue::try_from(2).is_err());
        assert_eq!(VoteValue::try_from(1).unwrap(), VoteValue::Up);
        assert_eq!(VoteValue::try_from(-1).unwrap(), VoteValue::Down);
    }

    #[test]
    fn score_is_up_minus_down() {
        assert_eq!(VoteTally { upvotes: 7, downvotes: 2 }.score(), 5);
    }
}
