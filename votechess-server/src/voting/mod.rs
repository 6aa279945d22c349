//! Voting round state machine
//!
//! One round per controlled-side turn: Idle (no round) -> Voting ->
//! Resolving -> Idle. The eligible move set is frozen at round start so a
//! position change mid-round can never corrupt the ballot box.

pub mod tally;

pub use tally::{resolve, Resolution};

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use votechess_common::events::RoundView;
use votechess_common::VoterId;

/// Why a vote was not accepted; the message is the observer-facing reason
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRejection {
    #[error("no voting round in progress")]
    NoRound,

    #[error("voting period ended")]
    Expired,

    #[error("illegal move")]
    IllegalMove,

    #[error("duplicate vote")]
    Duplicate,

    #[error("spectator mode")]
    Spectator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Voting,
    Resolving,
}

/// An active voting round and its ballot box
#[derive(Debug)]
pub struct VotingRound {
    round_id: u64,
    status: RoundStatus,
    deadline: DateTime<Utc>,
    /// Frozen at round start; ballots are validated against this set, never
    /// against the live legal-move list
    eligible: Vec<String>,
    eligible_set: HashSet<String>,
    /// identity -> chosen move, one entry per identity, last write wins
    ballots: HashMap<VoterId, String>,
}

impl VotingRound {
    pub fn open(round_id: u64, eligible: Vec<String>, deadline: DateTime<Utc>) -> Self {
        let eligible_set = eligible.iter().cloned().collect();
        Self {
            round_id,
            status: RoundStatus::Voting,
            deadline,
            eligible,
            eligible_set,
            ballots: HashMap::new(),
        }
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn eligible_moves(&self) -> &[String] {
        &self.eligible
    }

    /// Take the frozen move set out of a dead round (submission-failure
    /// restart path: the position has not changed)
    pub fn into_eligible_moves(self) -> Vec<String> {
        self.eligible
    }

    pub fn ballots(&self) -> &HashMap<VoterId, String> {
        &self.ballots
    }

    pub fn begin_resolving(&mut self) {
        self.status = RoundStatus::Resolving;
    }

    /// Record one identity's vote
    ///
    /// Changing an existing vote replaces the prior entry; re-submitting the
    /// identical move is rejected without touching the ballot box.
    pub fn submit(
        &mut self,
        voter: VoterId,
        uci: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VoteRejection> {
        if self.status != RoundStatus::Voting || now >= self.deadline {
            return Err(VoteRejection::Expired);
        }
        if !self.eligible_set.contains(uci) {
            return Err(VoteRejection::IllegalMove);
        }
        if self.ballots.get(&voter).is_some_and(|prior| prior == uci) {
            return Err(VoteRejection::Duplicate);
        }
        self.ballots.insert(voter, uci.to_string());
        Ok(())
    }

    /// Aggregated per-move counts; never exposes identities
    pub fn counts(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for mv in self.ballots.values() {
            *counts.entry(mv.clone()).or_insert(0u32) += 1;
        }
        counts
    }

    pub fn total_votes(&self) -> u32 {
        self.ballots.len() as u32
    }

    pub fn to_view(&self) -> RoundView {
        RoundView {
            round_id: self.round_id,
            deadline_ms: self.deadline.timestamp_millis(),
            eligible_moves: self.eligible.clone(),
            counts: self.counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn round() -> (VotingRound, DateTime<Utc>) {
        let now = Utc::now();
        let round = VotingRound::open(
            1,
            vec!["e2e4".into(), "d2d4".into(), "g1f3".into()],
            now + Duration::seconds(90),
        );
        (round, now)
    }

    fn voter(name: &str) -> VoterId {
        VoterId::new(name)
    }

    #[test]
    fn one_ballot_per_identity_last_write_wins() {
        let (mut round, now) = round();
        round.submit(voter("a"), "e2e4", now).unwrap();
        round.submit(voter("a"), "d2d4", now).unwrap();

        assert_eq!(round.ballots().len(), 1);
        assert_eq!(round.ballots()[&voter("a")], "d2d4");
        assert_eq!(round.counts()["d2d4"], 1);
        assert!(!round.counts().contains_key("e2e4"));
    }

    #[test]
    fn identical_resubmission_is_a_duplicate() {
        let (mut round, now) = round();
        round.submit(voter("a"), "e2e4", now).unwrap();
        assert_eq!(
            round.submit(voter("a"), "e2e4", now),
            Err(VoteRejection::Duplicate)
        );
        assert_eq!(round.total_votes(), 1);
    }

    #[test]
    fn vote_outside_frozen_set_is_illegal() {
        let (mut round, now) = round();
        assert_eq!(
            round.submit(voter("a"), "a2a3", now),
            Err(VoteRejection::IllegalMove)
        );
        assert_eq!(VoteRejection::IllegalMove.to_string(), "illegal move");
    }

    #[test]
    fn vote_at_or_after_deadline_is_expired() {
        let (mut round, _) = round();
        let at_deadline = round.deadline();
        assert_eq!(
            round.submit(voter("a"), "e2e4", at_deadline),
            Err(VoteRejection::Expired)
        );
        assert_eq!(
            round.submit(voter("a"), "e2e4", at_deadline + Duration::seconds(5)),
            Err(VoteRejection::Expired)
        );
        assert_eq!(VoteRejection::Expired.to_string(), "voting period ended");
    }

    #[test]
    fn no_votes_accepted_while_resolving() {
        let (mut round, now) = round();
        round.begin_resolving();
        assert_eq!(
            round.submit(voter("a"), "e2e4", now),
            Err(VoteRejection::Expired)
        );
    }

    #[test]
    fn counts_are_aggregates_only() {
        let (mut round, now) = round();
        round.submit(voter("a"), "e2e4", now).unwrap();
        round.submit(voter("b"), "e2e4", now).unwrap();
        round.submit(voter("c"), "d2d4", now).unwrap();

        let counts = round.counts();
        assert_eq!(counts["e2e4"], 2);
        assert_eq!(counts["d2d4"], 1);
        assert_eq!(round.total_votes(), 3);
    }
}
