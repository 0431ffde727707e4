//! Error taxonomy for the consensus core.
//!
//! Transport failures, stale-term rejections, and apply failures are
//! deliberately *not* `ErrorKind` variants here: they're always handled at
//! the call site (logged-and-retried, folded into `observe_term`, or routed
//! into a completion) and never propagate out of the crate as an `Err`.

use crate::protos::ServerId;

error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Sled(::sled::Error);
        Encode(::rmp_serde::encode::Error);
        Decode(::rmp_serde::decode::Error);
    }

    errors {
        /// `Propose` was called on a Follower or Candidate.
        NotLeader(leader_hint: Option<ServerId>) {
            description("not the leader")
            display("not the leader (hint: {:?})", leader_hint)
        }

        /// A follower refused `AppendEntries` because its log conflicts with
        /// the leader's at `prev_log_index`.
        LogInconsistency {
            description("follower log conflicts with the leader's log")
        }

        /// A durable save failed. Per §7 this is fatal: the node must stop
        /// making progress rather than regress durability.
        PersistenceError {
            description("durable save to the persistent store failed")
        }
    }
}
