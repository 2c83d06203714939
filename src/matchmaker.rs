//! Peer rendezvous (§4.6). No separate index structure: a linear scan over all `Finding`
//! connections on each new `find` suffices at the expected scale (tens to low hundreds of
//! concurrent clients).

use mio::Token;

use crate::connection::{ConnState, FindingInfo};
use crate::public_id;

/// Look for an existing `Finding` connection that is compatible with `candidate`, scanning
/// `states` in whatever order the caller provides — this implementation's caller iterates a
/// `BTreeMap<Token, _>`, i.e. ascending `Token` order, an explicit documented tie-break for
/// otherwise unspecified iteration order (§9 ambiguity (c)).
///
/// A match requires: the candidate is not the peer itself, the peer's `peer_id` equals the
/// candidate's public id, and the candidate's `peer_id` equals the peer's public id (§4.6).
pub fn find_match<'a>(
    candidate_token: Token,
    candidate: &FindingInfo,
    states: impl Iterator<Item = (Token, &'a ConnState)>,
) -> Option<Token> {
    for (token, state) in states {
        if token == candidate_token {
            continue;
        }
        let ConnState::Finding(peer) = state else {
            continue;
        };
        if peer.peer_id == public_id(candidate.id) && candidate.peer_id == public_id(peer.id) {
            return Some(token);
        }
    }
    None
}
