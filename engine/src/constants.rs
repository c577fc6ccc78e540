//! Protocol-defined constants. Kept as named constants rather than inlined
//! magic numbers.

use std::time::Duration;

/// Length of a voting epoch, in seconds. Flare's FTSO/FDC voting epochs are
/// 90 seconds long.
pub const VOTING_EPOCH_DURATION_SECONDS: i64 = 90;

/// Seconds after a voting epoch's start at which the reveal window closes:
/// `reveal_deadline() = start_s + 45`.
pub const REVEAL_DEADLINE_OFFSET_SECONDS: i64 = 45;

/// Length of a reward epoch, in seconds (3.5 days).
pub const REWARD_EPOCH_DURATION_SECONDS: i64 = 3 * 24 * 60 * 60 + 12 * 60 * 60;

/// FTSO protocol id.
pub const FTSO_PROTOCOL_ID: u8 = 100;

/// FDC protocol id.
pub const FDC_PROTOCOL_ID: u8 = 200;

/// Offset (in seconds, from the voting epoch's start) that the submit-signatures
/// deadline is defined at. The "+56" is the 55-second window plus one second
/// for the half-open range's exclusive end.
pub const SUBMIT_SIGNATURES_DEADLINE_OFFSET_SECONDS: i64 = 56;

/// Voter-registration window start, relative to the reward epoch's start:
/// ~2h30m before.
pub const VOTER_REGISTRATION_WINDOW_START_OFFSET_SECONDS: i64 = 9000;

/// Voter-registration window end, relative to the reward epoch's start:
/// ~1h before.
pub const VOTER_REGISTRATION_WINDOW_END_OFFSET_SECONDS: i64 = 3600;

/// Tolerance used by the binary search in `find_voter_registration_blocks`.
pub const BLOCK_SEARCH_TOLERANCE_SECONDS: i64 = 600;

/// Step size used by the binary search in `find_voter_registration_blocks`.
pub const BLOCK_SEARCH_STEP: i64 = 100;

/// Delay between head-polling iterations when the chain head hasn't advanced.
pub const HEAD_POLL_IDLE_INTERVAL: Duration = Duration::from_secs(2);

/// Back-off interval while waiting for an RPC endpoint to come up with the
/// expected chain id.
pub const RPC_RETRY_CONNECTION_INTERVAL: Duration = Duration::from_secs(4);
