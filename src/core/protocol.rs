/// Protocol constants for the proof-of-solve ledger
///
/// Values are counted in whole credits (unsigned integers); the original
/// floating-point amounts are deliberately not supported, the same way
/// Bitcoin counts satoshis instead of fractional coins.
///
/// Wire protocol version stamped into every block
pub const VERSION: u32 = 1;

/// Upper bound on the total output value of a block's reward transaction
pub const REWARD_VALUE: u64 = 50;

/// How many solved transactions the miner batches into one block
pub const TRANSACTIONS_PER_BLOCK: usize = 5;

/// Maximum tolerated clock drift for inbound timestamps (2 hours).
/// A transaction or block stamped further in the future fails verification.
pub const MAX_CLOCK_DRIFT_MILLIS: i64 = 2 * 60 * 60 * 1000;
