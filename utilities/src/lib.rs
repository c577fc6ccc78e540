//! Small helpers shared across the observer engine. Split out into their own
//! crate so that both the library and its binary entrypoint can depend on
//! them without a cyclical dependency.

pub mod redact_endpoint_secret;

use std::time::Duration;

/// A periodic tick, used for RPC-retry back-off loops. Callers get a
/// `tokio::time::Interval` and decide for themselves whether the first tick
/// should fire immediately or only after the first period has elapsed.
pub fn make_periodic_tick(period: Duration, yield_immediately: bool) -> tokio::time::Interval {
	let mut interval = tokio::time::interval(period);

	if !yield_immediately {
		interval.reset();
	}

	interval
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn periodic_tick_fires() {
		let mut tick = make_periodic_tick(Duration::from_millis(10), true);
		tick.tick().await;
		tick.tick().await;
	}
}
