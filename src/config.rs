//! Host-tunable configuration. Everything here has a sensible default; a
//! host can override it (e.g. to shrink the origin registry for an
//! embedded deployment, or to raise the interrupt tick budget for batch
//! scripts).

use serde::{Deserialize, Serialize};

/// Capacity of the process-wide [`crate::origin::OriginRegistry`].
pub const DEFAULT_ORIGIN_REGISTRY_CAPACITY: usize = 4096;

/// Bound on the host-call argument-label array; overflow logs a
/// diagnostic and truncates rather than failing the call.
pub const DEFAULT_MAX_HOST_CALL_ARGS: usize = 100;

/// Tick budget decremented on each loop-class instruction before the
/// dispatcher consults the host's timeout check.
pub const DEFAULT_TICK_BUDGET: u32 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub origin_registry_capacity: usize,
    pub max_host_call_args: usize,
    pub tick_budget: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            origin_registry_capacity: DEFAULT_ORIGIN_REGISTRY_CAPACITY,
            max_host_call_args: DEFAULT_MAX_HOST_CALL_ARGS,
            tick_budget: DEFAULT_TICK_BUDGET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.origin_registry_capacity, 4096);
        assert_eq!(cfg.max_host_call_args, 100);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = VmConfig {
            tick_budget: 42,
            ..VmConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: VmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
