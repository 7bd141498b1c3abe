//! Configuration Resolver — deterministic, coordination-free key → quota
//! mapping. Two nodes sharing no state must agree on every key's config;
//! that property comes entirely from hashing the key with a fixed,
//! process-independent function and indexing fixed tier tables with it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub input_tpm: u64,
    pub output_tpm: u64,
    pub rpm: u64,
}

/// The fixed tier tables a deployment selects from. Must be byte-identical
/// on every node — loaded once from config at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTables {
    pub input_tpm: Vec<u64>,
    pub output_tpm: Vec<u64>,
    pub rpm: Vec<u64>,
}

impl Default for TierTables {
    fn default() -> Self {
        Self {
            input_tpm: vec![10_000, 20_000, 40_000, 60_000, 100_000, 500_000, 1_000_000],
            output_tpm: vec![2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000],
            rpm: vec![10, 20, 50, 100, 200, 500, 1_000],
        }
    }
}

/// FNV-1a, run twice with different offset bases to build a 128-bit digest.
/// Deliberately hand-rolled rather than `DefaultHasher`: `DefaultHasher` is
/// seeded per-process (`RandomState`), so two nodes would disagree on every
/// key's tier — exactly the coordination this resolver must avoid.
fn fnv1a_128(key: &str) -> u128 {
    const PRIME: u64 = 0x100000001b3;
    let bytes = key.as_bytes();

    let mut lo: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        lo ^= b as u64;
        lo = lo.wrapping_mul(PRIME);
    }

    let mut hi: u64 = 0x84222325cbf29ce4;
    for &b in bytes.iter().rev() {
        hi ^= b as u64;
        hi = hi.wrapping_mul(PRIME);
    }

    ((hi as u128) << 64) | (lo as u128)
}

fn pick(table: &[u64], bits: u128) -> u64 {
    debug_assert!(!table.is_empty());
    table[(bits as usize) % table.len()]
}

/// Derive a config purely from the key and the tier tables — no I/O, no
/// shared state, safe to call independently on every node.
fn derive(key: &str, tiers: &TierTables) -> RateLimitConfig {
    let hash = fnv1a_128(key);

    // Disjoint 32-bit fields of the 128-bit hash index each table
    // independently so the three dimensions don't move in lockstep.
    let input_bits = hash & 0xFFFF_FFFF;
    let output_bits = (hash >> 32) & 0xFFFF_FFFF;
    let rpm_bits = (hash >> 64) & 0xFFFF_FFFF;

    RateLimitConfig {
        input_tpm: pick(&tiers.input_tpm, input_bits),
        output_tpm: pick(&tiers.output_tpm, output_bits),
        rpm: pick(&tiers.rpm, rpm_bits),
    }
}

/// Maps api_key → RateLimitConfig. The override table is read-only for the
/// process lifetime; the memo cache is a read-mostly optimization that
/// never gates admission (see `crate::engine` module docs).
pub struct ConfigResolver {
    tiers: TierTables,
    overrides: HashMap<String, RateLimitConfig>,
    memo: DashMap<String, RateLimitConfig>,
}

impl ConfigResolver {
    pub fn new(tiers: TierTables, overrides: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            tiers,
            overrides,
            memo: DashMap::new(),
        }
    }

    /// `CR.resolve(api_key)`. Override table wins when present; otherwise
    /// the deterministic derivation, memoized for subsequent lookups.
    pub fn resolve(&self, key: &str) -> RateLimitConfig {
        if let Some(cfg) = self.overrides.get(key) {
            return *cfg;
        }

        if let Some(cfg) = self.memo.get(key) {
            return *cfg;
        }

        let cfg = derive(key, &self.tiers);
        self.memo.insert(key.to_string(), cfg);
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_node_state_agrees_every_time() {
        let resolver = ConfigResolver::new(TierTables::default(), HashMap::new());
        let a = resolver.resolve("tenant-123");
        let b = resolver.resolve("tenant-123");
        assert_eq!(a, b);
    }

    #[test]
    fn independent_resolvers_with_no_shared_state_agree() {
        // Simulates two nodes: separate process-local resolver instances,
        // same fixed tier tables, no coordination between them.
        let r1 = ConfigResolver::new(TierTables::default(), HashMap::new());
        let r2 = ConfigResolver::new(TierTables::default(), HashMap::new());
        assert_eq!(r1.resolve("tenant-abc"), r2.resolve("tenant-abc"));
        assert_eq!(r1.resolve("tenant-xyz"), r2.resolve("tenant-xyz"));
    }

    #[test]
    fn derived_config_always_lands_in_configured_tiers() {
        let tiers = TierTables::default();
        let resolver = ConfigResolver::new(tiers.clone(), HashMap::new());
        for key in ["a", "b", "tenant-1", "tenant-2", "sk-abcdef"] {
            let cfg = resolver.resolve(key);
            assert!(tiers.input_tpm.contains(&cfg.input_tpm));
            assert!(tiers.output_tpm.contains(&cfg.output_tpm));
            assert!(tiers.rpm.contains(&cfg.rpm));
        }
    }

    #[test]
    fn override_table_wins_over_derivation() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "vip-key".to_string(),
            RateLimitConfig {
                input_tpm: 9_999_999,
                output_tpm: 9_999_999,
                rpm: 9_999,
            },
        );
        let resolver = ConfigResolver::new(TierTables::default(), overrides);
        let cfg = resolver.resolve("vip-key");
        assert_eq!(cfg.rpm, 9_999);
    }

    #[test]
    fn different_keys_usually_differ() {
        let resolver = ConfigResolver::new(TierTables::default(), HashMap::new());
        let configs: Vec<_> = (0..20)
            .map(|i| resolver.resolve(&format!("tenant-{}", i)))
            .collect();
        let distinct = configs
            .iter()
            .collect::<std::collections::HashSet<_>>()
            .len();
        assert!(distinct > 1, "expected tier assignment to vary across keys");
    }
}
