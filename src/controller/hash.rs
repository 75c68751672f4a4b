//! # Config Hash Gate
//!
//! Fingerprints the primary configuration payload and decides whether the
//! running kubeturbo deployment has to be recreated to pick it up.

use std::hash::Hasher;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1 (multiply, then xor)
///
/// Hashes recorded by earlier operator releases were computed with FNV-1, so
/// FNV-1a would restart every workload once after an upgrade.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1Hasher(u64);

impl Default for Fnv1Hasher {
    fn default() -> Self {
        Self(FNV_OFFSET_BASIS)
    }
}

impl Hasher for Fnv1Hasher {
    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 = self.0.wrapping_mul(FNV_PRIME) ^ u64::from(*byte);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// FNV-1 hash of `payload`, rendered as a decimal string
pub fn config_hash(payload: &[u8]) -> String {
    let mut hasher = Fnv1Hasher::default();
    hasher.write(payload);
    hasher.finish().to_string()
}

/// What the workload step must do with the deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashGate {
    /// Primary config is unchanged (or nothing was recorded yet); apply in place
    Apply,
    /// Primary config changed since the last apply; persist the new hash, then
    /// delete the deployment so the next pass recreates it
    Restart { previous: String, current: String },
}

impl HashGate {
    pub fn evaluate(recorded: &str, current: &str) -> Self {
        if recorded.is_empty() || recorded == current {
            Self::Apply
        } else {
            Self::Restart {
                previous: recorded.to_string(),
                current: current.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let payload = br#"{"communicationConfig":{}}"#;
        assert_eq!(config_hash(payload), config_hash(payload));
    }

    #[test]
    fn test_single_byte_change_changes_hash() {
        assert_ne!(config_hash(b"version: 8.14.6"), config_hash(b"version: 8.14.7"));
    }

    #[test]
    fn test_hash_is_decimal_u64() {
        let hash = config_hash(b"");
        // FNV offset basis
        assert_eq!(hash, "14695981039346656037");
        assert!(hash.parse::<u64>().is_ok());
    }

    #[test]
    fn test_hash_is_fnv1_not_fnv1a() {
        assert_eq!(config_hash(b"a"), 0xaf63_bd4c_8601_b7be_u64.to_string());
        assert_eq!(config_hash(b"foobar"), 0x340d_8765_a4dd_a9c2_u64.to_string());
    }

    #[test]
    fn test_gate_applies_when_nothing_recorded() {
        assert_eq!(HashGate::evaluate("", "123"), HashGate::Apply);
    }

    #[test]
    fn test_gate_applies_when_unchanged() {
        assert_eq!(HashGate::evaluate("123", "123"), HashGate::Apply);
    }

    #[test]
    fn test_gate_restarts_when_changed() {
        assert_eq!(
            HashGate::evaluate("123", "456"),
            HashGate::Restart {
                previous: "123".to_string(),
                current: "456".to_string()
            }
        );
    }
}
