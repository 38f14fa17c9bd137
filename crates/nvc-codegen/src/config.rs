//! Environment-driven configuration. This is the one place the core reads
//! process environment; everything else is parameterized explicitly so the
//! library stays testable without env manipulation.

use std::env;

/// Tiering and filtering knobs read once at JIT-session startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// `NVC_JIT_ONLY`: compile only the function with this canonical name.
    pub only: Option<String>,
    /// Whether the JIT tier is enabled at all (threshold > 0).
    pub jit_enabled: bool,
    /// The raw threshold value, for diagnostics.
    pub jit_threshold: i64,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        let only = env::var("NVC_JIT_ONLY").ok().filter(|s| !s.is_empty());

        let jit_threshold = match env::var("NVC_JIT_THRESHOLD") {
            Ok(raw) => match raw.parse::<i64>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(value = %raw, "NVC_JIT_THRESHOLD is not an integer, disabling JIT tiering");
                    0
                }
            },
            Err(_) => 1,
        };

        if jit_threshold < 0 {
            tracing::warn!(
                threshold = jit_threshold,
                "negative NVC_JIT_THRESHOLD, disabling JIT tiering"
            );
        }

        Config {
            only,
            jit_enabled: jit_threshold > 0,
            jit_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_filter() {
        let cfg = Config::default();
        assert!(cfg.only.is_none());
        assert!(!cfg.jit_enabled);
    }
}
