// config.rs
//
// Engine-wide tunables, constructed via a builder analogous to the
// teacher's `OutputStreamBuilder` (src/io/stream.rs). No external
// config-file format is specified, so `EngineConfig` is always built
// programmatically, by a library caller or by the CLI's arg parser.

/// Whether the query engine generates and costs a complement-of-excluded-
/// range plan alongside the direct plan, per spec §4.H.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComplementMode {
    /// Generate both plans where the scheme supports one; pick the
    /// cheaper, tie-breaking to the non-complement plan.
    #[default]
    Auto,
    /// Never generate a complement plan.
    Never,
    /// Force the complement plan whenever the scheme supports one,
    /// regardless of cost.
    Always,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub complement_mode: ComplementMode,
    /// When an `Arithmetic`-class error occurs evaluating a partition, skip
    /// that partition (cursor yields `Err` and advances) instead of
    /// escalating like a `Resource`/`Unsupported` error would.
    pub skip_partition_on_arithmetic_error: bool,
    /// Cache capacity hint; the cache itself has no hard size limit (it
    /// retains exactly what's strongly referenced), but this bounds how
    /// eagerly the engine calls `release_unused()` between partitions.
    pub release_unused_every_n_partitions: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            complement_mode: ComplementMode::default(),
            skip_partition_on_arithmetic_error: true,
            release_unused_every_n_partitions: 1,
        }
    }
}

pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn complement_mode(mut self, mode: ComplementMode) -> Self {
        self.config.complement_mode = mode;
        self
    }

    pub fn skip_partition_on_arithmetic_error(mut self, v: bool) -> Self {
        self.config.skip_partition_on_arithmetic_error = v;
        self
    }

    pub fn release_unused_every_n_partitions(mut self, n: u32) -> Self {
        self.config.release_unused_every_n_partitions = n.max(1);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_auto_and_skips_arithmetic_errors() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.complement_mode, ComplementMode::Auto);
        assert!(cfg.skip_partition_on_arithmetic_error);
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let cfg = EngineConfig::builder()
            .complement_mode(ComplementMode::Never)
            .skip_partition_on_arithmetic_error(false)
            .build();
        assert_eq!(cfg.complement_mode, ComplementMode::Never);
        assert!(!cfg.skip_partition_on_arithmetic_error);
    }
}
