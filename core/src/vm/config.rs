use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

pub const DEFAULT_STACK_SIZE: usize = 1024;
/// Enough room for one environment descriptor plus one continuation frame.
pub const MIN_STACK_SIZE: usize = 8;

/// Machine configuration, usually read from an `arcvm.toml`:
///
/// ```toml
/// stack_size = 4096
/// trace_dispatch = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Operand stack capacity in slots.
    pub stack_size: usize,
    /// Emit a `trace` event per executed instruction.
    pub trace_dispatch: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            trace_dispatch: false,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: VmConfig = toml::from_str(text).context("invalid VM configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.stack_size >= MIN_STACK_SIZE,
            "stack_size must be at least {MIN_STACK_SIZE}, got {}",
            self.stack_size
        );
        Ok(())
    }
}
