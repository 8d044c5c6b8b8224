use std::env;

/// Per-stage logging switch for the Riccati passes.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub every: usize,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let enabled = match env::var("LQR_DIAGNOSTICS") {
            Ok(v) => v != "0" && v.to_lowercase() != "false",
            Err(_) => false,
        };

        let every = env::var("LQR_DIAGNOSTICS_EVERY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1);

        Self { enabled, every }
    }

    /// Enabled on every stage, regardless of the environment.
    pub fn verbose() -> Self {
        Self {
            enabled: true,
            every: 1,
        }
    }

    #[inline]
    pub fn should_log(&self, stage: usize) -> bool {
        self.enabled && self.every > 0 && (stage % self.every == 0)
    }
}
