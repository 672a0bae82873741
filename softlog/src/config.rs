//! Engine configuration.
use thiserror::Error;

/// Errors rejecting a configuration at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("max iterations must be positive")]
    NoIterations,
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

/// Configurable parameters used during grounding.
#[derive(Clone, Debug)]
pub struct GrounderConfig {
    /// Worst-case potentials at or below this value are pruned during grounding.
    /// (Default: 1e-6)
    pub strict_epsilon: f64,
}

impl Default for GrounderConfig {
    fn default() -> GrounderConfig {
        GrounderConfig {
            strict_epsilon: 1e-6,
        }
    }
}

impl GrounderConfig {
    /// Validates the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        check_positive("strict epsilon", self.strict_epsilon)
    }
}

/// Configurable parameters of the consensus reasoner.
#[derive(Clone, Debug)]
pub struct AdmmConfig {
    /// Step size of the augmented Lagrangian. (Default: 1.0)
    pub step_size: f64,

    /// RMS primal residual below which the primal iterates count as converged.
    /// (Default: 1e-5)
    pub primal_epsilon: f64,

    /// RMS consensus change per iteration below which the dual iterates count as
    /// converged. (Default: 1e-5)
    pub dual_epsilon: f64,

    /// Iteration cap after which the reasoner stops with its best-effort values.
    /// (Default: 25000)
    pub max_iterations: u64,
}

impl Default for AdmmConfig {
    fn default() -> AdmmConfig {
        AdmmConfig {
            step_size: 1.0,
            primal_epsilon: 1e-5,
            dual_epsilon: 1e-5,
            max_iterations: 25000,
        }
    }
}

impl AdmmConfig {
    /// Validates the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        check_positive("step size", self.step_size)?;
        check_positive("primal epsilon", self.primal_epsilon)?;
        check_positive("dual epsilon", self.dual_epsilon)?;
        if self.max_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        Ok(())
    }
}
