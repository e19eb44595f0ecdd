//! Learning Rate Scheduler Module
//!
//! Two layers of scheduling are applied during training:
//! - an epoch-level [`LrSchedule`] that picks the base rate for each epoch
//! - a per-iteration [`TimeDecay`] that shrinks that rate as optimizer steps accumulate

use serde::{Deserialize, Serialize};

/// One step of a piecewise schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// The divisor applies once the (0-based) epoch is strictly greater than this
    pub after_epoch: usize,
    /// Base learning rate is divided by this value
    pub divisor: f64,
}

impl Milestone {
    pub const fn new(after_epoch: usize, divisor: f64) -> Self {
        Self {
            after_epoch,
            divisor,
        }
    }
}

/// Epoch-level learning rate schedule, relative to a base learning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LrSchedule {
    /// Constant learning rate (no scheduling)
    Constant,

    /// Divide the base rate by the divisor of the latest milestone passed
    Piecewise { milestones: Vec<Milestone> },

    /// Multiply by `decay_factor` at each listed epoch
    StepDecay {
        decay_factor: f64,
        step_epochs: Vec<usize>,
    },

    /// Smooth decay following a cosine curve down to `min_lr`
    CosineAnnealing { min_lr: f64, total_epochs: usize },
}

impl Default for LrSchedule {
    /// /10 after epoch 10, /50 after epoch 20, /100 after epoch 30
    fn default() -> Self {
        Self::Piecewise {
            milestones: vec![
                Milestone::new(10, 10.0),
                Milestone::new(20, 50.0),
                Milestone::new(30, 100.0),
            ],
        }
    }
}

impl LrSchedule {
    /// Create a step decay scheduler
    pub fn step_decay(decay_factor: f64, step_epochs: Vec<usize>) -> Self {
        Self::StepDecay {
            decay_factor,
            step_epochs,
        }
    }

    /// Create a cosine annealing scheduler
    pub fn cosine_annealing(min_lr: f64, total_epochs: usize) -> Self {
        Self::CosineAnnealing {
            min_lr,
            total_epochs,
        }
    }

    /// Get the learning rate for a given 0-based epoch
    pub fn get_lr(&self, base_lr: f64, epoch: usize) -> f64 {
        match self {
            Self::Constant => base_lr,

            Self::Piecewise { milestones } => milestones
                .iter()
                .filter(|m| epoch > m.after_epoch)
                .max_by_key(|m| m.after_epoch)
                .map(|m| base_lr / m.divisor)
                .unwrap_or(base_lr),

            Self::StepDecay {
                decay_factor,
                step_epochs,
            } => {
                let mut lr = base_lr;
                for &step_epoch in step_epochs {
                    if epoch >= step_epoch {
                        lr *= decay_factor;
                    }
                }
                lr
            }

            Self::CosineAnnealing {
                min_lr,
                total_epochs,
            } => {
                let progress = (epoch as f64 / (*total_epochs).max(1) as f64).min(1.0);
                let cosine_factor = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                min_lr + (base_lr - min_lr) * cosine_factor
            }
        }
    }

    /// Check parameters that would make the schedule meaningless
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Constant => Ok(()),
            Self::Piecewise { milestones } => {
                if milestones.iter().any(|m| !(m.divisor > 0.0)) {
                    return Err("piecewise divisors must be positive".into());
                }
                Ok(())
            }
            Self::StepDecay { decay_factor, .. } => {
                if !(*decay_factor > 0.0) {
                    return Err("step decay factor must be positive".into());
                }
                Ok(())
            }
            Self::CosineAnnealing { min_lr, .. } => {
                if *min_lr < 0.0 {
                    return Err("cosine min_lr must not be negative".into());
                }
                Ok(())
            }
        }
    }

    /// Get a description of the scheduler
    pub fn description(&self) -> String {
        match self {
            Self::Constant => "Constant LR".to_string(),
            Self::Piecewise { milestones } => {
                let steps: Vec<String> = milestones
                    .iter()
                    .map(|m| format!("/{} after epoch {}", m.divisor, m.after_epoch))
                    .collect();
                format!("Piecewise: {}", steps.join(", "))
            }
            Self::StepDecay {
                decay_factor,
                step_epochs,
            } => format!(
                "Step Decay: factor={}, steps={:?}",
                decay_factor, step_epochs
            ),
            Self::CosineAnnealing {
                min_lr,
                total_epochs,
            } => format!(
                "Cosine Annealing: min={:.6}, epochs={}",
                min_lr, total_epochs
            ),
        }
    }
}

/// Inverse time decay applied per optimizer iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDecay {
    pub decay: f64,
}

impl TimeDecay {
    pub fn new(decay: f64) -> Self {
        Self { decay }
    }

    /// `lr / (1 + decay * iterations)`, where `iterations` counts steps already taken
    pub fn apply(&self, lr: f64, iterations: usize) -> f64 {
        lr / (1.0 + self.decay * iterations as f64)
    }
}
