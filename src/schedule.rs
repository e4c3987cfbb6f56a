use burn::{config::Config, lr_scheduler::LrScheduler, prelude::Backend, LearningRate};

/// The configuration for creating an [inverse time decay scheduler](InverseTimeDecayLrScheduler).
///
/// The learning rate at iteration `t` (starting at 0) is `initial_lr / (1 + decay * t)`.
#[derive(Config, Debug)]
pub struct InverseTimeDecayLrSchedulerConfig {
    // The learning rate of the first update.
    initial_lr: LearningRate,
    // How fast the learning rate shrinks. Zero keeps it constant.
    decay: f64,
}

impl InverseTimeDecayLrSchedulerConfig {
    /// Initializes an [inverse time decay scheduler](InverseTimeDecayLrScheduler).
    ///
    /// # Errors
    ///
    /// An error will be returned if the initial learning rate is not positive or the decay is
    /// negative.
    pub fn init(&self) -> Result<InverseTimeDecayLrScheduler, String> {
        if self.initial_lr.is_nan() || self.initial_lr <= 0.0 {
            return Err("Initial learning rate must be greater than 0".into());
        }
        if self.decay.is_nan() || self.decay < 0.0 {
            return Err("Decay must not be negative".into());
        }

        Ok(InverseTimeDecayLrScheduler {
            initial_lr: self.initial_lr,
            decay: self.decay,
            iteration: 0,
        })
    }
}

/// Inverse time decay learning rate scheduler.
#[derive(Clone, Debug)]
pub struct InverseTimeDecayLrScheduler {
    initial_lr: LearningRate,
    decay: f64,
    // Number of updates already scheduled.
    iteration: usize,
}

impl LrScheduler for InverseTimeDecayLrScheduler {
    type Record<B: Backend> = usize;

    fn step(&mut self) -> LearningRate {
        let lr = self.initial_lr / (1.0 + self.decay * self.iteration as f64);
        self.iteration += 1;
        lr
    }

    fn to_record<B: Backend>(&self) -> Self::Record<B> {
        self.iteration
    }

    fn load_record<B: Backend>(mut self, record: Self::Record<B>) -> Self {
        self.iteration = record;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    const LOOSE_EPSILON: f64 = 1e-12;

    fn scheduler(initial_lr: LearningRate, decay: f64) -> InverseTimeDecayLrScheduler {
        InverseTimeDecayLrSchedulerConfig::new(initial_lr, decay)
            .init()
            .expect("A scheduler should be created successfully")
    }

    #[test]
    fn test_config_invalid_values() {
        assert!(InverseTimeDecayLrSchedulerConfig::new(0.0, 0.1).init().is_err());
        assert!(InverseTimeDecayLrSchedulerConfig::new(0.1, -1.0).init().is_err());
        assert!(InverseTimeDecayLrSchedulerConfig::new(0.1, f64::NAN).init().is_err());
    }

    #[test]
    fn test_lr_sequence() {
        let mut scheduler = scheduler(1.0, 0.5);
        let expected = [1.0, 1.0 / 1.5, 0.5, 1.0 / 2.5];

        for (step, expected) in expected.into_iter().enumerate() {
            let lr = scheduler.step();
            assert!(
                (lr - expected).abs() < LOOSE_EPSILON,
                "step {step}: {lr} != {expected}"
            );
        }
    }

    #[test]
    fn test_zero_decay_is_constant() {
        let mut scheduler = scheduler(1e-4, 0.0);

        for _ in 0..10 {
            assert_eq!(scheduler.step(), 1e-4);
        }
    }

    #[test]
    fn test_default_decay_after_one_epoch() {
        let mut scheduler = scheduler(1e-4, 1e-6);
        let lr = (0..1563).map(|_| scheduler.step()).last().unwrap();

        assert!((lr - 1e-4 / (1.0 + 1e-6 * 1562.0)).abs() < LOOSE_EPSILON);
    }

    #[test]
    fn test_save_and_load() {
        let mut truth = scheduler(0.01, 0.1);
        let mut resumed = truth.clone();
        (0..5).for_each(|_| {
            truth.step();
            resumed.step();
        });

        let record = resumed.to_record::<NdArray>();
        let mut resumed = scheduler(0.01, 0.1).load_record::<NdArray>(record);

        for _ in 0..5 {
            assert!((truth.step() - resumed.step()).abs() < f64::EPSILON);
        }
    }
}
