use burn::tensor::backend::AutodiffBackend;

use crate::callback::{Callback, CallbackError};

/// Halve the rate on every `drop_every`-th epoch, leave it alone otherwise.
pub fn step_decay(epoch: usize, lr: f64, drop_every: usize) -> f64 {
    if epoch % drop_every == 0 {
        lr / 2.0
    } else {
        lr
    }
}

/// Applies a schedule to the learning rate as each epoch begins.
pub struct LearningRateScheduler {
    schedule: Box<dyn Fn(usize, f64) -> f64>,
}

impl LearningRateScheduler {
    pub fn new(schedule: impl Fn(usize, f64) -> f64 + 'static) -> Self {
        LearningRateScheduler {
            schedule: Box::new(schedule),
        }
    }

    pub fn step_decay(drop_every: usize) -> Self {
        Self::new(move |epoch, lr| step_decay(epoch, lr, drop_every))
    }
}

impl<B: AutodiffBackend> Callback<B> for LearningRateScheduler {
    fn on_epoch_begin(&mut self, epoch: usize, lr: &mut f64) -> Result<(), CallbackError> {
        let next = (self.schedule)(epoch, *lr);
        if next != *lr {
            tracing::info!(epoch, lr = next, "dropping learning rate");
        }
        *lr = next;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_only_on_multiples() {
        for drop_every in [1, 7, 20, 40] {
            for epoch in 0..100 {
                let lr = step_decay(epoch, 1e-3, drop_every);
                if epoch % drop_every == 0 {
                    assert_eq!(lr, 5e-4, "epoch {epoch}, drop every {drop_every}");
                } else {
                    assert_eq!(lr, 1e-3, "epoch {epoch}, drop every {drop_every}");
                }
            }
        }
    }

    #[test]
    fn compounds_over_a_run() {
        let mut lr = 1.0;
        for epoch in 1..=40 {
            lr = step_decay(epoch, lr, 20);
        }

        assert_eq!(lr, 0.25);
    }
}
