/// Step decay: the learning rate is multiplied by `gamma` every `step_size`
/// calls to `step`.
#[derive(Debug, Clone)]
pub struct StepLr {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    steps: usize,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            steps: 0,
        }
    }

    /// Advances one step and returns the learning rate to use for it.
    pub fn step(&mut self) -> f64 {
        self.steps += 1;
        self.current_lr()
    }

    pub fn current_lr(&self) -> f64 {
        let decays = (self.steps / self.step_size) as i32;
        self.base_lr * self.gamma.powi(decays)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}
