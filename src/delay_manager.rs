use log::info;
use rand::Rng;
use std::thread;
use std::time::Duration;

use crate::config::PacingConfig;

/// When and how long the sweeper waits between requests.
pub trait Pacing {
    /// Pause between two terms on the same source.
    fn between_tasks(&mut self);
    /// Pause before moving on to the next source.
    fn between_sources(&mut self);
}

/// Sleeps a random number of whole seconds drawn from inclusive ranges.
pub struct RandomPacing {
    task_secs: (u64, u64),
    source_secs: (u64, u64),
}

impl RandomPacing {
    pub fn new(task_secs: (u64, u64), source_secs: (u64, u64)) -> Self {
        RandomPacing {
            task_secs,
            source_secs,
        }
    }

    fn wait(&self, (min, max): (u64, u64), label: &str) {
        let mut rng = rand::thread_rng();
        let delay_secs = rng.gen_range(min..=max);
        info!("Waiting for {} seconds ({} Delay)...", delay_secs, label);
        thread::sleep(Duration::from_secs(delay_secs));
    }
}

impl Pacing for RandomPacing {
    fn between_tasks(&mut self) {
        self.wait(self.task_secs, "Task");
    }

    fn between_sources(&mut self) {
        self.wait(self.source_secs, "Source");
    }
}

/// Never waits. Used by tests and `--no-pacing`.
#[derive(Debug, Default)]
pub struct NoPacing;

impl Pacing for NoPacing {
    fn between_tasks(&mut self) {}

    fn between_sources(&mut self) {}
}

/// Pacing policy described by `config`.
pub fn from_config(config: &PacingConfig) -> Box<dyn Pacing> {
    if !config.enabled {
        return Box::new(NoPacing);
    }
    let [task_min, task_max] = config.task_delay_secs;
    let [source_min, source_max] = config.source_delay_secs;
    Box::new(RandomPacing::new(
        (task_min, task_max),
        (source_min, source_max),
    ))
}
