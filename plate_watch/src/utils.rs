use std::time::Duration;
use std::time::Instant;

/// Sleeps so that consecutive `wait` calls are at least `1 / fps` apart.
pub struct FpsLimiter {
    fps_control: Instant,
    fps_wait: Duration,
}

impl FpsLimiter {
    pub fn new(fps: u32) -> Self {
        Self {
            fps_control: Instant::now(),
            fps_wait: Duration::from_millis(1000 / fps.max(1) as u64),
        }
    }

    pub fn wait(&mut self) {
        let elapsed = self.fps_control.elapsed();

        if self.fps_wait > elapsed {
            spin_sleep::sleep(self.fps_wait - elapsed);
        }

        self.fps_control = Instant::now();
    }
}
