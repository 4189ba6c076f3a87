/// Interval counter deciding on which ticks motion is evaluated while a
/// clip is recording.
#[derive(Debug, Clone)]
pub struct MotionCadence {
    interval: u32,
    count: u32,
}

impl MotionCadence {
    /// Check every `secs_between_checks` seconds at `fps`
    pub fn new(secs_between_checks: u32, fps: u32) -> Self {
        Self {
            interval: (secs_between_checks * fps).max(1),
            count: 0,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Count one tick; true when this tick is due for a check
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.interval {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_every_interval() {
        let mut cadence = MotionCadence::new(2, 5);
        let due: Vec<bool> = (0..20).map(|_| cadence.tick()).collect();
        assert_eq!(due.iter().filter(|d| **d).count(), 2);
        assert!(due[9] && due[19]);
    }

    #[test]
    fn test_zero_interval_checks_every_tick() {
        let mut cadence = MotionCadence::new(0, 10);
        assert!(cadence.tick());
        assert!(cadence.tick());
    }

    #[test]
    fn test_reset_restarts_interval() {
        let mut cadence = MotionCadence::new(1, 3);
        cadence.tick();
        cadence.tick();
        cadence.reset();
        assert!(!cadence.tick());
        assert!(!cadence.tick());
        assert!(cadence.tick());
    }
}
