use std::time::Duration;

pub(crate) type Clock = quanta::Clock;

#[cfg(test)]
pub(crate) type Mock = quanta::Mock;

/// Operations per second, or 0.0 when no measurable time has elapsed.
pub(crate) fn throughput(ops: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        ops as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::{throughput, Clock};
    use std::time::Duration;

    #[test]
    fn throughput_of_a_batch() {
        assert_eq!(throughput(1_000, Duration::from_millis(500)), 2_000.0);
        assert_eq!(throughput(1_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn mock_clock_drives_elapsed_time() {
        let (clock, mock) = Clock::mock();
        let start = clock.now();
        mock.increment(Duration::from_millis(250));
        assert_eq!(clock.now().duration_since(start), Duration::from_millis(250));
    }
}
