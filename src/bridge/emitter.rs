//! Scripted commands sent to the radio on a free-running timer.
use log::warn;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::metrics;
use crate::xbee::codec::OutboundCommand;
use crate::xbee::SerialPeer;

pub struct PeriodicEmitter {
    interval: Duration,
    pause: Duration,
    commands: Vec<OutboundCommand>,
    last_fired: Instant,
}

impl PeriodicEmitter {
    /// The timer starts now; the first firing happens once `interval` has elapsed.
    pub fn new(interval: Duration, pause: Duration, commands: Vec<OutboundCommand>) -> Self {
        Self::starting_at(interval, pause, commands, Instant::now())
    }

    pub fn starting_at(
        interval: Duration,
        pause: Duration,
        commands: Vec<OutboundCommand>,
        start: Instant,
    ) -> Self {
        Self {
            interval,
            pause,
            commands,
            last_fired: start,
        }
    }

    pub fn commands(&self) -> &[OutboundCommand] {
        &self.commands
    }

    /// True when strictly more than one interval has passed since the last firing.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fired) > self.interval
    }

    /// Check the timer and, if due, reset it to `now`. At most one firing per call,
    /// however late the call is.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.last_fired = now;
            true
        } else {
            false
        }
    }

    /// Send every scripted command, pausing between consecutive ones. Write failures are
    /// logged and the remaining commands are still attempted.
    pub async fn emit<S: SerialPeer>(&self, serial: &mut S) -> usize {
        let mut sent = 0;
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                sleep(self.pause).await;
            }
            match serial.write_command(command) {
                Ok(()) => {
                    metrics::inc_commands_sent();
                    sent += 1;
                }
                Err(e) => warn!("Failed to send {} to XBee: {}", command, e),
            }
        }
        sent
    }

    /// Poll the timer and emit when due. Returns the number of commands written.
    pub async fn tick<S: SerialPeer>(&mut self, serial: &mut S) -> usize {
        if !self.poll(Instant::now()) {
            return 0;
        }
        let sent = self.emit(serial).await;
        // Measure the next interval from the end of the burst.
        self.last_fired = Instant::now();
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeResult;

    /// Records the virtual time of every command written.
    #[derive(Default)]
    struct StampedSerial {
        writes: Vec<(Instant, String)>,
    }

    impl SerialPeer for StampedSerial {
        fn read_available(&mut self, _buf: &mut [u8]) -> BridgeResult<usize> {
            Ok(0)
        }

        fn write_command(&mut self, command: &OutboundCommand) -> BridgeResult<()> {
            self.writes.push((Instant::now(), command.to_string()));
            Ok(())
        }
    }

    fn cmds() -> Vec<OutboundCommand> {
        vec![
            OutboundCommand::new("REPORT:SENSOR_1").unwrap(),
            OutboundCommand::new("CAMERA:SENSOR_1:ON").unwrap(),
        ]
    }

    #[test]
    fn fires_once_per_interval_regardless_of_poll_rate() {
        let start = Instant::now();
        let mut emitter =
            PeriodicEmitter::starting_at(Duration::from_secs(10), Duration::ZERO, cmds(), start);
        let mut fired = 0;
        // Poll every 50ms for 35s of simulated time
        for step in 0..=700u64 {
            if emitter.poll(start + Duration::from_millis(step * 50)) {
                fired += 1;
            }
        }
        assert_eq!(fired, 3);
    }

    #[test]
    fn exactly_one_interval_is_not_yet_due() {
        let start = Instant::now();
        let emitter =
            PeriodicEmitter::starting_at(Duration::from_secs(10), Duration::ZERO, cmds(), start);
        assert!(!emitter.is_due(start + Duration::from_secs(10)));
        assert!(emitter.is_due(start + Duration::from_millis(10_001)));
    }

    #[test]
    fn late_poll_fires_only_once() {
        let start = Instant::now();
        let mut emitter =
            PeriodicEmitter::starting_at(Duration::from_secs(10), Duration::ZERO, cmds(), start);
        let late = start + Duration::from_secs(95);
        assert!(emitter.poll(late));
        assert!(!emitter.poll(late));
        assert!(!emitter.poll(late + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_pauses_between_commands_and_restarts_the_interval() {
        let start = Instant::now();
        let mut emitter = PeriodicEmitter::starting_at(
            Duration::from_secs(10),
            Duration::from_secs(1),
            cmds(),
            start,
        );
        let mut serial = StampedSerial::default();

        tokio::time::advance(Duration::from_millis(10_001)).await;
        assert_eq!(emitter.tick(&mut serial).await, 2);
        assert_eq!(serial.writes.len(), 2);
        let (first_at, first) = &serial.writes[0];
        let (second_at, second) = &serial.writes[1];
        assert_eq!(first, "REPORT:SENSOR_1");
        assert_eq!(second, "CAMERA:SENSOR_1:ON");
        assert_eq!(*first_at - start, Duration::from_millis(10_001));
        let gap = *second_at - *first_at;
        assert!(gap >= Duration::from_secs(1) && gap < Duration::from_millis(1_010));

        // The next interval runs from the end of the burst, not from when it fired.
        let burst_end = *second_at;
        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(emitter.tick(&mut serial).await, 0);
        let remaining = Duration::from_secs(10) - (Instant::now() - burst_end);
        tokio::time::advance(remaining).await;
        assert_eq!(emitter.tick(&mut serial).await, 0);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(emitter.tick(&mut serial).await, 2);
        assert_eq!(serial.writes.len(), 4);
    }
}
