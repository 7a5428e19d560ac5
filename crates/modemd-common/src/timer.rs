//! Timer service.
//!
//! A single dedicated thread tracks all armed timers and posts
//! [`Event::Timer`] to the automaton channel on expiry. Timers are one-shot
//! unless armed with a period. Periodic firing is coalesced: once a timer's
//! event has been posted, further expiries are suppressed until the consumer
//! calls [`TimerService::acknowledge`], so a slow consumer can never be
//! flooded by its own polling timer.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::events::{post_event, Event, EventSender, TimerId};

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug)]
enum TimerCommand {
    Start {
        id: TimerId,
        delay: Duration,
        period: Option<Duration>,
    },
    Cancel(TimerId),
    Acknowledge(TimerId),
    Shutdown,
}

struct ActiveTimer {
    id: TimerId,
    deadline: Instant,
    period: Option<Duration>,
    in_flight: bool,
}

// ============================================================================
// Service
// ============================================================================

/// Handle to the timer thread.
///
/// Cloneable via the command sender; the thread exits when the service is
/// dropped.
pub struct TimerService {
    tx: Sender<TimerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl TimerService {
    /// Spawn the timer thread. Fired timers post to `events`.
    pub fn spawn(events: EventSender) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("modemd-timer".to_string())
            .spawn(move || timer_loop(rx, events))
            .expect("failed to spawn timer thread");
        TimerService {
            tx,
            handle: Some(handle),
        }
    }

    /// Arm (or re-arm) a one-shot timer.
    pub fn start_oneshot(&self, id: TimerId, delay: Duration) {
        let _ = self.tx.send(TimerCommand::Start {
            id,
            delay,
            period: None,
        });
    }

    /// Arm (or re-arm) a periodic timer with the given period.
    pub fn start_periodic(&self, id: TimerId, period: Duration) {
        let _ = self.tx.send(TimerCommand::Start {
            id,
            delay: period,
            period: Some(period),
        });
    }

    /// Cancel a timer. No-op if it is not armed.
    pub fn cancel(&self, id: TimerId) {
        let _ = self.tx.send(TimerCommand::Cancel(id));
    }

    /// Acknowledge a received `Event::Timer(id)`, allowing the next periodic
    /// firing of `id` to post again.
    pub fn acknowledge(&self, id: TimerId) {
        let _ = self.tx.send(TimerCommand::Acknowledge(id));
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        let _ = self.tx.send(TimerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// Timer Thread
// ============================================================================

fn timer_loop(rx: Receiver<TimerCommand>, events: EventSender) {
    let mut timers: Vec<ActiveTimer> = Vec::new();

    loop {
        let now = Instant::now();

        // Fire everything that is due.
        let mut i = 0;
        while i < timers.len() {
            if timers[i].deadline <= now {
                let timer = &mut timers[i];
                if !timer.in_flight {
                    if post_event(&events, Event::Timer(timer.id)) {
                        timer.in_flight = true;
                    }
                } else {
                    log::trace!("timer {:?} expiry coalesced", timer.id);
                }
                match timer.period {
                    Some(period) => {
                        timer.deadline += period;
                        i += 1;
                    }
                    None => {
                        timers.swap_remove(i);
                    }
                }
            } else {
                i += 1;
            }
        }

        // Sleep until the next deadline or the next command.
        let wait = timers
            .iter()
            .map(|t| t.deadline.saturating_duration_since(now))
            .min()
            .unwrap_or(Duration::from_secs(3600));

        let command = match rx.recv_timeout(wait) {
            Ok(cmd) => cmd,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };

        match command {
            TimerCommand::Start { id, delay, period } => {
                timers.retain(|t| t.id != id);
                timers.push(ActiveTimer {
                    id,
                    deadline: Instant::now() + delay,
                    period,
                    in_flight: false,
                });
            }
            TimerCommand::Cancel(id) => {
                timers.retain(|t| t.id != id);
            }
            TimerCommand::Acknowledge(id) => {
                if let Some(timer) = timers.iter_mut().find(|t| t.id == id) {
                    timer.in_flight = false;
                }
            }
            TimerCommand::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;

    #[test]
    fn test_oneshot_fires_once() {
        let (tx, rx) = event_channel();
        let timers = TimerService::spawn(tx);
        timers.start_oneshot(TimerId::Register, Duration::from_millis(10));

        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event, Event::Timer(TimerId::Register));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let (tx, rx) = event_channel();
        let timers = TimerService::spawn(tx);
        timers.start_oneshot(TimerId::NetworkStatus, Duration::from_millis(50));
        timers.cancel(TimerId::NetworkStatus);

        assert!(rx.recv_timeout(Duration::from_millis(120)).is_err());
    }

    #[test]
    fn test_periodic_coalesces_until_acknowledged() {
        let (tx, rx) = event_channel();
        let timers = TimerService::spawn(tx);
        timers.start_periodic(TimerId::Polling, Duration::from_millis(10));

        // First firing arrives.
        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event, Event::Timer(TimerId::Polling));

        // Without an ack, further periods do not post.
        std::thread::sleep(Duration::from_millis(60));
        assert!(rx.try_recv().is_err());

        // After acknowledging, the next period posts again.
        timers.acknowledge(TimerId::Polling);
        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event, Event::Timer(TimerId::Polling));
    }

    #[test]
    fn test_rearm_replaces_existing() {
        let (tx, rx) = event_channel();
        let timers = TimerService::spawn(tx);
        timers.start_oneshot(TimerId::Register, Duration::from_millis(200));
        timers.start_oneshot(TimerId::Register, Duration::from_millis(10));

        // Fires on the re-armed (short) deadline, and only once.
        let event = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event, Event::Timer(TimerId::Register));
        assert!(rx.recv_timeout(Duration::from_millis(250)).is_err());
    }
}
