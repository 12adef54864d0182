use std::time::{Duration, Instant};

use crate::{CommandKind, PreviewCommand};

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// No command was supplied.
    NullCommand,
    /// Stops are never queued behind an outstanding command.
    StopWhileBusy {
        command: PreviewCommand,
        in_flight: CommandKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Nothing was outstanding; the command is now in flight and must be sent.
    /// A start sent this way discards any older pending start.
    Sent {
        command: PreviewCommand,
        superseded: Option<PreviewCommand>,
    },
    /// Stored as the pending start, possibly displacing an older one.
    Queued { replaced: Option<PreviewCommand> },
    Dropped(DropReason),
}

#[derive(Debug, Clone)]
struct InFlight {
    command: PreviewCommand,
    sent_at: Instant,
}

/// One in-flight command plus a single overwrite-only pending slot.
#[derive(Debug, Default, Clone)]
pub struct CommandSlots {
    in_flight: Option<InFlight>,
    pending: Option<PreviewCommand>,
}

impl CommandSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, command: Option<PreviewCommand>, now: Instant) -> Submission {
        let Some(command) = command else {
            return Submission::Dropped(DropReason::NullCommand);
        };

        if let Some(current) = &self.in_flight {
            return match command.kind() {
                CommandKind::Start => Submission::Queued {
                    replaced: self.pending.replace(command),
                },
                CommandKind::Stop => Submission::Dropped(DropReason::StopWhileBusy {
                    in_flight: current.command.kind(),
                    command,
                }),
            };
        }

        let superseded = match command.kind() {
            CommandKind::Start => self.pending.take(),
            CommandKind::Stop => None,
        };
        self.in_flight = Some(InFlight {
            command: command.clone(),
            sent_at: now,
        });
        Submission::Sent {
            command,
            superseded,
        }
    }

    /// Overwrite the pending slot regardless of what is in flight.
    pub fn schedule(&mut self, command: PreviewCommand) -> Option<PreviewCommand> {
        self.pending.replace(command)
    }

    /// Clear the in-flight slot, returning what was outstanding.
    pub fn acknowledge(&mut self) -> Option<PreviewCommand> {
        self.in_flight.take().map(|f| f.command)
    }

    pub fn take_pending(&mut self) -> Option<PreviewCommand> {
        self.pending.take()
    }

    pub fn in_flight(&self) -> Option<&PreviewCommand> {
        self.in_flight.as_ref().map(|f| &f.command)
    }

    pub fn pending(&self) -> Option<&PreviewCommand> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Drop an in-flight command that has waited longer than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Option<PreviewCommand> {
        let stale = self
            .in_flight
            .as_ref()
            .is_some_and(|f| now.saturating_duration_since(f.sent_at) >= timeout);
        if stale {
            self.acknowledge()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::ClipId;

    fn start(id: &str) -> PreviewCommand {
        PreviewCommand::start(ClipId::new(id), 4000, 0.0, 1.0)
    }

    fn stop(id: &str) -> PreviewCommand {
        PreviewCommand::stop(ClipId::new(id), 4000)
    }

    #[test]
    fn test_idle_slot_sends_immediately() {
        let mut slots = CommandSlots::new();
        let sub = slots.submit(Some(start("a")), Instant::now());
        assert_eq!(
            sub,
            Submission::Sent {
                command: start("a"),
                superseded: None
            }
        );
        assert_eq!(slots.in_flight(), Some(&start("a")));
        assert!(slots.pending().is_none());
    }

    #[test]
    fn test_last_start_wins() {
        let mut slots = CommandSlots::new();
        let now = Instant::now();
        slots.submit(Some(stop("c0")), now);

        assert_eq!(
            slots.submit(Some(start("s1")), now),
            Submission::Queued { replaced: None }
        );
        assert_eq!(
            slots.submit(Some(start("s2")), now),
            Submission::Queued {
                replaced: Some(start("s1"))
            }
        );
        slots.submit(Some(start("s3")), now);

        assert_eq!(slots.acknowledge(), Some(stop("c0")));
        assert_eq!(slots.take_pending(), Some(start("s3")));
        assert!(slots.take_pending().is_none());
    }

    #[test]
    fn test_stop_while_busy_is_dropped() {
        let mut slots = CommandSlots::new();
        let now = Instant::now();
        slots.submit(Some(start("a")), now);
        assert_eq!(
            slots.submit(Some(stop("a")), now),
            Submission::Dropped(DropReason::StopWhileBusy {
                command: stop("a"),
                in_flight: CommandKind::Start
            })
        );
        assert!(slots.pending().is_none());
    }

    #[test]
    fn test_direct_start_discards_stale_pending() {
        let mut slots = CommandSlots::new();
        let now = Instant::now();
        slots.submit(Some(start("a")), now);
        slots.submit(Some(start("b")), now);
        slots.acknowledge();

        // A newer start goes straight out while "b" still waits.
        assert_eq!(
            slots.submit(Some(start("c")), now),
            Submission::Sent {
                command: start("c"),
                superseded: Some(start("b"))
            }
        );
        assert!(slots.pending().is_none());
    }

    #[test]
    fn test_direct_stop_keeps_pending() {
        let mut slots = CommandSlots::new();
        slots.schedule(start("b"));
        assert!(matches!(
            slots.submit(Some(stop("a")), Instant::now()),
            Submission::Sent {
                superseded: None,
                ..
            }
        ));
        assert_eq!(slots.pending(), Some(&start("b")));
    }

    #[test]
    fn test_null_command_is_noop() {
        let mut slots = CommandSlots::new();
        assert_eq!(
            slots.submit(None, Instant::now()),
            Submission::Dropped(DropReason::NullCommand)
        );
        assert!(!slots.is_busy());
    }

    #[test]
    fn test_expire_after_timeout() {
        let mut slots = CommandSlots::new();
        let sent = Instant::now();
        slots.submit(Some(start("a")), sent);

        assert!(slots
            .expire(sent + Duration::from_millis(10), Duration::from_millis(50))
            .is_none());
        assert!(slots.is_busy());

        assert_eq!(
            slots.expire(sent + Duration::from_millis(60), Duration::from_millis(50)),
            Some(start("a"))
        );
        assert!(!slots.is_busy());
    }

    #[test]
    fn test_never_two_in_flight() {
        // Interleave requests and acks in a fixed pseudo-random order.
        let mut slots = CommandSlots::new();
        let now = Instant::now();
        let mut seed: u32 = 0x2545_f491;
        let mut outstanding = 0usize;

        for step in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let id = format!("clip-{step}");
            match seed % 3 {
                0 => {
                    let was_busy = slots.is_busy();
                    if let Submission::Sent { .. } = slots.submit(Some(start(&id)), now) {
                        assert!(!was_busy);
                        outstanding += 1;
                    }
                }
                1 => {
                    let was_busy = slots.is_busy();
                    if let Submission::Sent { .. } = slots.submit(Some(stop(&id)), now) {
                        assert!(!was_busy);
                        outstanding += 1;
                    }
                }
                _ => {
                    if slots.acknowledge().is_some() {
                        outstanding -= 1;
                        if let Some(next) = slots.take_pending() {
                            assert!(matches!(slots.submit(Some(next), now), Submission::Sent { .. }));
                            outstanding += 1;
                        }
                    }
                }
            }
            assert!(outstanding <= 1);
        }

        while slots.acknowledge().is_some() {
            if let Some(next) = slots.take_pending() {
                slots.submit(Some(next), now);
            }
        }
        assert!(slots.in_flight().is_none());
        assert!(slots.pending().is_none());
    }
}
