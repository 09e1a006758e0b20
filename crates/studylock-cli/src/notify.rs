use studylock_core::{Event, NotificationSink};
use tracing::{info, warn};

/// Surfaces notable events through the log. Stands in for desktop toasts.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&mut self, event: &Event) {
        if !event.is_notable() {
            return;
        }
        match event {
            Event::EnforcementDegraded { reason, .. } => {
                warn!("blocking unavailable, timer continues: {reason}");
            }
            Event::PersistenceWriteFailed { document, message, .. } => {
                warn!("could not save {document}: {message}");
            }
            other => info!("{}", summary(other)),
        }
    }
}

fn summary(event: &Event) -> String {
    match event {
        Event::PhaseStarted {
            phase,
            duration_secs,
            ..
        } => format!("{phase} started ({} min)", duration_secs / 60),
        Event::PhaseCompleted { phase, .. } => format!("{phase} complete"),
        Event::Paused {
            phase,
            remaining_secs,
            ..
        } => format!("{phase} paused with {} left", mm_ss(*remaining_secs)),
        Event::Resumed { phase, .. } => format!("{phase} resumed"),
        Event::Stopped { phase, .. } => format!("{phase} stopped"),
        Event::BreakSkipped { elapsed_secs, .. } => {
            format!("break skipped after {}", mm_ss(*elapsed_secs))
        }
        Event::DailyGoalReached { minutes_worked, .. } => {
            format!("daily goal reached: {minutes_worked} min worked, blocking released")
        }
        Event::DayRolledOver { day, .. } => format!("new day {day}: counters reset"),
        Event::OverrideStarted { expires_at, .. } => {
            format!("override active until {}", expires_at.format("%H:%M"))
        }
        Event::OverrideExpired { .. } => "override expired, blocking restored".to_string(),
        other => format!("{other:?}"),
    }
}

pub fn mm_ss(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_ss_pads() {
        assert_eq!(mm_ss(0), "00:00");
        assert_eq!(mm_ss(65), "01:05");
        assert_eq!(mm_ss(50 * 60), "50:00");
    }
}
