//! Text for the broadcast overlay.

use chrono::{DateTime, Utc};

use crate::stats::TrackRecord;

use super::config::OrchestratorConfig;
use super::session::RaceSession;
use super::types::RacePhase;

pub(super) fn entries_status(session: &RaceSession) -> String {
    if session.entries_open {
        if session.is_full() {
            "ENTRIES FULL - RACE STARTING SOON".to_string()
        } else {
            format!("ENTRIES OPEN - {} SLOTS LEFT", session.slots_left())
        }
    } else if matches!(session.phase, RacePhase::Finishing | RacePhase::Resetting) {
        "RACE RESULTS".to_string()
    } else {
        "RACE IN PROGRESS - ENTRIES CLOSED".to_string()
    }
}

/// Countdown line. Tick counters are shown in seconds.
pub(super) fn timer_text(config: &OrchestratorConfig, session: &RaceSession) -> String {
    match session.phase {
        RacePhase::EntriesOpen => "WAITING FOR RACERS".to_string(),
        RacePhase::CountdownToClose => format!(
            "Entries Close in: {}",
            config.seconds_from_ticks(session.entry_countdown)
        ),
        RacePhase::Filling => "FILLING BOT OPPONENTS".to_string(),
        RacePhase::WaitingToStart => "RACE STARTING SHORTLY".to_string(),
        RacePhase::Racing => "RACE IN PROGRESS".to_string(),
        RacePhase::Finishing => format!(
            "Race Resets in: {}",
            config.seconds_from_ticks(session.finish_countdown)
        ),
        RacePhase::Resetting => String::new(),
    }
}

pub(super) fn ticker_lines(
    record: Option<&TrackRecord>,
    last_winner: Option<&str>,
    next_race_at: Option<DateTime<Utc>>,
    season_entrants: usize,
) -> Vec<String> {
    let record = record
        .map(|r| format!("{} by {}", r.lap, r.holder))
        .unwrap_or_else(|| "N/A".to_string());
    let next = next_race_at
        .map(|t| t.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string());

    vec![
        "Use '!join' to join an open race. Details in description below".to_string(),
        format!("Current Track Record: {}", record),
        format!("Last Race Winner: {}", last_winner.unwrap_or("N/A")),
        format!("Next Race Approximate Start: {}", next),
        format!("Total Entrants This Season: {}", season_entrants),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::stats::LapTime;
    use crate::testing::{fixtures, MockRaceEngine};

    fn session(capacity: usize) -> RaceSession {
        RaceSession::new(Arc::new(MockRaceEngine::new()), Duration::from_secs(1), capacity)
    }

    #[test]
    fn test_entries_status() {
        let now = Utc::now();
        let mut s = session(2);
        assert_eq!(entries_status(&s), "ENTRIES OPEN - 2 SLOTS LEFT");

        s.add_entrant(fixtures::entrant("a", now));
        s.add_entrant(fixtures::entrant("b", now));
        assert_eq!(entries_status(&s), "ENTRIES FULL - RACE STARTING SOON");

        s.entries_open = false;
        s.phase = RacePhase::Racing;
        assert_eq!(entries_status(&s), "RACE IN PROGRESS - ENTRIES CLOSED");

        s.phase = RacePhase::Finishing;
        assert_eq!(entries_status(&s), "RACE RESULTS");
    }

    #[test]
    fn test_timer_text_in_seconds() {
        let config = OrchestratorConfig::default();
        let mut s = session(4);

        s.phase = RacePhase::CountdownToClose;
        s.entry_countdown = 400;
        assert_eq!(timer_text(&config, &s), "Entries Close in: 100");

        s.phase = RacePhase::Finishing;
        s.finish_countdown = 30;
        assert_eq!(timer_text(&config, &s), "Race Resets in: 8");

        s.phase = RacePhase::Resetting;
        assert_eq!(timer_text(&config, &s), "");
    }

    #[test]
    fn test_ticker_without_history() {
        let lines = ticker_lines(None, None, None, 0);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "Current Track Record: N/A");
        assert_eq!(lines[2], "Last Race Winner: N/A");
        assert_eq!(lines[3], "Next Race Approximate Start: N/A");
        assert_eq!(lines[4], "Total Entrants This Season: 0");
    }

    #[test]
    fn test_ticker_with_history() {
        let record = TrackRecord {
            lap: LapTime::from_millis(83_456),
            holder: "Alice".to_string(),
        };
        let next = Utc.with_ymd_and_hms(2024, 5, 1, 18, 4, 9).unwrap();

        let lines = ticker_lines(Some(&record), Some("Bob"), Some(next), 42);

        assert_eq!(lines[1], "Current Track Record: 01:23.456 by Alice");
        assert_eq!(lines[2], "Last Race Winner: Bob");
        assert_eq!(lines[3], "Next Race Approximate Start: 18:04:09 UTC");
        assert_eq!(lines[4], "Total Entrants This Season: 42");
    }
}
