//! Standings computation and the cached stats ledger.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{ColorSet, LapTime, ParticipantStats, StatsStore};
use crate::telemetry::FinishEntry;

/// Points for places 1 through 10.
pub const POINTS_TABLE: [u32; 10] = [15, 12, 10, 8, 7, 6, 5, 4, 3, 2];

/// Points awarded for `place` in a race with `finishers` classified cars.
///
/// Places beyond the table still earn a point while they are within the
/// finisher count.
pub fn points_for_place(place: u32, finishers: usize) -> u32 {
    match place {
        0 => 0,
        1..=10 => POINTS_TABLE[(place - 1) as usize],
        p if (p as usize) <= finishers => 1,
        _ => 0,
    }
}

/// Fastest lap on record and who set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub lap: LapTime,
    pub holder: String,
}

/// One finisher's classification in a processed race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placing {
    pub owner_id: String,
    pub name: String,
    pub place: u32,
    pub points: u32,
}

/// Outcome of folding one race into the ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RaceResult {
    /// Display name of the place-1 finisher.
    pub winner: Option<String>,
    pub placings: Vec<Placing>,
    /// Fastest lap set during this race.
    pub fastest_lap: Option<TrackRecord>,
    /// Whether `fastest_lap` beat the cached track record.
    pub new_record: bool,
}

/// Apply one race's finish list to `ledger` and `record`.
///
/// A finisher with no place (or place 0) is classified last, i.e. at the
/// length of the finish list.
pub fn apply_race(
    ledger: &mut HashMap<String, ParticipantStats>,
    record: &mut Option<TrackRecord>,
    finishers: &[FinishEntry],
) -> RaceResult {
    let total = finishers.len();
    let mut ordered: Vec<(u32, &FinishEntry)> = finishers
        .iter()
        .map(|f| {
            let place = f.place.filter(|p| *p > 0).unwrap_or(total as u32);
            (place, f)
        })
        .collect();
    ordered.sort_by_key(|(place, _)| *place);

    let mut result = RaceResult::default();

    for (place, finisher) in ordered {
        let points = points_for_place(place, total);
        let entry = ledger
            .entry(finisher.owner_id.clone())
            .or_insert_with(|| ParticipantStats::new(&finisher.name));

        entry.name = finisher.name.clone();
        entry.races_entered += 1;
        entry.points += points;
        if place <= 3 {
            entry.podiums += 1;
        }
        if place == 1 {
            entry.wins += 1;
            if result.winner.is_none() {
                result.winner = Some(finisher.name.clone());
            }
        }

        if let Some(lap) = finisher.best_lap {
            if entry.best_lap.map_or(true, |best| lap < best) {
                debug!("New personal best for {}: {}", finisher.name, lap);
                entry.best_lap = Some(lap);
            }
            if result.fastest_lap.as_ref().map_or(true, |f| lap < f.lap) {
                result.fastest_lap = Some(TrackRecord {
                    lap,
                    holder: finisher.name.clone(),
                });
            }
        }

        result.placings.push(Placing {
            owner_id: finisher.owner_id.clone(),
            name: finisher.name.clone(),
            place,
            points,
        });
    }

    if let Some(fastest) = &result.fastest_lap {
        if record.as_ref().map_or(true, |r| fastest.lap < r.lap) {
            info!("New track record: {} by {}", fastest.lap, fastest.holder);
            *record = Some(fastest.clone());
            result.new_record = true;
        }
    }

    result
}

/// Fastest best lap across the whole ledger.
fn record_from_ledger(ledger: &HashMap<String, ParticipantStats>) -> Option<TrackRecord> {
    ledger
        .values()
        .filter_map(|s| {
            s.best_lap.map(|lap| TrackRecord {
                lap,
                holder: s.name.clone(),
            })
        })
        .min_by_key(|r| r.lap)
}

/// In-memory copy of the season ledger backed by a [`StatsStore`].
///
/// Store failures never propagate: a failed load keeps the last good copy and
/// a failed save is logged while the in-memory ledger stays authoritative.
/// Until a save succeeds again the cache holds changes the store lacks, so
/// reloads are skipped.
pub struct StatsLedger {
    store: Arc<dyn StatsStore>,
    cache: HashMap<String, ParticipantStats>,
    record: Option<TrackRecord>,
    /// Set when the last save failed.
    unsaved: bool,
}

impl StatsLedger {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        let mut ledger = Self {
            store,
            cache: HashMap::new(),
            record: None,
            unsaved: false,
        };
        ledger.refresh();
        ledger.record = record_from_ledger(&ledger.cache);
        ledger
    }

    /// Reload from the store, keeping the cached ledger on failure or while
    /// it holds unsaved changes.
    pub fn refresh(&mut self) -> bool {
        if self.unsaved {
            debug!("Stats ledger has unsaved changes, not reloading");
            return false;
        }
        match self.store.load() {
            Ok(loaded) => {
                self.cache = loaded;
                true
            }
            Err(e) => {
                warn!("Failed to load stats, keeping last good ledger: {}", e);
                false
            }
        }
    }

    fn persist(&mut self) -> bool {
        match self.store.save(&self.cache) {
            Ok(()) => {
                self.unsaved = false;
                true
            }
            Err(e) => {
                error!("Failed to save stats ledger: {}", e);
                self.unsaved = true;
                false
            }
        }
    }

    /// Whether the cache holds changes the store has not accepted yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Fold a finished race into the ledger and persist it.
    pub fn record_race(&mut self, finishers: &[FinishEntry]) -> RaceResult {
        self.refresh();
        let result = apply_race(&mut self.cache, &mut self.record, finishers);
        if self.persist() {
            info!(
                "Recorded race with {} finishers (winner: {})",
                result.placings.len(),
                result.winner.as_deref().unwrap_or("none")
            );
        }
        result
    }

    /// Store a participant's vehicle choice without touching other stats.
    pub fn save_car(&mut self, owner_id: &str, name: &str, body: &str, colors: &ColorSet) -> bool {
        self.refresh();
        let entry = self
            .cache
            .entry(owner_id.to_string())
            .or_insert_with(|| ParticipantStats::new(name));
        entry.saved_body = Some(body.to_string());
        entry.saved_colors = Some(colors.clone());
        self.persist()
    }

    /// Clear every stored best lap and the cached record. Returns how many
    /// entries had a best lap.
    pub fn reset_best_laps(&mut self) -> usize {
        self.refresh();
        let mut cleared = 0;
        for stats in self.cache.values_mut() {
            if stats.best_lap.take().is_some() {
                cleared += 1;
            }
        }
        self.record = None;
        self.persist();
        cleared
    }

    pub fn get(&self, owner_id: &str) -> Option<&ParticipantStats> {
        self.cache.get(owner_id)
    }

    pub fn track_record(&self) -> Option<&TrackRecord> {
        self.record.as_ref()
    }

    /// Number of participants who have ever been recorded.
    pub fn season_entrants(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::SqliteStatsStore;
    use crate::testing::MemoryStatsStore;

    fn finisher(id: &str, place: Option<u32>, best_ms: Option<u64>) -> FinishEntry {
        FinishEntry {
            owner_id: id.to_string(),
            name: format!("Racer {}", id),
            place,
            best_lap: best_ms.map(LapTime::from_millis),
        }
    }

    #[test]
    fn test_points_table() {
        assert_eq!(points_for_place(1, 10), 15);
        assert_eq!(points_for_place(2, 10), 12);
        assert_eq!(points_for_place(10, 10), 2);
        assert_eq!(points_for_place(11, 11), 1);
        assert_eq!(points_for_place(12, 11), 0);
        assert_eq!(points_for_place(0, 5), 0);
    }

    #[test]
    fn test_winner_of_ten_gets_full_award() {
        let finishers: Vec<FinishEntry> = (1..=10)
            .map(|p| finisher(&format!("u{}", p), Some(p), None))
            .collect();
        let mut ledger = HashMap::new();
        let mut record = None;

        let result = apply_race(&mut ledger, &mut record, &finishers);

        let winner = &ledger["u1"];
        assert_eq!(winner.points, 15);
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.podiums, 1);
        assert_eq!(winner.races_entered, 1);
        assert_eq!(result.winner.as_deref(), Some("Racer u1"));
        assert_eq!(ledger["u3"].podiums, 1);
        assert_eq!(ledger["u4"].podiums, 0);
    }

    #[test]
    fn test_eleventh_of_eleven_gets_one_point() {
        let finishers: Vec<FinishEntry> = (1..=11)
            .map(|p| finisher(&format!("u{}", p), Some(p), None))
            .collect();
        let mut ledger = HashMap::new();
        let mut record = None;

        apply_race(&mut ledger, &mut record, &finishers);

        let last = &ledger["u11"];
        assert_eq!(last.points, 1);
        assert_eq!(last.podiums, 0);
        assert_eq!(last.wins, 0);
    }

    #[test]
    fn test_missing_place_is_last() {
        let finishers = vec![
            finisher("a", Some(1), None),
            finisher("b", Some(2), None),
            finisher("c", None, None),
        ];
        let mut ledger = HashMap::new();
        let mut record = None;

        let result = apply_race(&mut ledger, &mut record, &finishers);

        let c = result.placings.iter().find(|p| p.owner_id == "c").unwrap();
        assert_eq!(c.place, 3);
        assert_eq!(ledger["c"].points, 10);
        assert_eq!(ledger["c"].podiums, 1);
        assert_eq!(result.placings.last().unwrap().owner_id, "c");
    }

    #[test]
    fn test_best_lap_only_improves() {
        let mut ledger = HashMap::new();
        let mut existing = ParticipantStats::new("Racer a");
        existing.best_lap = Some(LapTime::from_millis(80_000));
        ledger.insert("a".to_string(), existing);
        let mut record = None;

        apply_race(&mut ledger, &mut record, &[finisher("a", Some(1), Some(81_000))]);
        assert_eq!(ledger["a"].best_lap, Some(LapTime::from_millis(80_000)));

        apply_race(&mut ledger, &mut record, &[finisher("a", Some(1), Some(79_500))]);
        assert_eq!(ledger["a"].best_lap, Some(LapTime::from_millis(79_500)));
        assert_eq!(ledger["a"].races_entered, 2);
    }

    #[test]
    fn test_track_record_updates_only_when_faster() {
        let mut ledger = HashMap::new();
        let mut record = Some(TrackRecord {
            lap: LapTime::from_millis(70_000),
            holder: "Old".to_string(),
        });

        let result = apply_race(
            &mut ledger,
            &mut record,
            &[finisher("a", Some(1), Some(71_000)), finisher("b", Some(2), Some(70_500))],
        );
        assert!(!result.new_record);
        assert_eq!(result.fastest_lap.unwrap().holder, "Racer b");
        assert_eq!(record.as_ref().unwrap().holder, "Old");

        let result = apply_race(&mut ledger, &mut record, &[finisher("c", Some(1), Some(69_999))]);
        assert!(result.new_record);
        assert_eq!(record.unwrap().holder, "Racer c");
    }

    #[test]
    fn test_ledger_persists_and_loads_record() {
        let store = Arc::new(SqliteStatsStore::in_memory().unwrap());
        let mut ledger = StatsLedger::new(store.clone());
        ledger.record_race(&[finisher("a", Some(1), Some(75_000)), finisher("b", Some(2), None)]);

        let reopened = StatsLedger::new(store);
        assert_eq!(reopened.season_entrants(), 2);
        assert_eq!(reopened.get("a").unwrap().wins, 1);
        assert_eq!(reopened.track_record().unwrap().holder, "Racer a");
    }

    #[test]
    fn test_ledger_keeps_cache_when_load_fails() {
        let store = Arc::new(MemoryStatsStore::new());
        let mut ledger = StatsLedger::new(store.clone());
        ledger.record_race(&[finisher("a", Some(1), None)]);

        store.fail_loads(true);
        ledger.record_race(&[finisher("a", Some(1), None)]);

        assert_eq!(ledger.get("a").unwrap().wins, 2);
    }

    #[test]
    fn test_ledger_survives_save_failure() {
        let store = Arc::new(MemoryStatsStore::new());
        store.fail_saves(true);
        let mut ledger = StatsLedger::new(store.clone());

        let result = ledger.record_race(&[finisher("a", Some(1), None)]);

        assert_eq!(result.winner.as_deref(), Some("Racer a"));
        assert_eq!(ledger.get("a").unwrap().points, 15);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_failed_save_is_kept_for_next_race() {
        let store = Arc::new(MemoryStatsStore::new());
        let mut ledger = StatsLedger::new(store.clone());

        store.fail_saves(true);
        ledger.record_race(&[finisher("a", Some(1), None)]);
        assert!(ledger.has_unsaved_changes());

        store.fail_saves(false);
        ledger.record_race(&[finisher("a", Some(1), None)]);

        assert!(!ledger.has_unsaved_changes());
        assert_eq!(ledger.get("a").unwrap().wins, 2);
        assert_eq!(store.snapshot()["a"].wins, 2);
    }

    #[test]
    fn test_failed_save_survives_save_car_and_lap_reset() {
        let store = Arc::new(MemoryStatsStore::new());
        let mut ledger = StatsLedger::new(store.clone());
        store.fail_saves(true);
        ledger.record_race(&[finisher("a", Some(1), Some(80_000))]);

        let colors = [
            "#FF0000".to_string(),
            "#0000FF".to_string(),
            "#222222".to_string(),
        ];
        assert!(!ledger.save_car("a", "Racer a", "typeb", &colors));
        assert_eq!(ledger.get("a").unwrap().wins, 1);

        store.fail_saves(false);
        assert_eq!(ledger.reset_best_laps(), 1);

        let saved = &store.snapshot()["a"];
        assert_eq!(saved.wins, 1);
        assert_eq!(saved.saved_body.as_deref(), Some("typeb"));
        assert_eq!(saved.best_lap, None);
    }

    #[test]
    fn test_save_car_preserves_stats() {
        let store = Arc::new(MemoryStatsStore::new());
        let mut ledger = StatsLedger::new(store.clone());
        ledger.record_race(&[finisher("a", Some(1), Some(80_000))]);

        let colors = [
            "#FF0000".to_string(),
            "#0000FF".to_string(),
            "#222222".to_string(),
        ];
        assert!(ledger.save_car("a", "Racer a", "typed", &colors));

        let saved = &store.snapshot()["a"];
        assert_eq!(saved.wins, 1);
        assert_eq!(saved.points, 15);
        assert_eq!(saved.saved_body.as_deref(), Some("typed"));
        assert_eq!(saved.saved_colors.as_ref(), Some(&colors));
    }

    #[test]
    fn test_reset_best_laps() {
        let store = Arc::new(MemoryStatsStore::new());
        let mut ledger = StatsLedger::new(store.clone());
        ledger.record_race(&[finisher("a", Some(1), Some(80_000)), finisher("b", Some(2), None)]);
        assert!(ledger.track_record().is_some());

        assert_eq!(ledger.reset_best_laps(), 1);
        assert!(ledger.track_record().is_none());
        assert!(store.snapshot()["a"].best_lap.is_none());
        assert_eq!(store.snapshot()["a"].wins, 1);
    }
}
