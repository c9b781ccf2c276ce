//! SQLite-backed stats store implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::warn;

use super::{ColorSet, LapTime, ParticipantStats, StatsError, StatsStore};

/// SQLite-backed stats store.
pub struct SqliteStatsStore {
    conn: Mutex<Connection>,
}

impl SqliteStatsStore {
    /// Open (or create) the stats database at `path`.
    pub fn new(path: &Path) -> Result<Self, StatsError> {
        let conn = Connection::open(path).map_err(|e| StatsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StatsError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StatsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StatsError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS participant_stats (
                owner_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                races_entered INTEGER NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                podiums INTEGER NOT NULL DEFAULT 0,
                points INTEGER NOT NULL DEFAULT 0,
                best_lap_ms INTEGER,
                saved_body TEXT,
                saved_colors TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_participant_stats_points ON participant_stats(points DESC);
            "#,
        )
        .map_err(|e| StatsError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_stats(row: &rusqlite::Row) -> rusqlite::Result<(String, ParticipantStats)> {
        let owner_id: String = row.get(0)?;
        let best_lap_ms: Option<i64> = row.get(6)?;
        let saved_colors: Option<String> = row.get(8)?;

        let stats = ParticipantStats {
            name: row.get(1)?,
            races_entered: row.get(2)?,
            wins: row.get(3)?,
            podiums: row.get(4)?,
            points: row.get(5)?,
            best_lap: best_lap_ms
                .filter(|ms| *ms > 0)
                .map(|ms| LapTime::from_millis(ms as u64)),
            saved_body: row.get(7)?,
            saved_colors: saved_colors.as_deref().and_then(decode_colors),
        };

        Ok((owner_id, stats))
    }
}

fn encode_colors(colors: &ColorSet) -> String {
    colors.join(",")
}

fn decode_colors(raw: &str) -> Option<ColorSet> {
    let parts: Vec<String> = raw.split(',').map(|c| c.trim().to_string()).collect();
    ColorSet::try_from(parts).ok()
}

impl StatsStore for SqliteStatsStore {
    fn load(&self) -> Result<HashMap<String, ParticipantStats>, StatsError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StatsError::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT owner_id, name, races_entered, wins, podiums, points, best_lap_ms, \
                 saved_body, saved_colors FROM participant_stats",
            )
            .map_err(|e| StatsError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_stats)
            .map_err(|e| StatsError::Database(e.to_string()))?;

        let mut ledger = HashMap::new();
        let mut unreadable = 0;
        for row in rows {
            match row {
                Ok((owner_id, stats)) => {
                    ledger.insert(owner_id, stats);
                }
                Err(e) => {
                    warn!("Skipping unreadable stats row: {}", e);
                    unreadable += 1;
                }
            }
        }

        // Nothing readable is not the same as nothing stored; the caller keeps
        // its last good copy instead of starting the season over.
        if ledger.is_empty() && unreadable > 0 {
            return Err(StatsError::Corrupt(format!(
                "{} stats rows could not be read",
                unreadable
            )));
        }

        Ok(ledger)
    }

    fn save(&self, ledger: &HashMap<String, ParticipantStats>) -> Result<(), StatsError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StatsError::Database(e.to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| StatsError::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO participant_stats
                        (owner_id, name, races_entered, wins, podiums, points,
                         best_lap_ms, saved_body, saved_colors, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(owner_id) DO UPDATE SET
                        name = excluded.name,
                        races_entered = excluded.races_entered,
                        wins = excluded.wins,
                        podiums = excluded.podiums,
                        points = excluded.points,
                        best_lap_ms = excluded.best_lap_ms,
                        saved_body = excluded.saved_body,
                        saved_colors = excluded.saved_colors,
                        updated_at = excluded.updated_at
                    "#,
                )
                .map_err(|e| StatsError::Database(e.to_string()))?;

            for (owner_id, stats) in ledger {
                stmt.execute(params![
                    owner_id,
                    stats.name,
                    stats.races_entered,
                    stats.wins,
                    stats.podiums,
                    stats.points,
                    stats.best_lap.map(|lap| lap.as_millis() as i64),
                    stats.saved_body,
                    stats.saved_colors.as_ref().map(encode_colors),
                    now,
                ])
                .map_err(|e| StatsError::Database(e.to_string()))?;
            }
        }

        // Dropping an uncommitted transaction rolls it back, so an error above
        // leaves the previous ledger intact.
        tx.commit()
            .map_err(|e| StatsError::Database(e.to_string()))?;

        Ok(())
    }
}
