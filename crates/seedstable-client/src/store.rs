//! Per-identity position store with optional SQLite persistence.
//!
//! Reads are served from memory. Every `save` is written through to SQLite
//! (when `--db-path` is set) so positions and history survive restarts.
//! Missing or unreadable rows load as the zero state; they are logged, never
//! raised.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accrual::StakePosition;
use crate::error::ClientError;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Stake,
    Unstake,
    Claim,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stake => "stake",
            Self::Unstake => "unstake",
            Self::Claim => "claim",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stake" => Ok(Self::Stake),
            "unstake" => Ok(Self::Unstake),
            "claim" => Ok(Self::Claim),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// One history entry, written when the transaction is signed and before it
/// is sent. Immutable once appended except the settlement flags: `confirmed`
/// or `failed` may each go from `false` to `true`, and at most one of them
/// ever does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    /// Principal moved, base units. For claims, the rewards claimed.
    pub amount: u64,
    /// Rewards paid (claim, unstake) or frozen (top-up stake), base units,
    /// as computed when the transaction was signed.
    pub rewards_at_time: Option<u64>,
    pub submission_id: String,
    pub timestamp: i64,
    pub confirmed: bool,
    /// Terminal: rejected, failed on-chain, or expired without landing.
    #[serde(default)]
    pub failed: bool,
}

impl TransactionRecord {
    /// Neither confirmed nor failed yet.
    pub fn is_pending(&self) -> bool {
        !self.confirmed && !self.failed
    }
}

/// Everything stored for one identity. `history` is in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPosition {
    pub position: StakePosition,
    pub history: Vec<TransactionRecord>,
}

impl StoredPosition {
    fn empty(identity: Pubkey) -> Self {
        Self {
            position: StakePosition::empty(identity),
            history: Vec::new(),
        }
    }
}

/// Changes applied by one `save`: optionally replace the scalar fields, and
/// append history entries.
#[derive(Debug, Clone, Default)]
pub struct PositionPatch {
    pub position: Option<StakePosition>,
    pub append: Vec<TransactionRecord>,
}

// ============================================================================
// SQLite layer
// ============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS positions (
    identity         TEXT    PRIMARY KEY,
    staked_amount    INTEGER NOT NULL DEFAULT 0,
    stake_start_time INTEGER NOT NULL DEFAULT 0,
    last_claim_time  INTEGER NOT NULL DEFAULT 0,
    frozen_rewards   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS history (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    identity        TEXT    NOT NULL,
    kind            TEXT    NOT NULL,
    amount          INTEGER NOT NULL,
    rewards_at_time INTEGER,
    submission_id   TEXT    NOT NULL,
    ts              INTEGER NOT NULL,
    confirmed       INTEGER NOT NULL DEFAULT 0,
    failed          INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_history_identity ON history(identity);

PRAGMA journal_mode = WAL;
PRAGMA synchronous  = NORMAL;
";

struct Db(rusqlite::Connection);

impl Db {
    fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Db(conn))
    }

    /// Load every identity. Rows that do not parse are skipped with a warning.
    fn load_all(&self) -> rusqlite::Result<HashMap<Pubkey, StoredPosition>> {
        let mut map: HashMap<Pubkey, StoredPosition> = HashMap::new();

        let mut stmt = self.0.prepare(
            "SELECT identity, staked_amount, stake_start_time, last_claim_time, frozen_rewards
             FROM positions",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)? as u64,
            ))
        })?;
        for row in rows {
            let (identity, staked_amount, stake_start_time, last_claim_time, frozen_rewards) =
                match row {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable position row: {e}");
                        continue;
                    }
                };
            let Ok(owner) = Pubkey::from_str(&identity) else {
                tracing::warn!("Skipping position row with bad identity '{identity}'");
                continue;
            };
            map.insert(
                owner,
                StoredPosition {
                    position: StakePosition {
                        owner,
                        staked_amount,
                        stake_start_time,
                        last_claim_time,
                        frozen_rewards,
                    },
                    history: Vec::new(),
                },
            );
        }

        let mut stmt = self.0.prepare(
            "SELECT identity, kind, amount, rewards_at_time, submission_id, ts, confirmed, failed
             FROM history ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)? != 0,
                row.get::<_, i64>(7)? != 0,
            ))
        })?;
        for row in rows {
            let (identity, kind, amount, rewards_at_time, submission_id, timestamp, confirmed, failed) =
                match row {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable history row: {e}");
                        continue;
                    }
                };
            let (Ok(owner), Ok(kind)) = (Pubkey::from_str(&identity), kind.parse::<TransactionKind>()) else {
                tracing::warn!("Skipping corrupt history row for '{identity}'");
                continue;
            };
            map.entry(owner)
                .or_insert_with(|| StoredPosition::empty(owner))
                .history
                .push(TransactionRecord {
                    kind,
                    amount,
                    rewards_at_time,
                    submission_id,
                    timestamp,
                    confirmed,
                    failed,
                });
        }
        Ok(map)
    }

    /// Write one change in a single SQLite transaction.
    fn commit(&self, identity: &Pubkey, change: &Change) -> rusqlite::Result<()> {
        let tx = self.0.unchecked_transaction()?;
        if let Some(p) = &change.position {
            tx.execute(
                "INSERT INTO positions
                     (identity, staked_amount, stake_start_time, last_claim_time, frozen_rewards)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identity) DO UPDATE SET
                     staked_amount    = excluded.staked_amount,
                     stake_start_time = excluded.stake_start_time,
                     last_claim_time  = excluded.last_claim_time,
                     frozen_rewards   = excluded.frozen_rewards",
                rusqlite::params![
                    identity.to_string(),
                    p.staked_amount as i64,
                    p.stake_start_time,
                    p.last_claim_time,
                    p.frozen_rewards as i64,
                ],
            )?;
        }
        for r in &change.append {
            tx.execute(
                "INSERT INTO history
                     (identity, kind, amount, rewards_at_time, submission_id, ts, confirmed, failed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    identity.to_string(),
                    r.kind.as_str(),
                    r.amount as i64,
                    r.rewards_at_time.map(|v| v as i64),
                    r.submission_id,
                    r.timestamp,
                    r.confirmed as i64,
                    r.failed as i64,
                ],
            )?;
        }
        for id in &change.confirm {
            tx.execute(
                "UPDATE history SET confirmed = 1
                 WHERE identity = ?1 AND submission_id = ?2 AND confirmed = 0 AND failed = 0",
                rusqlite::params![identity.to_string(), id],
            )?;
        }
        for id in &change.fail {
            tx.execute(
                "UPDATE history SET failed = 1
                 WHERE identity = ?1 AND submission_id = ?2 AND confirmed = 0 AND failed = 0",
                rusqlite::params![identity.to_string(), id],
            )?;
        }
        tx.commit()
    }
}

/// Everything one store write may do, applied atomically.
#[derive(Debug, Default)]
struct Change {
    position: Option<StakePosition>,
    append: Vec<TransactionRecord>,
    confirm: Vec<String>,
    fail: Vec<String>,
}

impl Change {
    /// Apply to a copy of `stored`; returns how many pending entries were
    /// settled.
    fn apply(&self, stored: &mut StoredPosition) -> usize {
        if let Some(position) = self.position {
            stored.position = StakePosition {
                owner: stored.position.owner,
                ..position
            };
        }
        stored.history.extend(self.append.iter().cloned());
        let mut settled = 0;
        for r in stored.history.iter_mut().filter(|r| r.is_pending()) {
            if self.confirm.contains(&r.submission_id) {
                r.confirmed = true;
                settled += 1;
            } else if self.fail.contains(&r.submission_id) {
                r.failed = true;
                settled += 1;
            }
        }
        settled
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct PositionStore {
    inner: Arc<RwLock<HashMap<Pubkey, StoredPosition>>>,
    /// SQLite connection; None = in-memory only (no --db-path supplied).
    /// Also serializes writers.
    db: Arc<Mutex<Option<Db>>>,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            db: Arc::new(Mutex::new(None)),
        }
    }
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) a SQLite database at `path` and load existing data.
    pub fn with_db(path: &Path) -> anyhow::Result<Self> {
        let db = Db::open(path).map_err(|e| anyhow::anyhow!("SQLite open failed: {e}"))?;
        let positions = db
            .load_all()
            .map_err(|e| anyhow::anyhow!("SQLite load failed: {e}"))?;

        tracing::info!(
            "Loaded {} staking positions from {}",
            positions.len(),
            path.display()
        );

        Ok(Self {
            inner: Arc::new(RwLock::new(positions)),
            db: Arc::new(Mutex::new(Some(db))),
        })
    }

    /// Position and history for `identity`; the zero state if never saved.
    pub fn load(&self, identity: &Pubkey) -> StoredPosition {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
            .unwrap_or_else(|| StoredPosition::empty(*identity))
    }

    /// Apply `patch`: replace the scalar fields if given, append history.
    pub fn save(&self, identity: &Pubkey, patch: PositionPatch) -> Result<(), ClientError> {
        self.commit(
            identity,
            Change {
                position: patch.position,
                append: patch.append,
                ..Change::default()
            },
        )
        .map(|_| ())
    }

    /// Flip the `confirmed` flag of a pending entry. Returns `false` when no
    /// pending entry carries `submission_id`.
    pub fn mark_confirmed(&self, identity: &Pubkey, submission_id: &str) -> Result<bool, ClientError> {
        self.settle(identity, None, &[submission_id.to_string()])
            .map(|n| n > 0)
    }

    /// Mark a pending entry as terminally failed. Returns `false` when no
    /// pending entry carries `submission_id`.
    pub fn mark_failed(&self, identity: &Pubkey, submission_id: &str) -> Result<bool, ClientError> {
        self.commit(
            identity,
            Change {
                fail: vec![submission_id.to_string()],
                ..Change::default()
            },
        )
        .map(|n| n > 0)
    }

    /// Replace the scalar fields (if given) and confirm `submission_ids` in
    /// one write, so a transition is never applied without its entry being
    /// settled or the other way round. Returns how many entries flipped.
    pub fn settle(
        &self,
        identity: &Pubkey,
        position: Option<StakePosition>,
        submission_ids: &[String],
    ) -> Result<usize, ClientError> {
        self.commit(
            identity,
            Change {
                position,
                confirm: submission_ids.to_vec(),
                ..Change::default()
            },
        )
    }

    /// History entries still awaiting settlement, oldest first.
    pub fn unconfirmed(&self, identity: &Pubkey) -> Vec<TransactionRecord> {
        self.load(identity)
            .history
            .into_iter()
            .filter(TransactionRecord::is_pending)
            .collect()
    }

    /// Disk first, memory after the commit succeeds. Holding the db lock for
    /// the whole write keeps concurrent writers from interleaving.
    fn commit(&self, identity: &Pubkey, change: Change) -> Result<usize, ClientError> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = self.load(identity);
        let settled = change.apply(&mut next);

        if let Some(ref conn) = *db {
            if let Err(e) = conn.commit(identity, &change) {
                tracing::warn!(identity = %identity, "SQLite write failed, nothing applied: {e}");
                return Err(e.into());
            }
        }

        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*identity, next);
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> Pubkey {
        Pubkey::new_from_array([b; 32])
    }

    fn record(kind: TransactionKind, amount: u64, sig: &str, confirmed: bool) -> TransactionRecord {
        TransactionRecord {
            kind,
            amount,
            rewards_at_time: None,
            submission_id: sig.to_string(),
            timestamp: 1_700_000_000,
            confirmed,
            failed: false,
        }
    }

    fn position(owner: Pubkey, staked: u64) -> StakePosition {
        StakePosition {
            owner,
            staked_amount: staked,
            stake_start_time: 10,
            last_claim_time: 20,
            frozen_rewards: 3,
        }
    }

    #[test]
    fn load_unknown_identity_is_zero_state() {
        let store = PositionStore::new();
        let loaded = store.load(&id(1));
        assert_eq!(loaded.position.staked_amount, 0);
        assert!(loaded.history.is_empty());
        assert_eq!(loaded.position.owner, id(1));
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = PositionStore::new();
        let pos = position(id(2), 150);
        let history = vec![
            record(TransactionKind::Stake, 100, "a", true),
            record(TransactionKind::Stake, 50, "b", true),
        ];
        store
            .save(&id(2), PositionPatch { position: Some(pos), append: history.clone() })
            .unwrap();

        let loaded = store.load(&id(2));
        assert_eq!(loaded.position, pos);
        assert_eq!(loaded.history, history);
    }

    #[test]
    fn save_only_appends_history() {
        let store = PositionStore::new();
        store
            .save(&id(3), PositionPatch {
                position: Some(position(id(3), 100)),
                append: vec![record(TransactionKind::Stake, 100, "a", true)],
            })
            .unwrap();
        store
            .save(&id(3), PositionPatch {
                position: None,
                append: vec![record(TransactionKind::Claim, 0, "b", true)],
            })
            .unwrap();

        let loaded = store.load(&id(3));
        assert_eq!(loaded.position.staked_amount, 100);
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.history[0].submission_id, "a");
        assert_eq!(loaded.history[1].kind, TransactionKind::Claim);
    }

    #[test]
    fn mark_confirmed_only_flips_false_to_true() {
        let store = PositionStore::new();
        store
            .save(&id(4), PositionPatch {
                position: None,
                append: vec![record(TransactionKind::Stake, 5, "sig", false)],
            })
            .unwrap();
        assert_eq!(store.unconfirmed(&id(4)).len(), 1);
        assert!(store.mark_confirmed(&id(4), "sig").unwrap());
        assert!(!store.mark_confirmed(&id(4), "sig").unwrap());
        assert!(!store.mark_confirmed(&id(4), "other").unwrap());
        assert!(store.unconfirmed(&id(4)).is_empty());
    }

    #[test]
    fn survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.db");
        let pos = position(id(5), 777);
        let history = vec![
            record(TransactionKind::Stake, 777, "s1", true),
            TransactionRecord {
                rewards_at_time: Some(12),
                ..record(TransactionKind::Claim, 0, "c1", false)
            },
        ];
        {
            let store = PositionStore::with_db(&path).unwrap();
            store
                .save(&id(5), PositionPatch { position: Some(pos), append: history.clone() })
                .unwrap();
            store.mark_confirmed(&id(5), "c1").unwrap();
        }

        let reopened = PositionStore::with_db(&path).unwrap();
        let loaded = reopened.load(&id(5));
        assert_eq!(loaded.position, pos);
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.history[0], history[0]);
        assert_eq!(loaded.history[1].rewards_at_time, Some(12));
        assert!(loaded.history[1].confirmed);
    }

    #[test]
    fn corrupt_rows_load_as_zero_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.db");
        drop(PositionStore::with_db(&path).unwrap());

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO positions (identity, staked_amount) VALUES ('not-a-key', 5)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO history (identity, kind, amount, submission_id, ts)
             VALUES (?1, 'bogus', 1, 'x', 0)",
            rusqlite::params![id(6).to_string()],
        )
        .unwrap();
        drop(conn);

        let store = PositionStore::with_db(&path).unwrap();
        let loaded = store.load(&id(6));
        assert_eq!(loaded.position.staked_amount, 0);
        assert!(loaded.history.is_empty());
    }

    #[test]
    fn failed_entries_are_terminal() {
        let store = PositionStore::new();
        store
            .save(&id(7), PositionPatch {
                position: None,
                append: vec![
                    record(TransactionKind::Stake, 5, "bad", false),
                    record(TransactionKind::Stake, 6, "good", false),
                ],
            })
            .unwrap();

        assert!(store.mark_failed(&id(7), "bad").unwrap());
        assert!(!store.mark_failed(&id(7), "bad").unwrap());
        // a failed entry can no longer be confirmed
        assert!(!store.mark_confirmed(&id(7), "bad").unwrap());

        let pending = store.unconfirmed(&id(7));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].submission_id, "good");
        let history = store.load(&id(7)).history;
        assert!(history[0].failed && !history[0].confirmed);
    }

    #[test]
    fn settle_applies_position_and_confirmation_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.db");
        {
            let store = PositionStore::with_db(&path).unwrap();
            store
                .save(&id(8), PositionPatch {
                    position: None,
                    append: vec![record(TransactionKind::Stake, 40, "p", false)],
                })
                .unwrap();
            let settled = store
                .settle(&id(8), Some(position(id(8), 40)), &["p".to_string()])
                .unwrap();
            assert_eq!(settled, 1);
        }

        let reopened = PositionStore::with_db(&path).unwrap();
        let loaded = reopened.load(&id(8));
        assert_eq!(loaded.position.staked_amount, 40);
        assert!(loaded.history[0].confirmed);
        assert!(reopened.unconfirmed(&id(8)).is_empty());
    }

    #[test]
    fn failed_write_changes_neither_disk_nor_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.db");
        let store = PositionStore::with_db(&path).unwrap();
        store
            .save(&id(9), PositionPatch {
                position: Some(position(id(9), 100)),
                append: vec![record(TransactionKind::Stake, 100, "a", true)],
            })
            .unwrap();

        // Break the history table under the store so the second insert fails
        // after the position upsert has run.
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute("DROP TABLE history", []).unwrap();
        drop(conn);

        let err = store
            .save(&id(9), PositionPatch {
                position: Some(position(id(9), 999)),
                append: vec![record(TransactionKind::Stake, 899, "b", true)],
            })
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Store);

        let in_memory = store.load(&id(9));
        assert_eq!(in_memory.position.staked_amount, 100);
        assert_eq!(in_memory.history.len(), 1);
        drop(store);

        let reopened = PositionStore::with_db(&path).unwrap();
        assert_eq!(reopened.load(&id(9)).position.staked_amount, 100);
    }
}
