//! SQLite-backed store via libsql. Implements StorePort with per-group
//! transactions for the dispatcher.
//!
//! One database file (copool.db) in the configured data directory. WAL mode
//! and synchronous=NORMAL for concurrent reads alongside the single writer.
//! Schema is created idempotently at connect time; migrations are external.

use crate::domain::{
    CandidateGroup, CombinationProposal, ConcentrationPoint, Coordinates, DomainError, GroupState,
    OfferState, ProposalState, RequestState, TripRequest,
};
use crate::ports::{NewAssignment, NewTripOffer, StorePort, StoreTx};
use libsql::{params, Connection, Database};
use std::path::{Path, PathBuf};
use tracing::info;

const TRIP_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trip_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    passenger_id INTEGER NOT NULL,
    origin_lat REAL NOT NULL,
    origin_lon REAL NOT NULL,
    destination_lat REAL NOT NULL,
    destination_lon REAL NOT NULL,
    origin_point_id INTEGER,
    destination_point_id INTEGER,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)"#;
const TRIP_REQUESTS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_trip_requests_state ON trip_requests (state)";

const CONCENTRATION_POINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS concentration_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    name TEXT NOT NULL
)"#;

const CANDIDATE_GROUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS candidate_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    point_id INTEGER NOT NULL,
    point_is_origin INTEGER NOT NULL,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)"#;

const GROUP_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS group_members (
    group_id INTEGER NOT NULL,
    request_id INTEGER NOT NULL,
    PRIMARY KEY (group_id, request_id)
)"#;

const COMBINATION_PROPOSALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS combination_proposals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    passenger_count INTEGER NOT NULL,
    state TEXT NOT NULL
)"#;
const COMBINATION_PROPOSALS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_proposals_group_state
ON combination_proposals (group_id, state)"#;

const PROPOSAL_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS proposal_members (
    proposal_id INTEGER NOT NULL,
    request_id INTEGER NOT NULL,
    PRIMARY KEY (proposal_id, request_id)
)"#;

const TRIP_OFFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trip_offers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    point_id INTEGER NOT NULL,
    point_is_origin INTEGER NOT NULL,
    route_json TEXT NOT NULL,
    distance_km REAL NOT NULL,
    duration_min INTEGER NOT NULL,
    estimated_revenue INTEGER NOT NULL,
    passenger_count INTEGER NOT NULL,
    state TEXT NOT NULL,
    source_proposal_id INTEGER NOT NULL
)"#;

const TRIP_PASSENGERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trip_passengers (
    trip_id INTEGER NOT NULL,
    request_id INTEGER NOT NULL,
    pickup_order INTEGER NOT NULL,
    dropoff_order INTEGER NOT NULL,
    fare INTEGER NOT NULL,
    PRIMARY KEY (trip_id, request_id)
)"#;

/// Written by the external account/session endpoints; this core only reads it.
const DRIVER_AVAILABILITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS driver_availability (
    driver_id INTEGER PRIMARY KEY,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    capacity INTEGER NOT NULL,
    available INTEGER NOT NULL,
    session_expires_at INTEGER NOT NULL
)"#;

fn store_err(e: impl ToString) -> DomainError {
    DomainError::Store(e.to_string())
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SQLite store. One database file (copool.db) in the given base directory.
pub struct SqliteStore {
    db: Database,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Connect to (or create) the database and ensure the schema exists.
    /// Call once at startup; the returned store is safe to share via Arc.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(store_err)?;
        let db_path = base.join("copool.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(store_err)?;
        let conn = db.connect().map_err(store_err)?;

        // WAL enables concurrent readers + one writer. PRAGMA returns a row;
        // use query and drain it (execute fails when rows come back).
        let mut wal_rows = conn
            .query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DomainError::Store(format!("WAL pragma failed: {e}")))?;
        while wal_rows.next().await.map_err(store_err)?.is_some() {}
        let mut sync_rows = conn
            .query("PRAGMA synchronous=NORMAL", ())
            .await
            .map_err(|e| DomainError::Store(format!("synchronous pragma failed: {e}")))?;
        while sync_rows.next().await.map_err(store_err)?.is_some() {}

        for ddl in [
            TRIP_REQUESTS_TABLE,
            TRIP_REQUESTS_INDEX,
            CONCENTRATION_POINTS_TABLE,
            CANDIDATE_GROUPS_TABLE,
            GROUP_MEMBERS_TABLE,
            COMBINATION_PROPOSALS_TABLE,
            COMBINATION_PROPOSALS_INDEX,
            PROPOSAL_MEMBERS_TABLE,
            TRIP_OFFERS_TABLE,
            TRIP_PASSENGERS_TABLE,
            DRIVER_AVAILABILITY_TABLE,
        ] {
            conn.execute(ddl, ()).await.map_err(store_err)?;
        }

        info!(path = %db_path.display(), "SQLite connected with WAL mode");

        Ok(Self { db, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<Connection, DomainError> {
        self.db.connect().map_err(store_err)
    }
}

fn row_to_request(row: &libsql::Row) -> Result<TripRequest, DomainError> {
    let state: String = row.get(8).map_err(store_err)?;
    Ok(TripRequest {
        id: row.get(0).map_err(store_err)?,
        passenger_id: row.get(1).map_err(store_err)?,
        origin: Coordinates::new(row.get(2).map_err(store_err)?, row.get(3).map_err(store_err)?),
        destination: Coordinates::new(
            row.get(4).map_err(store_err)?,
            row.get(5).map_err(store_err)?,
        ),
        origin_point_id: row.get(6).ok(),
        destination_point_id: row.get(7).ok(),
        state: RequestState::parse(&state)?,
        created_at: row.get(9).map_err(store_err)?,
        updated_at: row.get(10).map_err(store_err)?,
    })
}

fn row_to_group(row: &libsql::Row) -> Result<CandidateGroup, DomainError> {
    let point_is_origin: i64 = row.get(2).map_err(store_err)?;
    let state: String = row.get(3).map_err(store_err)?;
    Ok(CandidateGroup {
        id: row.get(0).map_err(store_err)?,
        point_id: row.get(1).map_err(store_err)?,
        point_is_origin: point_is_origin != 0,
        state: GroupState::parse(&state)?,
        created_at: row.get(4).map_err(store_err)?,
        updated_at: row.get(5).map_err(store_err)?,
    })
}

const REQUEST_COLUMNS: &str = "id, passenger_id, origin_lat, origin_lon, destination_lat, \
     destination_lon, origin_point_id, destination_point_id, state, created_at, updated_at";
const GROUP_COLUMNS: &str = "id, point_id, point_is_origin, state, created_at, updated_at";

#[async_trait::async_trait]
impl StorePort for SqliteStore {
    async fn available_capacities(&self) -> Result<Vec<u32>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT capacity FROM driver_availability \
                 WHERE available = 1 AND session_expires_at > ?1",
                params![now_ts()],
            )
            .await
            .map_err(store_err)?;
        let mut capacities = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let cap: i64 = row.get(0).map_err(store_err)?;
            capacities.push(cap as u32);
        }
        Ok(capacities)
    }

    async fn pending_requests(&self) -> Result<Vec<TripRequest>, DomainError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM trip_requests WHERE state = ?1 ORDER BY id"
        );
        let mut rows = conn
            .query(&sql, params![RequestState::Pending.as_str()])
            .await
            .map_err(store_err)?;
        let mut requests = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            requests.push(row_to_request(&row)?);
        }
        Ok(requests)
    }

    async fn requests_by_ids(&self, ids: &[i64]) -> Result<Vec<TripRequest>, DomainError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM trip_requests WHERE id = ?1");
        let mut requests = Vec::with_capacity(ids.len());
        for &id in ids {
            let mut rows = conn.query(&sql, params![id]).await.map_err(store_err)?;
            if let Some(row) = rows.next().await.map_err(store_err)? {
                requests.push(row_to_request(&row)?);
            }
        }
        Ok(requests)
    }

    async fn concentration_point(
        &self,
        id: i64,
    ) -> Result<Option<ConcentrationPoint>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, lat, lon, name FROM concentration_points WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(row) => Ok(Some(ConcentrationPoint {
                id: row.get(0).map_err(store_err)?,
                location: Coordinates::new(
                    row.get(1).map_err(store_err)?,
                    row.get(2).map_err(store_err)?,
                ),
                name: row.get(3).map_err(store_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn create_group(
        &self,
        point_id: i64,
        point_is_origin: bool,
        member_ids: &[i64],
    ) -> Result<i64, DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(store_err)?;
        let now = now_ts();
        tx.execute(
            "INSERT INTO candidate_groups (point_id, point_is_origin, state, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                point_id,
                point_is_origin as i64,
                GroupState::New.as_str(),
                now
            ],
        )
        .await
        .map_err(store_err)?;
        let group_id = tx.last_insert_rowid();

        for &request_id in member_ids {
            tx.execute(
                "INSERT INTO group_members (group_id, request_id) VALUES (?1, ?2)",
                params![group_id, request_id],
            )
            .await
            .map_err(store_err)?;
            tx.execute(
                "UPDATE trip_requests SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![RequestState::Grouped.as_str(), now, request_id],
            )
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(group_id)
    }

    async fn groups_in_state(
        &self,
        state: GroupState,
    ) -> Result<Vec<CandidateGroup>, DomainError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM candidate_groups WHERE state = ?1 ORDER BY id"
        );
        let mut rows = conn
            .query(&sql, params![state.as_str()])
            .await
            .map_err(store_err)?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            groups.push(row_to_group(&row)?);
        }
        Ok(groups)
    }

    async fn group_member_ids(&self, group_id: i64) -> Result<Vec<i64>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT request_id FROM group_members WHERE group_id = ?1 ORDER BY request_id",
                params![group_id],
            )
            .await
            .map_err(store_err)?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            ids.push(row.get(0).map_err(store_err)?);
        }
        Ok(ids)
    }

    async fn set_group_state(
        &self,
        group_id: i64,
        state: GroupState,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE candidate_groups SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state.as_str(), now_ts(), group_id],
        )
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn insert_proposals(
        &self,
        group_id: i64,
        subsets: &[Vec<i64>],
    ) -> Result<usize, DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(store_err)?;
        for subset in subsets {
            tx.execute(
                "INSERT INTO combination_proposals (group_id, passenger_count, state) \
                 VALUES (?1, ?2, ?3)",
                params![group_id, subset.len() as i64, ProposalState::Pending.as_str()],
            )
            .await
            .map_err(store_err)?;
            let proposal_id = tx.last_insert_rowid();
            for &request_id in subset {
                tx.execute(
                    "INSERT INTO proposal_members (proposal_id, request_id) VALUES (?1, ?2)",
                    params![proposal_id, request_id],
                )
                .await
                .map_err(store_err)?;
            }
        }
        tx.commit().await.map_err(store_err)?;
        Ok(subsets.len())
    }

    async fn groups_with_pending_proposals(&self) -> Result<Vec<CandidateGroup>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT g.id, g.point_id, g.point_is_origin, g.state, \
                        g.created_at, g.updated_at \
                 FROM candidate_groups g \
                 JOIN combination_proposals p ON g.id = p.group_id \
                 WHERE p.state = ?1 \
                 ORDER BY g.id",
                params![ProposalState::Pending.as_str()],
            )
            .await
            .map_err(store_err)?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            groups.push(row_to_group(&row)?);
        }
        Ok(groups)
    }

    async fn pending_proposals(
        &self,
        group_id: i64,
    ) -> Result<Vec<CombinationProposal>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, group_id, passenger_count, state FROM combination_proposals \
                 WHERE group_id = ?1 AND state = ?2 ORDER BY id",
                params![group_id, ProposalState::Pending.as_str()],
            )
            .await
            .map_err(store_err)?;
        let mut proposals = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let count: i64 = row.get(2).map_err(store_err)?;
            let state: String = row.get(3).map_err(store_err)?;
            proposals.push(CombinationProposal {
                id: row.get(0).map_err(store_err)?,
                group_id: row.get(1).map_err(store_err)?,
                passenger_count: count as u32,
                state: ProposalState::parse(&state)?,
            });
        }
        Ok(proposals)
    }

    async fn proposal_member_ids(&self, proposal_id: i64) -> Result<Vec<i64>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT request_id FROM proposal_members WHERE proposal_id = ?1 \
                 ORDER BY request_id",
                params![proposal_id],
            )
            .await
            .map_err(store_err)?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            ids.push(row.get(0).map_err(store_err)?);
        }
        Ok(ids)
    }

    async fn mark_pending_proposals_error(&self, group_id: i64) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE combination_proposals SET state = ?1 WHERE group_id = ?2 AND state = ?3",
            params![
                ProposalState::Error.as_str(),
                group_id,
                ProposalState::Pending.as_str()
            ],
        )
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn begin_group_tx(&self) -> Result<Box<dyn StoreTx>, DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(store_err)?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

/// One group's atomic write unit, backed by a libsql transaction.
struct SqliteTx {
    tx: libsql::Transaction,
}

#[async_trait::async_trait]
impl StoreTx for SqliteTx {
    async fn create_offer(
        &mut self,
        offer: &NewTripOffer,
        assignments: &[NewAssignment],
    ) -> Result<i64, DomainError> {
        self.tx
            .execute(
                "INSERT INTO trip_offers (point_id, point_is_origin, route_json, distance_km, \
                 duration_min, estimated_revenue, passenger_count, state, source_proposal_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    offer.point_id,
                    offer.point_is_origin as i64,
                    offer.route_json.as_str(),
                    offer.distance_km,
                    offer.duration_min as i64,
                    offer.estimated_revenue,
                    offer.passenger_count as i64,
                    OfferState::Available.as_str(),
                    offer.source_proposal_id
                ],
            )
            .await
            .map_err(store_err)?;
        let trip_id = self.tx.last_insert_rowid();

        for a in assignments {
            self.tx
                .execute(
                    "INSERT INTO trip_passengers (trip_id, request_id, pickup_order, \
                     dropoff_order, fare) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        trip_id,
                        a.request_id,
                        a.pickup_order as i64,
                        a.dropoff_order as i64,
                        a.fare
                    ],
                )
                .await
                .map_err(store_err)?;
        }
        Ok(trip_id)
    }

    async fn set_request_states(
        &mut self,
        ids: &[i64],
        state: RequestState,
    ) -> Result<(), DomainError> {
        let now = now_ts();
        for &id in ids {
            self.tx
                .execute(
                    "UPDATE trip_requests SET state = ?1, updated_at = ?2 WHERE id = ?3",
                    params![state.as_str(), now, id],
                )
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    async fn set_proposal_states(
        &mut self,
        ids: &[i64],
        state: ProposalState,
    ) -> Result<(), DomainError> {
        for &id in ids {
            self.tx
                .execute(
                    "UPDATE combination_proposals SET state = ?1 WHERE id = ?2",
                    params![state.as_str(), id],
                )
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    async fn set_group_state(
        &mut self,
        group_id: i64,
        state: GroupState,
    ) -> Result<(), DomainError> {
        self.tx
            .execute(
                "UPDATE candidate_groups SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![state.as_str(), now_ts(), group_id],
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(store_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(store_err)
    }
}
