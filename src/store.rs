extern crate chrono;
extern crate rusqlite;

use std::convert::TryFrom;

use crate::result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub e_bikes: u32,
    pub standard_bikes: u32,
    pub empty_slots: u32,
}

impl Reading {
    pub fn total_bikes(&self) -> u32 {
        return self.e_bikes.saturating_add(self.standard_bikes);
    }
}

pub trait TimeSeriesStore {
    // Ascending by timestamp, whole history.
    fn get_history(&self, station_id: &str) -> result::BikeDashResult<Vec<Reading>>;
    fn get_latest(&self, station_id: &str) -> result::BikeDashResult<Option<Reading>>;
    fn station_ids(&self) -> result::BikeDashResult<Vec<String>>;
}

const HISTORY_QUERY: &str = "
    SELECT last_update, nb_ebikes, nb_standard_bikes, nb_empty_docks
    FROM livecyclehireupdates
    WHERE terminal_name = ?1
    ORDER BY last_update ASC";

const STATION_IDS_QUERY: &str = "
    SELECT DISTINCT terminal_name
    FROM livecyclehireupdates";

type RawRow = (rusqlite::types::Value, i64, i64, i64);

pub struct SqliteStore {
    conn: rusqlite::Connection,
}

impl SqliteStore {
    // No write path, so the database is always opened read-only.
    pub fn open(conn_str: &str) -> result::BikeDashResult<SqliteStore> {
        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(conn_str, flags)?;
        debug!("Opened store {}", conn_str);
        return Ok(SqliteStore::from_connection(conn));
    }

    pub fn from_connection(conn: rusqlite::Connection) -> SqliteStore {
        return SqliteStore{conn: conn};
    }

    pub fn close(self) -> result::BikeDashResult<()> {
        return self.conn.close().map_err(|(_, err)| result::BikeDashError::from(err));
    }
}

impl TimeSeriesStore for SqliteStore {
    fn get_history(&self, station_id: &str) -> result::BikeDashResult<Vec<Reading>> {
        let mut stmt = self.conn.prepare(HISTORY_QUERY)?;
        let rows = stmt.query_map(rusqlite::params![station_id], raw_row)?
            .collect::<rusqlite::Result<Vec<RawRow>>>()?;

        let mut readings = rows.into_iter()
            .map(to_reading)
            .collect::<result::BikeDashResult<Vec<Reading>>>()?;

        // Text timestamps in mixed formats don't sort lexically.
        readings.sort_by_key(|r| r.timestamp);

        debug!("Fetched {} readings for {}", readings.len(), station_id);
        return Ok(readings);
    }

    // SQL can't order mixed timestamp formats, so pick by parsed time.
    fn get_latest(&self, station_id: &str) -> result::BikeDashResult<Option<Reading>> {
        return Ok(self.get_history(station_id)?.pop());
    }

    fn station_ids(&self) -> result::BikeDashResult<Vec<String>> {
        let mut stmt = self.conn.prepare(STATION_IDS_QUERY)?;
        let ids = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        return Ok(ids);
    }
}

// Opens a connection for the duration of `f` and always closes it afterwards.
pub fn with_store<T, F>(conn_str: &str, f: F) -> result::BikeDashResult<T>
where F: FnOnce(&dyn TimeSeriesStore) -> result::BikeDashResult<T> {
    let store = SqliteStore::open(conn_str)?;
    let outcome = f(&store);

    match store.close() {
        Ok(()) => {},
        Err(close_err) => {
            if outcome.is_ok() {
                return Err(close_err);
            }
            warn!("Also failed to close store: {}", close_err);
        },
    }

    return outcome;
}

fn raw_row(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
    return Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?));
}

fn to_reading(raw: RawRow) -> result::BikeDashResult<Reading> {
    let (last_update, e_bikes, standard_bikes, empty_slots) = raw;

    return Ok(Reading{
        timestamp: parse_timestamp(&last_update)?,
        e_bikes: to_count("nb_ebikes", e_bikes)?,
        standard_bikes: to_count("nb_standard_bikes", standard_bikes)?,
        empty_slots: to_count("nb_empty_docks", empty_slots)?,
    });
}

fn to_count(column: &str, value: i64) -> result::BikeDashResult<u32> {
    return u32::try_from(value).map_err(|_| {
        result::BikeDashError::StoreUnavailable(
            format!("malformed row: {} = {}", column, value))
    });
}

fn parse_timestamp(value: &rusqlite::types::Value) -> result::BikeDashResult<chrono::DateTime<chrono::Utc>> {
    use rusqlite::types::Value;

    let parsed = match *value {
        Value::Integer(secs) => chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0),
        Value::Text(ref text) => parse_timestamp_text(text),
        _ => None,
    };

    return parsed.ok_or(result::BikeDashError::StoreUnavailable(
        format!("malformed row: last_update = {:?}", value)));
}

fn parse_timestamp_text(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let text = text.trim();

    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&chrono::Utc));
    }

    for format in &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    return None;
}

#[cfg(test)]
pub mod tests {
    use super::TimeSeriesStore;

    pub fn memory_store(rows: &[(&str, &str, i64, i64, i64)]) -> super::SqliteStore {
        let conn = rusqlite::Connection::open_in_memory().expect("open_in_memory");
        conn.execute_batch("
            CREATE TABLE livecyclehireupdates (
                terminal_name TEXT,
                last_update TIMESTAMP,
                nb_ebikes INTEGER,
                nb_standard_bikes INTEGER,
                nb_empty_docks INTEGER
            );").expect("create table");

        for (station, ts, e, s, empty) in rows {
            conn.execute(
                "INSERT INTO livecyclehireupdates VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![station, ts, e, s, empty]).expect("insert");
        }

        return super::SqliteStore::from_connection(conn);
    }

    fn utc(text: &str) -> chrono::DateTime<chrono::Utc> {
        return chrono::DateTime::parse_from_rfc3339(text).expect("rfc3339").with_timezone(&chrono::Utc);
    }

    #[test]
    fn history_is_ascending_and_filtered() {
        let store = memory_store(&[
            ("001023", "2024-07-01 10:30:00", 1, 2, 3),
            ("001023", "2024-07-01 10:00:00", 4, 5, 6),
            ("001018", "2024-07-01 10:15:00", 7, 8, 9),
        ]);

        let history = store.get_history("001023").expect("get_history");
        assert_eq!(2, history.len());
        assert_eq!(utc("2024-07-01T10:00:00Z"), history[0].timestamp);
        assert_eq!((4, 5, 6), (history[0].e_bikes, history[0].standard_bikes, history[0].empty_slots));
        assert_eq!(utc("2024-07-01T10:30:00Z"), history[1].timestamp);
        assert_eq!(3, history[1].total_bikes());
    }

    #[test]
    fn latest_reading() {
        let store = memory_store(&[
            ("001023", "2024-07-01 10:00:00", 4, 5, 6),
            ("001023", "2024-07-02 09:00:00", 1, 1, 9),
        ]);

        let latest = store.get_latest("001023").expect("get_latest").expect("some");
        assert_eq!(utc("2024-07-02T09:00:00Z"), latest.timestamp);
        assert_eq!(9, latest.empty_slots);

        assert_eq!(None, store.get_latest("999999").expect("get_latest"));
        assert!(store.get_history("999999").expect("get_history").is_empty());
    }

    #[test]
    fn latest_across_timestamp_formats() {
        let store = memory_store(&[
            ("001023", "2024-07-01T09:00:00+01:00", 1, 1, 1),
            ("001023", "2024-07-01 10:00:00", 7, 7, 7),
            ("001023", "2024-07-01T09:30:00Z", 2, 2, 2),
        ]);
        store.conn.execute(
            "INSERT INTO livecyclehireupdates VALUES ('001023', ?1, 3, 3, 3)",
            rusqlite::params![1719828000i64 - 3600]).expect("insert");

        let history = store.get_history("001023").expect("get_history");
        let latest = store.get_latest("001023").expect("get_latest").expect("some");

        let order: Vec<u32> = history.iter().map(|r| r.e_bikes).collect();
        assert_eq!(vec![1, 3, 2, 7], order);
        assert_eq!(utc("2024-07-01T10:00:00Z"), latest.timestamp);
        assert_eq!(7, latest.e_bikes);
    }

    #[test]
    fn total_bikes_saturates() {
        let store = memory_store(&[("001023", "2024-07-01 10:00:00", u32::MAX as i64, 5, 0)]);

        let latest = store.get_latest("001023").expect("get_latest").expect("some");
        assert_eq!(u32::MAX, latest.total_bikes());
    }

    #[test]
    fn station_id_is_a_parameter_not_sql() {
        let store = memory_store(&[("001023", "2024-07-01 10:00:00", 4, 5, 6)]);

        let history = store.get_history("' OR '1'='1").expect("get_history");
        assert!(history.is_empty());
    }

    #[test]
    fn distinct_station_ids() {
        let store = memory_store(&[
            ("001023", "2024-07-01 10:00:00", 4, 5, 6),
            ("001023", "2024-07-01 10:15:00", 4, 5, 6),
            ("001018", "2024-07-01 10:15:00", 7, 8, 9),
        ]);

        let mut ids = store.station_ids().expect("station_ids");
        ids.sort();
        assert_eq!(vec!["001018".to_string(), "001023".to_string()], ids);
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(Some(utc("2024-07-01T10:00:00Z")), super::parse_timestamp_text("2024-07-01 10:00:00"));
        assert_eq!(Some(utc("2024-07-01T10:00:00.5Z")), super::parse_timestamp_text("2024-07-01 10:00:00.500"));
        assert_eq!(Some(utc("2024-07-01T09:00:00Z")), super::parse_timestamp_text("2024-07-01T10:00:00+01:00"));
        assert_eq!(None, super::parse_timestamp_text("yesterday"));

        let epoch = rusqlite::types::Value::Integer(1719828000);
        assert_eq!(utc("2024-07-01T10:00:00Z"), super::parse_timestamp(&epoch).expect("parse"));
    }

    #[test]
    fn malformed_rows_are_store_errors() {
        let store = memory_store(&[("001023", "not a time", 4, 5, 6)]);
        match store.get_history("001023") {
            Err(crate::result::BikeDashError::StoreUnavailable(msg)) => assert!(msg.contains("last_update")),
            other => panic!("unexpected {:?}", other),
        }

        let store = memory_store(&[("001023", "2024-07-01 10:00:00", -1, 5, 6)]);
        assert!(store.get_latest("001023").is_err());
    }

    #[test]
    fn missing_database_is_unavailable() {
        let result = super::with_store("/nonexistent/dir/readings.db", |store| store.station_ids());
        match result {
            Err(crate::result::BikeDashError::StoreUnavailable(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
    }
}
