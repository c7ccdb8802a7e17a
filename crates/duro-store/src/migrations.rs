//! Versioned schema migrations (spec §4.N). A ledger table tracks which
//! ordinal migrations have run; a singleton `version` row records the
//! resulting `(major, minor)` pair for external inspection (spec §6).

use std::collections::HashSet;

use rusqlite::Connection;

use crate::error::StoreError;

/// Schema version this build of the store expects. Bump `MINOR` for
/// additive migrations, `MAJOR` for anything that changes existing column
/// semantics.
pub const CURRENT_MAJOR: i64 = 1;
pub const CURRENT_MINOR: i64 = 0;

fn migrations() -> Vec<(i64, &'static str)> {
    vec![
        (
            1,
            r#"
            CREATE TABLE IF NOT EXISTS tables (
                table_name      TEXT PRIMARY KEY,
                query           TEXT NOT NULL,
                interval        INTEGER,
                config          TEXT NOT NULL DEFAULT '{}',
                last_created    INTEGER,
                mean            REAL,
                times_run       INTEGER NOT NULL DEFAULT 0,
                force           INTEGER NOT NULL DEFAULT 0,
                started         INTEGER,
                deleted         INTEGER,
                waiting         INTEGER
            );

            CREATE TABLE IF NOT EXISTS timestamps (
                table           TEXT NOT NULL,
                start           INTEGER,
                connect         INTEGER,
                select_phase    INTEGER,
                create_temp     INTEGER,
                process         INTEGER,
                csv             INTEGER,
                s3              INTEGER,
                insert_phase    INTEGER,
                clean_csv       INTEGER,
                tests           INTEGER,
                replace_old     INTEGER,
                drop_old        INTEGER,
                make_snapshot   INTEGER,
                finish          INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_timestamps_table ON timestamps(table, start DESC);

            CREATE TABLE IF NOT EXISTS commits (
                hash            TEXT PRIMARY KEY,
                processed_ts    INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS version (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                major           INTEGER NOT NULL,
                minor           INTEGER NOT NULL
            );
            "#,
        ),
    ]
}

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS __duro_migrations_applied (ordinal INTEGER PRIMARY KEY);",
    )?;

    let applied: HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT ordinal FROM __duro_migrations_applied")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.filter_map(Result::ok).collect()
    };

    for (ordinal, sql) in migrations() {
        if applied.contains(&ordinal) {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO __duro_migrations_applied(ordinal) VALUES (?1)",
            [ordinal],
        )?;
    }

    conn.execute(
        "INSERT INTO version (id, major, minor) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET major = excluded.major, minor = excluded.minor",
        rusqlite::params![CURRENT_MAJOR, CURRENT_MINOR],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let (major, minor): (i64, i64) = conn
            .query_row("SELECT major, minor FROM version WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!((major, minor), (CURRENT_MAJOR, CURRENT_MINOR));
    }

    #[test]
    fn creates_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        for table in ["tables", "timestamps", "commits", "version"] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
