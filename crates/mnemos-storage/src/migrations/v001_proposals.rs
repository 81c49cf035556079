use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE proposals (
            id              TEXT PRIMARY KEY,
            type            TEXT NOT NULL,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            rationale       TEXT NOT NULL,
            evidence        TEXT NOT NULL,
            impact          TEXT NOT NULL,
            changes         TEXT NOT NULL,
            confidence      REAL NOT NULL,
            priority        INTEGER NOT NULL,
            status          TEXT NOT NULL,
            status_note     TEXT,
            source_pattern  TEXT NOT NULL,
            defer_until     TEXT,
            applied_at      TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
         );
         CREATE INDEX idx_proposals_status ON proposals(status);
         CREATE INDEX idx_proposals_created_at ON proposals(created_at);",
    )
}
