use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE retrieval_outcomes (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp       TEXT NOT NULL,
            query_hash      TEXT NOT NULL,
            query_type      TEXT NOT NULL,
            node_id         TEXT NOT NULL,
            node_type       TEXT NOT NULL,
            node_subtype    TEXT,
            relevance_score REAL NOT NULL,
            was_used        INTEGER NOT NULL,
            context_tokens  INTEGER NOT NULL,
            latency_ms      INTEGER NOT NULL
         );
         CREATE INDEX idx_outcomes_timestamp ON retrieval_outcomes(timestamp);
         CREATE INDEX idx_outcomes_query_type ON retrieval_outcomes(query_type);
         CREATE INDEX idx_outcomes_node_type ON retrieval_outcomes(node_type);",
    )
}
