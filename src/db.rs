//! Session storage
//!
//! Provides persistence for chat sessions and their ordered messages.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt message record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Insert or replace a session together with its full message list
    pub fn save_session(&self, session: &Session) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO sessions (id, title, created_at, last_message_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET title = ?2, last_message_at = ?4",
            params![
                session.id,
                session.title,
                session.created_at.to_rfc3339(),
                session.last_message_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![session.id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (id, session_id, position, body) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, message) in session.messages.iter().enumerate() {
                let body = serde_json::to_string(message)?;
                stmt.execute(params![message.id, session.id, position, body])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a session by ID
    pub fn get_session(&self, id: &str) -> DbResult<Session> {
        let conn = self.conn.lock().unwrap();
        let header = conn
            .query_row(
                "SELECT id, title, created_at, last_message_at FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| DbError::SessionNotFound(id.to_string()))?;

        let messages = load_messages(&conn, id)?;
        Ok(Session {
            id: header.0,
            title: header.1,
            created_at: parse_datetime(&header.2),
            last_message_at: parse_datetime(&header.3),
            messages,
        })
    }

    /// All sessions, most recent activity first
    pub fn list_sessions(&self) -> DbResult<Vec<Session>> {
        let ids: Vec<String> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt =
                conn.prepare("SELECT id FROM sessions ORDER BY last_message_at DESC")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            ids
        };

        ids.iter().map(|id| self.get_session(id)).collect()
    }

    /// Delete a session and its messages
    pub fn delete_session(&self, id: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM messages WHERE session_id = ?1", params![id])?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }
}

fn load_messages(conn: &Connection, session_id: &str) -> DbResult<Vec<Message>> {
    let mut stmt =
        conn.prepare("SELECT body FROM messages WHERE session_id = ?1 ORDER BY position ASC")?;
    let bodies = stmt
        .query_map(params![session_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(DbError::from))
        .collect()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
