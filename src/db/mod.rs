pub mod models;

use models::{ConversationSession, Document, Message, Role, User};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";
const SESSION_COLUMNS: &str = "id, user_id, is_active, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";
const DOCUMENT_COLUMNS: &str = "id, user_id, filename, file_path, file_size, uploaded_at";

fn user_from_row(row: &Row<'_>) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn session_from_row(row: &Row<'_>) -> Result<ConversationSession> {
    Ok(ConversationSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        is_active: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> Result<Message> {
    let role: String = row.get(2)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn document_from_row(row: &Row<'_>) -> Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        user_id: row.get(1)?,
        filename: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        uploaded_at: row.get(5)?,
    })
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// A panic while holding the lock cannot leave SQLite itself in a torn
    /// state, so a poisoned mutex is simply recovered.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL DEFAULT '',
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS login_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER,
                uploaded_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS conversation_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (session_id) REFERENCES conversation_sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id, uploaded_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON conversation_sessions(user_id, is_active);
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);
            ",
        )?;
        Ok(())
    }

    // ── Users ──

    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        let conn = self.lock();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, username, email, password_hash],
        )?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
    }

    // ── Login tokens ──

    pub fn create_login_token(&self, user_id: &str) -> Result<String> {
        let conn = self.lock();
        let token = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO login_tokens (token, user_id) VALUES (?1, ?2)",
            params![token, user_id],
        )?;
        Ok(token)
    }

    pub fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT u.id, u.username, u.email, u.password_hash, u.created_at
             FROM login_tokens t JOIN users u ON u.id = t.user_id
             WHERE t.token = ?1",
            params![token],
            user_from_row,
        )
        .optional()
    }

    pub fn delete_login_token(&self, token: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM login_tokens WHERE token = ?1", params![token])?;
        Ok(())
    }

    // ── Documents ──

    pub fn create_document(
        &self,
        id: &str,
        user_id: &str,
        filename: &str,
        file_path: &str,
        file_size: Option<i64>,
    ) -> Result<Document> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO documents (id, user_id, filename, file_path, file_size) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, user_id, filename, file_path, file_size],
        )?;
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            document_from_row,
        )
    }

    pub fn get_document(&self, user_id: &str, id: &str) -> Result<Option<Document>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            document_from_row,
        )
        .optional()
    }

    /// Most recent upload of the user, used when a chat names no document.
    pub fn latest_document(&self, user_id: &str) -> Result<Option<Document>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE user_id = ?1
                 ORDER BY uploaded_at DESC, rowid DESC LIMIT 1"
            ),
            params![user_id],
            document_from_row,
        )
        .optional()
    }

    pub fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE user_id = ?1
             ORDER BY uploaded_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], document_from_row)?;
        rows.collect()
    }

    /// Returns whether a row owned by `user_id` was removed.
    pub fn delete_document(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM documents WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(removed > 0)
    }

    // ── Conversation sessions ──

    pub fn active_session(&self, user_id: &str) -> Result<Option<ConversationSession>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM conversation_sessions
                 WHERE user_id = ?1 AND is_active = 1
                 ORDER BY updated_at DESC, rowid DESC LIMIT 1"
            ),
            params![user_id],
            session_from_row,
        )
        .optional()
    }

    pub fn get_or_create_active_session(&self, user_id: &str) -> Result<ConversationSession> {
        if let Some(session) = self.active_session(user_id)? {
            return Ok(session);
        }
        self.start_new_session(user_id)
    }

    /// Deactivate every session of the user and open a fresh one.
    pub fn start_new_session(&self, user_id: &str) -> Result<ConversationSession> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE conversation_sessions SET is_active = 0, updated_at = datetime('now')
             WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
        )?;
        let id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO conversation_sessions (id, user_id, is_active) VALUES (?1, ?2, 1)",
            params![id, user_id],
        )?;
        let session = tx.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM conversation_sessions WHERE id = ?1"),
            params![id],
            session_from_row,
        )?;
        tx.commit()?;
        Ok(session)
    }

    #[cfg(test)]
    pub fn count_active_sessions(&self, user_id: &str) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM conversation_sessions WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
            |row| row.get(0),
        )
    }

    // ── Messages ──

    pub fn add_message(&self, session_id: &str, role: Role, content: &str) -> Result<Message> {
        let conn = self.lock();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO messages (id, session_id, role, content) VALUES (?1, ?2, ?3, ?4)",
            params![id, session_id, role.as_str(), content],
        )?;
        // Touch session updated_at
        conn.execute(
            "UPDATE conversation_sessions SET updated_at = datetime('now') WHERE id = ?1",
            params![session_id],
        )?;
        conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![id],
            message_from_row,
        )
    }

    /// Messages of a session, oldest first; insertion order breaks
    /// same-second timestamp ties.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![session_id], message_from_row)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn db_with_user() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice", "alice@example.com", "hash").unwrap();
        (db, user)
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (db, _) = db_with_user();
        assert!(db.create_user("alice", "other@example.com", "hash").is_err());
        assert_eq!(
            db.get_user_by_username("alice").unwrap().unwrap().email,
            "alice@example.com"
        );
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn test_login_token_lifecycle() {
        let (db, user) = db_with_user();
        let token = db.create_login_token(&user.id).unwrap();
        assert_eq!(db.user_for_token(&token).unwrap().unwrap().id, user.id);

        db.delete_login_token(&token).unwrap();
        assert!(db.user_for_token(&token).unwrap().is_none());
    }

    #[test]
    fn test_new_session_leaves_one_active() {
        let (db, user) = db_with_user();
        let first = db.get_or_create_active_session(&user.id).unwrap();
        let again = db.get_or_create_active_session(&user.id).unwrap();
        assert_eq!(first.id, again.id);

        let second = db.start_new_session(&user.id).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(db.count_active_sessions(&user.id).unwrap(), 1);
        assert_eq!(db.active_session(&user.id).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_messages_replay_in_insertion_order() {
        let (db, user) = db_with_user();
        let session = db.get_or_create_active_session(&user.id).unwrap();
        db.add_message(&session.id, Role::User, "one").unwrap();
        db.add_message(&session.id, Role::Assistant, "two").unwrap();
        db.add_message(&session.id, Role::User, "three").unwrap();

        let messages = db.get_messages(&session.id).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(messages[1].role, Role::Assistant);

        let fresh = db.start_new_session(&user.id).unwrap();
        assert!(db.get_messages(&fresh.id).unwrap().is_empty());
    }

    #[test]
    fn test_documents_are_scoped_to_owner() {
        let (db, user) = db_with_user();
        let other = db.create_user("bob", "bob@example.com", "hash").unwrap();

        db.create_document("d1", &user.id, "a.pdf", "/tmp/d1.pdf", Some(10))
            .unwrap();
        db.create_document("d2", &user.id, "b.pdf", "/tmp/d2.pdf", None)
            .unwrap();

        assert_eq!(db.latest_document(&user.id).unwrap().unwrap().id, "d2");
        assert!(db.latest_document(&other.id).unwrap().is_none());
        assert!(db.get_document(&other.id, "d1").unwrap().is_none());
        assert!(!db.delete_document(&other.id, "d1").unwrap());

        assert!(db.delete_document(&user.id, "d2").unwrap());
        let remaining: Vec<String> = db
            .list_documents(&user.id)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(remaining, vec!["d1"]);
    }
}
