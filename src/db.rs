use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{Registration, Subtask, Task, TaskFields, TaskUpdate};

const TASK_COLUMNS: &str = "id, created_date, title, description, category, priority, completed, archived, \
     start_date, due_date, start_time, end_time";

const SUBTASK_COLUMNS: &str = "id, created_date, title, description, category, priority, completed, archived, \
     start_date, due_date, start_time, end_time, parent_task_id";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        // one connection per request, so writers can briefly overlap
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_date TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                category TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                start_date TEXT,
                due_date TEXT,
                start_time TEXT,
                end_time TEXT
            );

            CREATE TABLE IF NOT EXISTS subtasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                parent_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                created_date TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                category TEXT,
                priority INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                start_date TEXT,
                due_date TEXT,
                start_time TEXT,
                end_time TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
            CREATE INDEX IF NOT EXISTS idx_subtasks_parent ON subtasks(parent_task_id);
            "#,
        )?;
        Ok(())
    }

    /// Stores a new user with a bcrypt hash of the password; returns the user id.
    pub fn register_user(&self, registration: &Registration, bcrypt_cost: u32) -> Result<i64> {
        registration.validate()?;
        let hash = bcrypt::hash(&registration.password, bcrypt_cost)?;
        let inserted = self.conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![registration.username, hash],
        );
        match inserted {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::UsernameTaken(registration.username.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks a username/password pair; returns the user id.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<i64> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((id, hash)) = row else {
            return Err(Error::Unauthorized);
        };
        if bcrypt::verify(password, &hash)? {
            Ok(id)
        } else {
            Err(Error::Unauthorized)
        }
    }

    pub fn add_task(&self, user_id: i64, fields: &TaskFields) -> Result<Task> {
        fields.validate()?;
        let created_date = today();
        self.conn.execute(
            "INSERT INTO tasks (user_id, created_date, title, description, category, priority, completed, \
             archived, start_date, due_date, start_time, end_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user_id,
                created_date,
                fields.title,
                fields.description,
                fields.category,
                fields.priority,
                fields.completed,
                fields.archived,
                fields.start_date,
                fields.due_date,
                fields.start_time,
                fields.end_time,
            ],
        )?;
        Ok(Task {
            id: self.conn.last_insert_rowid(),
            created_date,
            fields: fields.clone(),
        })
    }

    pub fn list_tasks(&self, user_id: i64) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user_id], task_from_row)?;

        let mut tasks = Vec::new();
        for task in rows {
            tasks.push(task?);
        }
        Ok(tasks)
    }

    pub fn get_task(&self, user_id: i64, id: i64) -> Result<Task> {
        self.conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND id = ?2"),
                params![user_id, id],
                task_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::task_not_found(id))
    }

    pub fn update_task(&self, user_id: i64, update: &TaskUpdate) -> Result<Task> {
        update.fields.validate()?;
        let fields = &update.fields;
        let updated = self.conn.execute(
            "UPDATE tasks SET title = ?3, description = ?4, category = ?5, priority = ?6, completed = ?7, \
             archived = ?8, start_date = ?9, due_date = ?10, start_time = ?11, end_time = ?12 \
             WHERE user_id = ?1 AND id = ?2",
            params![
                user_id,
                update.id,
                fields.title,
                fields.description,
                fields.category,
                fields.priority,
                fields.completed,
                fields.archived,
                fields.start_date,
                fields.due_date,
                fields.start_time,
                fields.end_time,
            ],
        )?;
        if updated == 0 {
            return Err(Error::task_not_found(update.id));
        }
        self.get_task(user_id, update.id)
    }

    /// Deletes a task; its subtasks go with it.
    pub fn delete_task(&self, user_id: i64, id: i64) -> Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM tasks WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        if deleted == 0 {
            return Err(Error::task_not_found(id));
        }
        Ok(())
    }

    pub fn add_subtask(&self, user_id: i64, parent_task_id: i64, fields: &TaskFields) -> Result<Subtask> {
        fields.validate()?;
        // parent must belong to the same user
        self.get_task(user_id, parent_task_id)?;
        let created_date = today();
        self.conn.execute(
            "INSERT INTO subtasks (user_id, parent_task_id, created_date, title, description, category, \
             priority, completed, archived, start_date, due_date, start_time, end_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                user_id,
                parent_task_id,
                created_date,
                fields.title,
                fields.description,
                fields.category,
                fields.priority,
                fields.completed,
                fields.archived,
                fields.start_date,
                fields.due_date,
                fields.start_time,
                fields.end_time,
            ],
        )?;
        Ok(Subtask {
            id: self.conn.last_insert_rowid(),
            parent_task_id,
            created_date,
            fields: fields.clone(),
        })
    }

    pub fn list_subtasks(&self, user_id: i64) -> Result<Vec<Subtask>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE user_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user_id], subtask_from_row)?;

        let mut subtasks = Vec::new();
        for subtask in rows {
            subtasks.push(subtask?);
        }
        Ok(subtasks)
    }

    pub fn subtasks_for_task(&self, user_id: i64, parent_task_id: i64) -> Result<Vec<Subtask>> {
        self.get_task(user_id, parent_task_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE user_id = ?1 AND parent_task_id = ?2 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user_id, parent_task_id], subtask_from_row)?;

        let mut subtasks = Vec::new();
        for subtask in rows {
            subtasks.push(subtask?);
        }
        Ok(subtasks)
    }

    pub fn get_subtask(&self, user_id: i64, id: i64) -> Result<Subtask> {
        self.conn
            .query_row(
                &format!("SELECT {SUBTASK_COLUMNS} FROM subtasks WHERE user_id = ?1 AND id = ?2"),
                params![user_id, id],
                subtask_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::subtask_not_found(id))
    }

    pub fn update_subtask(&self, user_id: i64, update: &TaskUpdate) -> Result<Subtask> {
        update.fields.validate()?;
        let fields = &update.fields;
        let updated = self.conn.execute(
            "UPDATE subtasks SET title = ?3, description = ?4, category = ?5, priority = ?6, completed = ?7, \
             archived = ?8, start_date = ?9, due_date = ?10, start_time = ?11, end_time = ?12 \
             WHERE user_id = ?1 AND id = ?2",
            params![
                user_id,
                update.id,
                fields.title,
                fields.description,
                fields.category,
                fields.priority,
                fields.completed,
                fields.archived,
                fields.start_date,
                fields.due_date,
                fields.start_time,
                fields.end_time,
            ],
        )?;
        if updated == 0 {
            return Err(Error::subtask_not_found(update.id));
        }
        self.get_subtask(user_id, update.id)
    }

    pub fn delete_subtask(&self, user_id: i64, id: i64) -> Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM subtasks WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        if deleted == 0 {
            return Err(Error::subtask_not_found(id));
        }
        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn fields_from_row(row: &Row<'_>) -> rusqlite::Result<TaskFields> {
    Ok(TaskFields {
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        completed: row.get(6)?,
        archived: row.get(7)?,
        start_date: row.get(8)?,
        due_date: row.get(9)?,
        start_time: row.get(10)?,
        end_time: row.get(11)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        created_date: row.get(1)?,
        fields: fields_from_row(row)?,
    })
}

fn subtask_from_row(row: &Row<'_>) -> rusqlite::Result<Subtask> {
    Ok(Subtask {
        id: row.get(0)?,
        created_date: row.get(1)?,
        fields: fields_from_row(row)?,
        parent_task_id: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::connect(dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    // cheapest cost bcrypt accepts
    const TEST_COST: u32 = 4;

    fn user(db: &Database, name: &str) -> i64 {
        db.register_user(&Registration::new(name, "secret1"), TEST_COST)
            .unwrap()
    }

    #[test]
    fn test_register_and_authenticate() {
        let (db, _dir) = setup_test_db();
        let id = user(&db, "alice");

        assert_eq!(db.authenticate("alice", "secret1").unwrap(), id);
        assert!(matches!(db.authenticate("alice", "wrong!!"), Err(Error::Unauthorized)));
        assert!(matches!(db.authenticate("bob", "secret1"), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (db, _dir) = setup_test_db();
        user(&db, "alice");

        let result = db.register_user(&Registration::new("alice", "another1"), TEST_COST);
        assert!(matches!(result, Err(Error::UsernameTaken(name)) if name == "alice"));
    }

    #[test]
    fn test_task_crud_roundtrip() {
        let (db, _dir) = setup_test_db();
        let alice = user(&db, "alice");

        let fields = TaskFields {
            description: Some("quarterly numbers".into()),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
            ..TaskFields::titled("Write report")
        };
        let created = db.add_task(alice, &fields).unwrap();
        let fetched = db.get_task(alice, created.id).unwrap();
        assert_eq!(fetched, created);

        let mut update = TaskUpdate::from(fetched.clone());
        update.fields.completed = true;
        let updated = db.update_task(alice, &update).unwrap();
        assert!(updated.fields.completed);
        assert_eq!(updated.created_date, fetched.created_date);

        db.delete_task(alice, created.id).unwrap();
        assert!(matches!(db.get_task(alice, created.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_undated_task_stays_undated() {
        let (db, _dir) = setup_test_db();
        let alice = user(&db, "alice");

        let created = db.add_task(alice, &TaskFields::titled("Someday")).unwrap();
        let fetched = db.get_task(alice, created.id).unwrap();
        assert_eq!(fetched.fields.start_date, None);
        assert_eq!(fetched.fields.due_date, None);
        assert_eq!(fetched.fields.start_time, None);
    }

    #[test]
    fn test_tasks_scoped_to_owner() {
        let (db, _dir) = setup_test_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bobby");

        let task = db.add_task(alice, &TaskFields::titled("Private")).unwrap();
        assert!(db.list_tasks(bob).unwrap().is_empty());
        assert!(db.get_task(bob, task.id).is_err());
        assert!(db.delete_task(bob, task.id).is_err());
        assert!(db
            .add_subtask(bob, task.id, &TaskFields::titled("Sneaky"))
            .is_err());
        assert_eq!(db.list_tasks(alice).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_task_not_stored() {
        let (db, _dir) = setup_test_db();
        let alice = user(&db, "alice");

        let result = db.add_task(alice, &TaskFields::titled(""));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(db.list_tasks(alice).unwrap().is_empty());
    }

    #[test]
    fn test_subtasks_follow_parent() {
        let (db, _dir) = setup_test_db();
        let alice = user(&db, "alice");
        let parent = db.add_task(alice, &TaskFields::titled("Move house")).unwrap();
        let other = db.add_task(alice, &TaskFields::titled("Other")).unwrap();

        let sub = db
            .add_subtask(alice, parent.id, &TaskFields::titled("Pack books"))
            .unwrap();
        db.add_subtask(alice, other.id, &TaskFields::titled("Elsewhere"))
            .unwrap();

        let subs = db.subtasks_for_task(alice, parent.id).unwrap();
        assert_eq!(subs, vec![sub.clone()]);
        assert_eq!(db.list_subtasks(alice).unwrap().len(), 2);

        let mut update = TaskUpdate::from(sub.clone());
        update.fields.archived = true;
        assert!(db.update_subtask(alice, &update).unwrap().fields.archived);

        db.delete_task(alice, parent.id).unwrap();
        assert!(db.get_subtask(alice, sub.id).is_err());
        assert_eq!(db.list_subtasks(alice).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_subtask() {
        let (db, _dir) = setup_test_db();
        let alice = user(&db, "alice");

        let result = db.delete_subtask(alice, 42);
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
