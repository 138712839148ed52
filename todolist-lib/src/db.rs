use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;
use crate::message::{TodoItem, TodoList};

/// Errors returned by TodoStore operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

const CREATE_LIST: &str = "CREATE TABLE IF NOT EXISTS list (
    id    BLOB PRIMARY KEY NOT NULL,
    owner TEXT NOT NULL,
    name  TEXT NOT NULL
)";

const CREATE_LIST_ITEM: &str = "CREATE TABLE IF NOT EXISTS list_item (
    id      BLOB PRIMARY KEY NOT NULL,
    list_id BLOB NOT NULL,
    text    TEXT NOT NULL,
    marked  BOOLEAN NOT NULL,
    FOREIGN KEY (list_id) REFERENCES list(id)
)";

/// SQLite-backed storage for todo lists and their items.
#[derive(Clone)]
pub struct TodoStore {
    pool: SqlitePool,
}

impl TodoStore {
    /// Open the database at `path`, creating file and tables if missing.
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_tables().await?;
        info!("Opened todo store at {}", path.display());
        Ok(store)
    }

    /// A private in-memory database, gone when the store is dropped.
    pub async fn open_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // every connection would get its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(CREATE_LIST).execute(&mut *tx).await?;
        sqlx::query(CREATE_LIST_ITEM).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// All lists with their items, in insertion order.
    pub async fn todo_lists(&self) -> Result<Vec<TodoList>, DbError> {
        let rows = sqlx::query(
            "SELECT l.id, l.owner, l.name, i.id, i.text, i.marked
             FROM list AS l LEFT JOIN list_item AS i ON l.id = i.list_id
             ORDER BY l.rowid, i.rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut lists: Vec<TodoList> = Vec::new();
        for row in rows {
            let id: Uuid = row.try_get(0)?;
            if lists.last().map(|l| l.id) != Some(id) {
                lists.push(TodoList {
                    id,
                    owner: row.try_get(1)?,
                    name:  row.try_get(2)?,
                    items: Vec::new(),
                });
            }

            // lists without items come back with a NULL item half
            let item_id: Option<Uuid> = row.try_get(3)?;
            if let (Some(item_id), Some(list)) = (item_id, lists.last_mut()) {
                list.items.push(TodoItem {
                    id:     item_id,
                    list:   id,
                    text:   row.try_get(4)?,
                    marked: row.try_get(5)?,
                });
            }
        }
        Ok(lists)
    }

    /// Insert a list together with its items.
    pub async fn add_todo_list(&self, list: &TodoList) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO list (id, owner, name) VALUES (?, ?, ?)")
            .bind(list.id)
            .bind(&list.owner)
            .bind(&list.name)
            .execute(&mut *tx)
            .await?;
        for item in &list.items {
            sqlx::query("INSERT INTO list_item (id, list_id, text, marked) VALUES (?, ?, ?, ?)")
                .bind(item.id)
                .bind(list.id)
                .bind(&item.text)
                .bind(item.marked)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete a list and every item on it.
    pub async fn remove_todo_list(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM list_item WHERE list_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM list WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(DbError::NotFound(format!("list {id}")));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_todo_item(&self, list_id: Uuid, item: &TodoItem) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM list WHERE id = ?")
            .bind(list_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::NotFound(format!("list {list_id}")));
        }
        sqlx::query("INSERT INTO list_item (id, list_id, text, marked) VALUES (?, ?, ?, ?)")
            .bind(item.id)
            .bind(list_id)
            .bind(&item.text)
            .bind(item.marked)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Overwrite an item's text and mark. The item must be on `item.list`.
    pub async fn update_todo_item(&self, item: &TodoItem) -> Result<(), DbError> {
        let updated = sqlx::query(
            "UPDATE list_item SET text = ?, marked = ? WHERE id = ? AND list_id = ?",
        )
        .bind(&item.text)
        .bind(item.marked)
        .bind(item.id)
        .bind(item.list)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(DbError::NotFound(format!("item {} on list {}", item.id, item.list)));
        }
        Ok(())
    }

    pub async fn delete_todo_item(&self, list_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let deleted = sqlx::query("DELETE FROM list_item WHERE id = ? AND list_id = ?")
            .bind(id)
            .bind(list_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DbError::NotFound(format!("item {id} on list {list_id}")));
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
