//! Todo routes over HTTP against an in-memory table.

mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use jaws::persistence::{Database, IsolationLevel, PersistenceError, Row};
use serde_json::{json, Value};

/// Answers exactly the statements the todo routes issue.
#[derive(Default)]
struct TodoTable {
    rows: Mutex<Vec<Row>>,
    last_id: AtomicI64,
    transactions: Mutex<Vec<&'static str>>,
}

fn owner(row: &Row) -> Option<&str> {
    row.get_str("user_id")
}

impl Database for TodoTable {
    fn execute_sql(&self, sql: &str, args: &[Value]) -> Result<u64, PersistenceError> {
        let mut rows = self.rows.lock().unwrap();
        if sql.starts_with("INSERT INTO TODO") {
            let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
            rows.push(
                Row::new()
                    .with("id", id)
                    .with("user_id", args[0].clone())
                    .with("content", args[1].clone())
                    .with("created_at", id),
            );
            return Ok(1);
        }
        if sql.starts_with("DELETE FROM TODO") {
            let before = rows.len();
            rows.retain(|row| !(row.get("id") == Some(&args[0]) && row.get("user_id") == Some(&args[1])));
            return Ok((before - rows.len()) as u64);
        }
        Err(PersistenceError::Query(format!("unexpected statement: {sql}")))
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, PersistenceError> {
        let rows = self.rows.lock().unwrap();
        if sql.contains("last_insert_rowid()") {
            let last = self.last_id.load(Ordering::SeqCst);
            return Ok(rows.iter().filter(|row| row.get_i64("id") == Some(last)).cloned().collect());
        }
        let user = args.first().and_then(Value::as_str);
        let mut mine: Vec<Row> = rows.iter().filter(|row| owner(row) == user).cloned().collect();
        if sql.starts_with("SELECT COUNT(*)") {
            return Ok(vec![Row::new().with("total", mine.len() as i64)]);
        }
        assert!(sql.ends_with("ORDER BY created_at DESC LIMIT ? OFFSET ?"), "{sql}");
        mine.sort_by_key(|row| std::cmp::Reverse(row.get_i64("created_at")));
        let limit = args[1].as_u64().unwrap() as usize;
        let offset = args[2].as_u64().unwrap() as usize;
        Ok(mine.into_iter().skip(offset).take(limit).collect())
    }

    fn begin(&self, _: IsolationLevel) -> Result<(), PersistenceError> {
        self.transactions.lock().unwrap().push("begin");
        Ok(())
    }

    fn commit(&self) -> Result<(), PersistenceError> {
        self.transactions.lock().unwrap().push("commit");
        Ok(())
    }

    fn rollback(&self) -> Result<(), PersistenceError> {
        self.transactions.lock().unwrap().push("rollback");
        Ok(())
    }
}

#[tokio::test]
async fn test_create_list_and_delete() {
    let app = common::spawn_app_with_database(TodoTable::default()).await;
    let client = common::client();
    let token = common::login(&app).await;

    for content in ["first", "second", "third"] {
        let created = client
            .post(app.url("/api/v1/todos"))
            .bearer_auth(&token)
            .json(&json!({ "content": content }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let body: Value = created.json().await.unwrap();
        assert_eq!(body["data"]["content"], content);
        assert_eq!(body["data"]["user_id"], "7");
    }

    let page: Value = client
        .get(app.url("/api/v1/todos?page=0&size=2"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["data"]["total_elements"], 3);
    assert_eq!(page["data"]["total_pages"], 2);
    assert_eq!(page["data"]["todos"][0]["content"], "third");
    assert_eq!(page["data"]["todos"].as_array().unwrap().len(), 2);

    let deleted = client.delete(app.url("/api/v1/todos/1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(deleted.status(), 204);
    let again = client.delete(app.url("/api/v1/todos/1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn test_todos_need_a_session() {
    let app = common::spawn_app_with_database(TodoTable::default()).await;
    let response = common::client().get(app.url("/api/v1/todos")).send().await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_no_database_is_503() {
    let app = common::spawn_app().await;
    let token = common::login(&app).await;
    let response = common::client()
        .get(app.url("/api/v1/todos"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}
