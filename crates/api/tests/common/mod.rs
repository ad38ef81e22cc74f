use std::sync::Arc;

use api::schema::{build_schema, AppSchema};
use async_graphql::{Request, Response, Variables};
use policy::{PolicyMatrix, Role, Subject};
use sea_orm::{
    ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement, Value as DbValue,
};
use serde_json::Value;
use uuid::Uuid;

pub struct BoardTestEnv {
    pub schema: async_graphql::Schema<
        api::schema::QueryRoot,
        api::schema::MutationRoot,
        async_graphql::EmptySubscription,
    >,
    pub db: Arc<DatabaseConnection>,
    pub admin: Subject,
    pub moderator: Subject,
    pub student: Subject,
    pub guest: Subject,
}

impl BoardTestEnv {
    pub async fn execute(&self, subject: Option<Subject>, query: &str, vars: Value) -> Response {
        let mut request = Request::new(query).variables(Variables::from_json(vars));
        if let Some(subject) = subject {
            request = request.data(subject);
        }
        self.schema.execute(request).await
    }
}

pub async fn setup() -> BoardTestEnv {
    let conn = Database::connect("sqlite::memory:").await.unwrap();
    let db = Arc::new(conn);
    bootstrap_sqlite(db.as_ref()).await;

    let admin = insert_user(db.as_ref(), "admin@campus.test", Role::Admin).await;
    let moderator = insert_user(db.as_ref(), "moderator@campus.test", Role::Moderator).await;
    let student = insert_user(db.as_ref(), "student@campus.test", Role::Student).await;
    let guest = insert_user(db.as_ref(), "guest@campus.test", Role::Guest).await;

    let matrix = Arc::new(PolicyMatrix::new().expect("policy matrix"));
    let AppSchema(schema) = build_schema(db.clone(), matrix);

    BoardTestEnv {
        schema,
        db,
        admin,
        moderator,
        student,
        guest,
    }
}

pub async fn insert_user(db: &DatabaseConnection, email: &str, role: Role) -> Subject {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO app_user (id, email, display_name, role, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            email.into(),
            email.into(),
            role.as_str().into(),
            true.into(),
            now.clone().into(),
            now.into(),
        ],
    ))
    .await
    .unwrap();
    Subject::new(id, role)
}

pub async fn insert_post(db: &DatabaseConnection, author: Uuid, title: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO post (id, title, body_md, author_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            title.into(),
            "body".into(),
            author.into(),
            now.clone().into(),
            now.into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub async fn insert_comment(db: &DatabaseConnection, post_id: Uuid, author: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO comment (id, post_id, author_id, body_md, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            post_id.into(),
            author.into(),
            "a comment".into(),
            now.clone().into(),
            now.into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub async fn insert_notification(db: &DatabaseConnection, user: Uuid, body: &str) -> Uuid {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    db.execute(Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO notification (id, user_id, kind, body, read_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            user.into(),
            "SYSTEM".into(),
            body.into(),
            DbValue::from(None::<String>),
            now.into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub fn error_code(response: &Response) -> Option<String> {
    let error = response.errors.first()?;
    let extensions = error.extensions.as_ref()?;
    extensions
        .get("code")
        .map(|value| value.to_string().trim_matches('"').to_string())
}

async fn bootstrap_sqlite(db: &DatabaseConnection) {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE app_user (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE post (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body_md TEXT NOT NULL,
            author_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(author_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE comment (
            id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            body_md TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(post_id) REFERENCES post(id) ON DELETE CASCADE,
            FOREIGN KEY(author_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE notification (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            read_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        r#"
        CREATE TABLE report (
            id TEXT PRIMARY KEY,
            target TEXT NOT NULL,
            target_id TEXT NOT NULL,
            reporter_id TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(reporter_id) REFERENCES app_user(id) ON DELETE CASCADE
        );
        "#,
    ))
    .await
    .unwrap();
}
