mod common;

use common::{error_code, insert_comment, insert_post, setup};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::json;

const UPDATE_COMMENT: &str = r#"
    mutation UpdateComment($id: ID!, $body: String!) {
        updateComment(input: { id: $id, bodyMd: $body }) { id bodyMd }
    }
"#;

const DELETE_COMMENT: &str = r#"
    mutation DeleteComment($id: ID!) { deleteComment(id: $id) }
"#;

#[tokio::test]
async fn guest_touches_only_their_own_comments() {
    let env = setup().await;
    let post_id = insert_post(env.db.as_ref(), env.student.id, "Thread").await;
    let own = insert_comment(env.db.as_ref(), post_id, env.guest.id).await;
    let foreign = insert_comment(env.db.as_ref(), post_id, env.student.id).await;

    let response = env
        .execute(
            Some(env.guest),
            UPDATE_COMMENT,
            json!({ "id": own.to_string(), "body": "edited" }),
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    for query in [UPDATE_COMMENT, DELETE_COMMENT] {
        let response = env
            .execute(
                Some(env.guest),
                query,
                json!({ "id": foreign.to_string(), "body": "edited" }),
            )
            .await;
        assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));
    }
}

#[tokio::test]
async fn moderator_deletes_any_comment_but_edits_only_their_own() {
    let env = setup().await;
    let post_id = insert_post(env.db.as_ref(), env.student.id, "Thread").await;
    let foreign = insert_comment(env.db.as_ref(), post_id, env.student.id).await;

    let response = env
        .execute(
            Some(env.moderator),
            UPDATE_COMMENT,
            json!({ "id": foreign.to_string(), "body": "rewritten" }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    let response = env
        .execute(
            Some(env.moderator),
            DELETE_COMMENT,
            json!({ "id": foreign.to_string() }),
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let data = response.data.into_json().unwrap();
    assert_eq!(data["deleteComment"], json!(true));
}

#[tokio::test]
async fn commenting_notifies_the_post_author() {
    let env = setup().await;
    let post_id = insert_post(env.db.as_ref(), env.student.id, "Thread").await;
    let response = env
        .execute(
            Some(env.moderator),
            r#"
                mutation CreateComment($postId: ID!) {
                    createComment(input: { postId: $postId, bodyMd: "Good question" }) { id }
                }
            "#,
            json!({ "postId": post_id.to_string() }),
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let row = env
        .db
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM notification WHERE kind = 'REPLY'",
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<i64>("", "n").unwrap(), 1);
}

#[tokio::test]
async fn commenting_on_own_post_stays_quiet() {
    let env = setup().await;
    let post_id = insert_post(env.db.as_ref(), env.student.id, "Thread").await;
    let response = env
        .execute(
            Some(env.student),
            r#"
                mutation CreateComment($postId: ID!) {
                    createComment(input: { postId: $postId, bodyMd: "Answering myself" }) { id }
                }
            "#,
            json!({ "postId": post_id.to_string() }),
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let row = env
        .db
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM notification",
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<i64>("", "n").unwrap(), 0);
}
