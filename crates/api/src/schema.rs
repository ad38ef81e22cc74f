use std::sync::Arc;

use async_graphql::{
    Context, EmptySubscription, Error, ErrorExtensions, InputObject, Object, Schema, SimpleObject,
    ID,
};
use chrono::{DateTime, Utc};
use entity::{app_user, comment, notification, post, report};
use policy::{Action, PermissionDenied, PolicyMatrix, ResourceInstance, ResourceKind, Subject};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppSchema(pub Schema<QueryRoot, MutationRoot, EmptySubscription>);

pub fn build_schema(db: Arc<DatabaseConnection>, matrix: Arc<PolicyMatrix>) -> AppSchema {
    let schema = Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(db)
        .data(matrix)
        .finish();
    AppSchema(schema)
}

/// The schema SDL, without any attached runtime state.
pub fn sdl() -> String {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .finish()
        .sdl()
}

pub struct QueryRoot;
pub struct MutationRoot;

const MAX_PAGE: i32 = 100;

#[Object]
impl QueryRoot {
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<UserNode> {
        let viewer = require_subject(ctx)?;
        let db = database(ctx)?;
        let model = app_user::Entity::find_by_id(viewer.id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("UNAUTHENTICATED", "User not found"))?;
        Ok(UserNode::from(model))
    }

    async fn posts(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<PostNode>> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        enforce(&matrix, &viewer, ResourceKind::Posts, Action::Read, None)?;
        let db = database(ctx)?;
        let limit = enforce_page_limit(first.unwrap_or(25))?;
        let skip = offset.unwrap_or(0).max(0) as u64;
        let rows = post::Entity::find()
            .order_by_desc(post::Column::CreatedAt)
            .limit(limit)
            .offset(skip)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|model| PostNode::from_model(model, &viewer, &matrix))
            .collect())
    }

    async fn post(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<PostNode>> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        enforce(&matrix, &viewer, ResourceKind::Posts, Action::Read, None)?;
        let db = database(ctx)?;
        let post_id = parse_uuid(&id)?;
        let record = post::Entity::find_by_id(post_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(record.map(|model| PostNode::from_model(model, &viewer, &matrix)))
    }

    async fn comments(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "postId")] post_id: ID,
        first: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<CommentNode>> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        enforce(&matrix, &viewer, ResourceKind::Comments, Action::Read, None)?;
        let db = database(ctx)?;
        let post_uuid = parse_uuid(&post_id)?;
        let limit = enforce_page_limit(first.unwrap_or(50))?;
        let skip = offset.unwrap_or(0).max(0) as u64;
        let rows = comment::Entity::find()
            .filter(comment::Column::PostId.eq(post_uuid))
            .order_by_asc(comment::Column::CreatedAt)
            .limit(limit)
            .offset(skip)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|model| CommentNode::from_model(model, &viewer, &matrix))
            .collect())
    }

    async fn notifications(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        offset: Option<i32>,
        #[graphql(name = "unreadOnly")] unread_only: Option<bool>,
    ) -> async_graphql::Result<Vec<NotificationNode>> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let limit = enforce_page_limit(first.unwrap_or(25))?;
        let skip = offset.unwrap_or(0).max(0) as u64;
        let mut query = notification::Entity::find()
            .filter(notification::Column::UserId.eq(viewer.id));
        if unread_only.unwrap_or(false) {
            query = query.filter(notification::Column::ReadAt.is_null());
        }
        let rows = query
            .order_by_desc(notification::Column::CreatedAt)
            .limit(limit)
            .offset(skip)
            .all(db.as_ref())
            .await
            .map_err(db_error)?;
        // The query is already scoped to the viewer; the matrix remains the
        // deciding authority for what is readable.
        Ok(rows
            .into_iter()
            .filter(|model| {
                matrix.can_perform(
                    &viewer,
                    ResourceKind::Notifications,
                    Action::Read,
                    Some(&notification_instance(model)),
                )
            })
            .map(NotificationNode::from)
            .collect())
    }
}

#[Object]
impl MutationRoot {
    #[graphql(name = "createPost")]
    async fn create_post(
        &self,
        ctx: &Context<'_>,
        input: NewPostInput,
    ) -> async_graphql::Result<PostNode> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        enforce(&matrix, &viewer, ResourceKind::Posts, Action::Create, None)?;
        let db = database(ctx)?;
        let span = info_span!("board.posts.create", subject = %viewer.id);
        async move {
            let title = validate_title(&input.title)?;
            let body_md = validate_body(&input.body_md)?;
            let now: DateTimeWithTimeZone = Utc::now().into();
            let model = post::ActiveModel {
                id: Set(Uuid::new_v4()),
                title: Set(title),
                body_md: Set(body_md),
                author_id: Set(viewer.id),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db.as_ref())
            .await
            .map_err(db_error)?;
            Ok(PostNode::from_model(model, &viewer, &matrix))
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "updatePost")]
    async fn update_post(
        &self,
        ctx: &Context<'_>,
        input: UpdatePostInput,
    ) -> async_graphql::Result<PostNode> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let post_id = parse_uuid(&input.id)?;
        let existing = post::Entity::find_by_id(post_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Post not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Posts,
            Action::Update,
            Some(&post_instance(&existing)),
        )?;
        let span = info_span!("board.posts.update", subject = %viewer.id, post = %post_id);
        async move {
            let mut active: post::ActiveModel = existing.into();
            if let Some(title) = &input.title {
                active.title = Set(validate_title(title)?);
            }
            if let Some(body_md) = &input.body_md {
                active.body_md = Set(validate_body(body_md)?);
            }
            active.updated_at = Set(Utc::now().into());
            let updated = active.update(db.as_ref()).await.map_err(db_error)?;
            Ok(PostNode::from_model(updated, &viewer, &matrix))
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "deletePost")]
    async fn delete_post(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let post_id = parse_uuid(&id)?;
        let existing = post::Entity::find_by_id(post_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Post not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Posts,
            Action::Delete,
            Some(&post_instance(&existing)),
        )?;
        let span = info_span!("board.posts.delete", subject = %viewer.id, post = %post_id);
        async move {
            let res = post::Entity::delete_by_id(post_id)
                .exec(db.as_ref())
                .await
                .map_err(db_error)?;
            Ok(res.rows_affected > 0)
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "reportPost")]
    async fn report_post(
        &self,
        ctx: &Context<'_>,
        id: ID,
        reason: Option<String>,
    ) -> async_graphql::Result<bool> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let post_id = parse_uuid(&id)?;
        let existing = post::Entity::find_by_id(post_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Post not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Posts,
            Action::Report,
            Some(&post_instance(&existing)),
        )?;
        let span = info_span!("board.posts.report", subject = %viewer.id, post = %post_id);
        async move {
            file_report(
                db.as_ref(),
                report::Target::Post,
                existing.id,
                existing.author_id,
                &viewer,
                reason,
            )
            .await?;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "createComment")]
    async fn create_comment(
        &self,
        ctx: &Context<'_>,
        input: NewCommentInput,
    ) -> async_graphql::Result<CommentNode> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        enforce(&matrix, &viewer, ResourceKind::Comments, Action::Create, None)?;
        let db = database(ctx)?;
        let post_id = parse_uuid(&input.post_id)?;
        let parent = post::Entity::find_by_id(post_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Post not found"))?;
        let span = info_span!("board.comments.create", subject = %viewer.id, post = %post_id);
        async move {
            let body_md = validate_body(&input.body_md)?;
            let now: DateTimeWithTimeZone = Utc::now().into();
            let model = comment::ActiveModel {
                id: Set(Uuid::new_v4()),
                post_id: Set(parent.id),
                author_id: Set(viewer.id),
                body_md: Set(body_md),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db.as_ref())
            .await
            .map_err(db_error)?;
            if parent.author_id != viewer.id {
                push_notification(
                    db.as_ref(),
                    parent.author_id,
                    notification::Kind::Reply,
                    format!("New comment on \"{}\"", parent.title),
                )
                .await?;
            }
            Ok(CommentNode::from_model(model, &viewer, &matrix))
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "updateComment")]
    async fn update_comment(
        &self,
        ctx: &Context<'_>,
        input: UpdateCommentInput,
    ) -> async_graphql::Result<CommentNode> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let comment_id = parse_uuid(&input.id)?;
        let existing = comment::Entity::find_by_id(comment_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Comment not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Comments,
            Action::Update,
            Some(&comment_instance(&existing)),
        )?;
        let span = info_span!("board.comments.update", subject = %viewer.id, comment = %comment_id);
        async move {
            let mut active: comment::ActiveModel = existing.into();
            active.body_md = Set(validate_body(&input.body_md)?);
            active.updated_at = Set(Utc::now().into());
            let updated = active.update(db.as_ref()).await.map_err(db_error)?;
            Ok(CommentNode::from_model(updated, &viewer, &matrix))
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "deleteComment")]
    async fn delete_comment(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let comment_id = parse_uuid(&id)?;
        let existing = comment::Entity::find_by_id(comment_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Comment not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Comments,
            Action::Delete,
            Some(&comment_instance(&existing)),
        )?;
        let span = info_span!("board.comments.delete", subject = %viewer.id, comment = %comment_id);
        async move {
            let res = comment::Entity::delete_by_id(comment_id)
                .exec(db.as_ref())
                .await
                .map_err(db_error)?;
            Ok(res.rows_affected > 0)
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "reportComment")]
    async fn report_comment(
        &self,
        ctx: &Context<'_>,
        id: ID,
        reason: Option<String>,
    ) -> async_graphql::Result<bool> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let comment_id = parse_uuid(&id)?;
        let existing = comment::Entity::find_by_id(comment_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Comment not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Comments,
            Action::Report,
            Some(&comment_instance(&existing)),
        )?;
        let span =
            info_span!("board.comments.report", subject = %viewer.id, comment = %comment_id);
        async move {
            file_report(
                db.as_ref(),
                report::Target::Comment,
                existing.id,
                existing.author_id,
                &viewer,
                reason,
            )
            .await?;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "markNotificationRead")]
    async fn mark_notification_read(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<NotificationNode> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let notification_id = parse_uuid(&id)?;
        let existing = notification::Entity::find_by_id(notification_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Notification not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Notifications,
            Action::Update,
            Some(&notification_instance(&existing)),
        )?;
        let span = info_span!(
            "board.notifications.markRead",
            subject = %viewer.id,
            notification = %notification_id
        );
        async move {
            let mut active: notification::ActiveModel = existing.into();
            active.read_at = Set(Some(Utc::now().into()));
            let updated = active.update(db.as_ref()).await.map_err(db_error)?;
            Ok(NotificationNode::from(updated))
        }
        .instrument(span)
        .await
    }

    #[graphql(name = "deleteNotification")]
    async fn delete_notification(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        let viewer = require_subject(ctx)?;
        let matrix = policy_matrix(ctx)?;
        let db = database(ctx)?;
        let notification_id = parse_uuid(&id)?;
        let existing = notification::Entity::find_by_id(notification_id)
            .one(db.as_ref())
            .await
            .map_err(db_error)?
            .ok_or_else(|| error_with_code("NOT_FOUND", "Notification not found"))?;
        enforce(
            &matrix,
            &viewer,
            ResourceKind::Notifications,
            Action::Delete,
            Some(&notification_instance(&existing)),
        )?;
        let span = info_span!(
            "board.notifications.delete",
            subject = %viewer.id,
            notification = %notification_id
        );
        async move {
            let res = notification::Entity::delete_by_id(notification_id)
                .exec(db.as_ref())
                .await
                .map_err(db_error)?;
            Ok(res.rows_affected > 0)
        }
        .instrument(span)
        .await
    }
}

#[derive(InputObject, Clone)]
pub struct NewPostInput {
    pub title: String,
    #[graphql(name = "bodyMd")]
    pub body_md: String,
}

#[derive(InputObject, Clone)]
pub struct UpdatePostInput {
    pub id: ID,
    pub title: Option<String>,
    #[graphql(name = "bodyMd")]
    pub body_md: Option<String>,
}

#[derive(InputObject, Clone)]
pub struct NewCommentInput {
    #[graphql(name = "postId")]
    pub post_id: ID,
    #[graphql(name = "bodyMd")]
    pub body_md: String,
}

#[derive(InputObject, Clone)]
pub struct UpdateCommentInput {
    pub id: ID,
    #[graphql(name = "bodyMd")]
    pub body_md: String,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Post")]
pub struct PostNode {
    pub id: ID,
    pub title: String,
    #[graphql(name = "bodyMd")]
    pub body_md: String,
    #[graphql(name = "authorId")]
    pub author_id: ID,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[graphql(name = "viewerCanUpdate")]
    pub viewer_can_update: bool,
    #[graphql(name = "viewerCanDelete")]
    pub viewer_can_delete: bool,
    #[graphql(name = "viewerCanReport")]
    pub viewer_can_report: bool,
}

impl PostNode {
    fn from_model(model: post::Model, viewer: &Subject, matrix: &PolicyMatrix) -> Self {
        let instance = post_instance(&model);
        Self {
            id: ID::from(model.id.to_string()),
            title: model.title,
            body_md: model.body_md,
            author_id: ID::from(model.author_id.to_string()),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
            viewer_can_update: matrix.can_perform(
                viewer,
                ResourceKind::Posts,
                Action::Update,
                Some(&instance),
            ),
            viewer_can_delete: matrix.can_perform(
                viewer,
                ResourceKind::Posts,
                Action::Delete,
                Some(&instance),
            ),
            viewer_can_report: matrix.can_perform(
                viewer,
                ResourceKind::Posts,
                Action::Report,
                Some(&instance),
            ),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Comment")]
pub struct CommentNode {
    pub id: ID,
    #[graphql(name = "postId")]
    pub post_id: ID,
    #[graphql(name = "authorId")]
    pub author_id: ID,
    #[graphql(name = "bodyMd")]
    pub body_md: String,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[graphql(name = "viewerCanUpdate")]
    pub viewer_can_update: bool,
    #[graphql(name = "viewerCanDelete")]
    pub viewer_can_delete: bool,
    #[graphql(name = "viewerCanReport")]
    pub viewer_can_report: bool,
}

impl CommentNode {
    fn from_model(model: comment::Model, viewer: &Subject, matrix: &PolicyMatrix) -> Self {
        let instance = comment_instance(&model);
        Self {
            id: ID::from(model.id.to_string()),
            post_id: ID::from(model.post_id.to_string()),
            author_id: ID::from(model.author_id.to_string()),
            body_md: model.body_md,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
            viewer_can_update: matrix.can_perform(
                viewer,
                ResourceKind::Comments,
                Action::Update,
                Some(&instance),
            ),
            viewer_can_delete: matrix.can_perform(
                viewer,
                ResourceKind::Comments,
                Action::Delete,
                Some(&instance),
            ),
            viewer_can_report: matrix.can_perform(
                viewer,
                ResourceKind::Comments,
                Action::Report,
                Some(&instance),
            ),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Notification")]
pub struct NotificationNode {
    pub id: ID,
    pub kind: String,
    pub body: String,
    #[graphql(name = "readAt")]
    pub read_at: Option<DateTime<Utc>>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<notification::Model> for NotificationNode {
    fn from(model: notification::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            kind: match model.kind {
                notification::Kind::Reply => "REPLY".to_string(),
                notification::Kind::Report => "REPORT".to_string(),
                notification::Kind::System => "SYSTEM".to_string(),
            },
            body: model.body,
            read_at: model.read_at.map(|d| d.into()),
            created_at: model.created_at.into(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "User")]
pub struct UserNode {
    pub id: ID,
    pub email: String,
    #[graphql(name = "displayName")]
    pub display_name: String,
    pub role: String,
    #[graphql(name = "isActive")]
    pub is_active: bool,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<app_user::Model> for UserNode {
    fn from(model: app_user::Model) -> Self {
        Self {
            id: ID::from(model.id.to_string()),
            email: model.email,
            display_name: model.display_name,
            role: role_of(model.role).as_str().to_string(),
            is_active: model.is_active,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

/// Map the stored role onto the policy role set.
pub fn role_of(value: app_user::Role) -> policy::Role {
    match value {
        app_user::Role::Admin => policy::Role::Admin,
        app_user::Role::Moderator => policy::Role::Moderator,
        app_user::Role::Student => policy::Role::Student,
        app_user::Role::Guest => policy::Role::Guest,
    }
}

fn post_instance(model: &post::Model) -> ResourceInstance {
    ResourceInstance::authored_by(model.author_id)
}

fn comment_instance(model: &comment::Model) -> ResourceInstance {
    ResourceInstance::authored_by(model.author_id)
}

fn notification_instance(model: &notification::Model) -> ResourceInstance {
    ResourceInstance::addressed_to(model.user_id)
}

async fn file_report(
    db: &DatabaseConnection,
    target: report::Target,
    target_id: Uuid,
    author_id: Uuid,
    reporter: &Subject,
    reason: Option<String>,
) -> async_graphql::Result<()> {
    let reason = validate_reason(reason)?;
    let now: DateTimeWithTimeZone = Utc::now().into();
    report::ActiveModel {
        id: Set(Uuid::new_v4()),
        target: Set(target),
        target_id: Set(target_id),
        reporter_id: Set(reporter.id),
        reason: Set(reason),
        created_at: Set(now),
    }
    .insert(db)
    .await
    .map_err(db_error)?;
    push_notification(
        db,
        author_id,
        notification::Kind::Report,
        "Your content was reported and is pending review".to_string(),
    )
    .await
}

async fn push_notification(
    db: &DatabaseConnection,
    user_id: Uuid,
    kind: notification::Kind,
    body: String,
) -> async_graphql::Result<()> {
    notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        kind: Set(kind),
        body: Set(body),
        read_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .map_err(db_error)?;
    Ok(())
}

fn database(ctx: &Context<'_>) -> async_graphql::Result<Arc<DatabaseConnection>> {
    ctx.data::<Arc<DatabaseConnection>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing database connection"))
}

fn policy_matrix(ctx: &Context<'_>) -> async_graphql::Result<Arc<PolicyMatrix>> {
    ctx.data::<Arc<PolicyMatrix>>()
        .cloned()
        .map_err(|_| error_with_code("INTERNAL", "Missing policy matrix"))
}

fn require_subject(ctx: &Context<'_>) -> async_graphql::Result<Subject> {
    ctx.data::<Subject>()
        .copied()
        .map_err(|_| error_with_code("UNAUTHENTICATED", "Login required"))
}

/// Translate a policy denial into the forbidden error surfaced to clients.
fn enforce(
    matrix: &PolicyMatrix,
    subject: &Subject,
    kind: ResourceKind,
    action: Action,
    instance: Option<&ResourceInstance>,
) -> async_graphql::Result<()> {
    matrix
        .assert_permission(subject, kind, action, instance)
        .map_err(forbidden)
}

fn forbidden(err: PermissionDenied) -> Error {
    Error::new(err.to_string()).extend_with(|_, e| {
        e.set("code", "FORBIDDEN");
        e.set("subjectId", err.subject_id.to_string());
        e.set("resource", err.kind.as_str());
        e.set("action", err.action.as_str());
    })
}

fn parse_uuid(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| error_with_code("BAD_REQUEST", "Invalid ID"))
}

fn db_error(err: DbErr) -> Error {
    error_with_code("INTERNAL", format!("Database error: {}", err))
}

fn error_with_code(code: &'static str, message: impl Into<String>) -> Error {
    Error::new(message).extend_with(|_, e| e.set("code", code))
}

fn validation_error(message: impl Into<String>) -> Error {
    error_with_code("VALIDATION", message)
}

fn validate_title(value: &str) -> async_graphql::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_error("Title is required"));
    }
    validate_length("title", trimmed, 256)?;
    Ok(trimmed.to_string())
}

fn validate_body(value: &str) -> async_graphql::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_error("Body is required"));
    }
    validate_length("bodyMd", trimmed, 65_535)?;
    Ok(trimmed.to_string())
}

fn validate_reason(value: Option<String>) -> async_graphql::Result<Option<String>> {
    if let Some(ref reason) = value {
        validate_length("reason", reason, 1024)?;
    }
    Ok(value)
}

fn validate_length(field: &str, value: &str, max: usize) -> async_graphql::Result<()> {
    if value.chars().count() > max {
        return Err(validation_error(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn enforce_page_limit(limit: i32) -> async_graphql::Result<u64> {
    if limit <= 0 {
        return Err(validation_error("first must be positive"));
    }
    if limit > MAX_PAGE {
        return Err(error_with_code(
            "LIMIT_EXCEEDED",
            format!("Cannot request more than {} records at once", MAX_PAGE),
        ));
    }
    Ok(limit as u64)
}

#[derive(Debug, Clone)]
pub struct SeededBoardRecords {
    pub users: Vec<app_user::Model>,
    pub posts: Vec<post::Model>,
    pub comments: Vec<comment::Model>,
    pub notifications: Vec<notification::Model>,
}

impl SeededBoardRecords {
    pub fn user_email(&self, email: &str) -> Option<&app_user::Model> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn post_titled(&self, title: &str) -> Option<&post::Model> {
        self.posts.iter().find(|p| p.title == title)
    }
}

/// Insert demo users (one per role), posts, comments, and notifications.
pub async fn seed_board_demo(db: &DatabaseConnection) -> Result<SeededBoardRecords, DbErr> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let mut users = Vec::new();
    for (email, display_name, role) in [
        ("admin@campus.test", "Alice Admin", app_user::Role::Admin),
        ("moderator@campus.test", "Max Moderator", app_user::Role::Moderator),
        ("student@campus.test", "Sam Student", app_user::Role::Student),
        ("guest@campus.test", "Gwen Guest", app_user::Role::Guest),
    ] {
        let model = app_user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.into()),
            display_name: Set(display_name.into()),
            role: Set(role),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        users.push(model);
    }
    let student = users[2].clone();
    let moderator = users[1].clone();

    let mut posts = Vec::new();
    for (title, body, author) in [
        (
            "Welcome week schedule",
            "Orientation starts Monday at 9am in the main hall.",
            &moderator,
        ),
        (
            "Looking for a study group",
            "Anyone up for algorithms practice on Thursdays?",
            &student,
        ),
    ] {
        let model = post::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.into()),
            body_md: Set(body.into()),
            author_id: Set(author.id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        posts.push(model);
    }

    let comment_model = comment::ActiveModel {
        id: Set(Uuid::new_v4()),
        post_id: Set(posts[1].id),
        author_id: Set(moderator.id),
        body_md: Set("The library annex has bookable rooms.".into()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    let notification_model = notification::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(student.id),
        kind: Set(notification::Kind::Reply),
        body: Set(format!("New comment on \"{}\"", posts[1].title)),
        read_at: Set(None),
        created_at: Set(now),
    }
    .insert(db)
    .await?;

    Ok(SeededBoardRecords {
        users,
        posts,
        comments: vec![comment_model],
        notifications: vec![notification_model],
    })
}
