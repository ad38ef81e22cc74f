use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use api::auth::{decode_token, SESSION_COOKIE};
use api::schema::{role_of, AppSchema};
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::{self, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use entity::app_user;
use policy::Subject;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub schema: AppSchema,
    pub config: Arc<AppConfig>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "board server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/graphiql", get(graphiql_handler))
        .route("/graphql", post(graphql_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_credentials(true)
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([Method::POST, Method::GET])
        .allow_origin(allow_origin)
}

type HttpResult<T> = Result<T, HttpError>;

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> HttpResult<GraphQLResponse> {
    let mut req = request.into_inner();
    if let Some(subject) = resolve_subject(&state, &headers).await? {
        req = req.data(subject);
    }
    Ok(GraphQLResponse::from(state.schema.0.execute(req).await))
}

/// Turn a request's credentials into a [`Subject`], if they check out.
///
/// The database row is authoritative for the role; the token only proves
/// identity. Deactivated accounts resolve to no subject, which the schema
/// treats the same as an anonymous request. A storage failure during the
/// lookup is surfaced as an internal error, never as anonymity.
async fn resolve_subject(state: &AppState, headers: &HeaderMap) -> HttpResult<Option<Subject>> {
    let Some(token) = bearer_token(headers).or_else(|| cookie_token(headers)) else {
        return Ok(None);
    };
    let claims = match decode_token(&token, &state.config.auth) {
        Ok(claims) => claims,
        Err(err) => {
            warn!(%err, "rejected session token");
            return Ok(None);
        }
    };
    let Some(user) = app_user::Entity::find_by_id(claims.sub)
        .one(state.db.as_ref())
        .await
        .map_err(|err| HttpError::internal(err.into()))?
    else {
        return Ok(None);
    };
    if !user.is_active {
        warn!(user_id = %user.id, "deactivated account presented a valid token");
        return Ok(None);
    }
    Ok(Some(Subject::new(user.id, role_of(user.role))))
}

#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

async fn graphiql_handler() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.db.ping().await.is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use api::auth::{issue_token, AuthConfig};
    use api::schema::build_schema;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use policy::{PolicyMatrix, Role};
    use sea_orm::Database;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            session_ttl_minutes: 15,
        }
    }

    async fn test_state() -> AppState {
        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        let matrix = Arc::new(PolicyMatrix::new().unwrap());
        let schema = build_schema(db.clone(), matrix);
        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            auth: auth_config(),
            cors_allowed_origins: Vec::new(),
        });
        AppState { db, schema, config }
    }

    fn graphql_request(token: Option<&str>) -> http::Request<Body> {
        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/graphql")
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(r#"{"query":"{ me { id } }"}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn storage_failure_during_auth_is_an_internal_error() {
        // No tables exist, so the user lookup errors rather than misses.
        let state = test_state().await;
        let token =
            issue_token(&Subject::new(Uuid::new_v4(), Role::Student), &auth_config()).unwrap();
        let response = build_router(state)
            .oneshot(graphql_request(Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn anonymous_requests_reach_the_schema() {
        let state = test_state().await;
        let response = build_router(state)
            .oneshot(graphql_request(None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("UNAUTHENTICATED"), "{text}");
    }
}
