use axum::{
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::handler::{
        admin_edit_user, close_contest, get_contest, get_profile, get_streaks, get_user_wagers,
        health_check, list_contests, list_users, place_slip, place_wager, record_result,
        register_user, run_settlement, AppState,
    },
    middleware::create_cors_layer,
};

pub fn create_app(state: AppState, cors_origins: &[String], request_timeout: Duration) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Accounts
                .route("/users", post(register_user).get(list_users))
                .route("/users/:user", get(get_profile))
                .route("/users/:user/wagers", get(get_user_wagers))
                .route("/admin/users/:user", put(admin_edit_user))
                // Wagers
                .route("/wagers", post(place_wager))
                .route("/slips", post(place_slip))
                // Contest results (operator)
                .route("/contests", get(list_contests))
                .route("/contests/:contest_id", get(get_contest))
                .route("/contests/:contest_id/results", post(record_result))
                .route("/contests/:contest_id/close", post(close_contest))
                // Settlement
                .route("/settlement/run", post(run_settlement))
                .route("/stats/streaks", get(get_streaks)),
        );

    let app = with_layers(app, cors_origins, request_timeout).with_state(state);

    info!("✓ HTTP routes configured");
    app
}

// Requests running past the timeout get 408
fn with_layers<S>(router: Router<S>, cors_origins: &[String], request_timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(create_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StoreBackend};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let config = Config {
            bind_address: "127.0.0.1:0".into(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            cas_max_attempts: 5,
            cas_base_delay_ms: 1,
            cas_max_delay_ms: 5,
            starting_points: 1000,
            notify_webhook_url: None,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
        };
        let state = crate::bootstrap::initialize_app_state(&config).await.unwrap();
        create_app(state, &config.cors_origins, config.request_timeout())
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_wager_lifecycle_over_http() {
        let app = app().await;

        let (status, _) = call(&app, "POST", "/api/v1/users", Some(json!({"user": "ana"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/wagers",
            Some(json!({
                "bettor": "ana",
                "sport": "ufc",
                "contest_id": "UFC 300",
                "match_id": "Pereira vs Hill",
                "selection": "Pereira",
                "stake": 100,
                "base_odds": 1.9,
                "round_claim": "R2"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["balance"], 900);

        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/contests/UFC%20300/results",
            Some(json!({
                "sport": "ufc",
                "match_id": "Pereira vs Hill",
                "winning_selection": "Pereira",
                "round": "R2",
                "method": "KO"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "POST", "/api/v1/contests/UFC%20300/close", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, report) = call(&app, "POST", "/api/v1/settlement/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["status"], "completed");
        assert_eq!(report["points_credited"], 228);

        let (_, profile) = call(&app, "GET", "/api/v1/users/ana", None).await;
        assert_eq!(profile["account"]["points"], 1128);
        assert_eq!(profile["history"][0]["net"], 228);

        let (_, streaks) = call(&app, "GET", "/api/v1/stats/streaks?sport=ufc", None).await;
        assert_eq!(streaks[0]["user"], "ana");
        assert_eq!(streaks[0]["longest_streak"], 1);
    }

    #[tokio::test]
    async fn test_error_codes() {
        let app = app().await;
        call(&app, "POST", "/api/v1/users", Some(json!({"user": "ana"}))).await;

        let pick = |stake: u64| {
            json!({
                "bettor": "ana",
                "sport": "ufc",
                "contest_id": "UFC 300",
                "match_id": "A vs B",
                "selection": "A",
                "stake": stake,
                "base_odds": 2.0
            })
        };

        let (status, body) = call(&app, "POST", "/api/v1/wagers", Some(pick(5000))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error_code"], "INSUFFICIENT_BALANCE");
        assert_eq!(body["details"]["available"], 1000);

        let (status, body) = call(&app, "POST", "/api/v1/wagers", Some(pick(0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");

        let (status, body) = call(&app, "GET", "/api/v1/users/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "NOT_FOUND");

        let (status, body) = call(&app, "POST", "/api/v1/users", Some(json!({"user": "ana"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let router: Router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }));
        let app = with_layers(router, &[], Duration::from_millis(20));

        let request = || Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let request = Request::builder().uri("/fast").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
    }
}
