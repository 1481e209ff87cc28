use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;

use harvest_common::task::DeltaEntry;

#[derive(Clone)]
struct AppState {
    triggers: mpsc::Sender<Vec<DeltaEntry>>,
}

pub fn app(triggers: mpsc::Sender<Vec<DeltaEntry>>, metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/delta", post(delta))
        .with_state(AppState { triggers });

    match metrics {
        Some(handle) => router.route(
            "/_metrics",
            get(move || std::future::ready(handle.render())),
        ),
        None => router,
    }
}

async fn index() -> &'static str {
    "harvest-janitor"
}

/// Delta callback from the notifier: enqueue the payload for the cleanup
/// loop and acknowledge. The notifier is never kept waiting on a run.
async fn delta(State(state): State<AppState>, Json(delta): Json<Vec<DeltaEntry>>) -> StatusCode {
    match state.triggers.send(delta).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn index_answers_with_the_service_name() {
        let (triggers, _receiver) = mpsc::channel(1);
        let app = app(triggers, None);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"harvest-janitor");
    }

    #[tokio::test]
    async fn delta_payloads_are_enqueued() {
        let (triggers, mut receiver) = mpsc::channel(1);
        let app = app(triggers, None);

        let request = Request::builder()
            .method("POST")
            .uri("/delta")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"[{"inserts":[],"deletes":[]}]"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let delta = receiver.recv().await.unwrap();
        assert_eq!(delta.len(), 1);
    }

    #[tokio::test]
    async fn delta_without_a_consumer_is_unavailable() {
        let (triggers, receiver) = mpsc::channel(1);
        drop(receiver);
        let app = app(triggers, None);

        let request = Request::builder()
            .method("POST")
            .uri("/delta")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("[]"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
