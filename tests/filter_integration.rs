mod common;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{
    body_string, demo_app, initialized_monitor, request, sample, ERROR_ATTRIBUTE, USER_BODY,
};
use monitor_metrics::filter::{FilterSettings, MetricsLayer};
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

const FAILED_SERIES: &str =
    r#"{addr="/x",errorMessage="",isError="true",method="GET",status="500",type="http"}"#;

const USERS_SERIES: &str = r#"{addr="/api/users",errorMessage="",isError="false",method="GET",status="200",type="http"}"#;

#[tokio::test]
async fn reports_truncated_path_and_exact_size() {
    let monitor = initialized_monitor();
    let app = demo_app(
        monitor.clone(),
        FilterSettings {
            path_depth: 2,
            ..FilterSettings::default()
        },
    );

    let response = app.oneshot(request(Method::GET, "/api/users/42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, USER_BODY);
    assert_eq!(USER_BODY.len(), 37);

    let rendered = monitor.render().unwrap();
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", USERS_SERIES)),
        Some(1.0)
    );
    assert_eq!(
        sample(&rendered, &format!("response_size_bytes{}", USERS_SERIES)),
        Some(37.0)
    );
}

#[tokio::test]
async fn sizes_accumulate_per_label_set() {
    let monitor = initialized_monitor();
    let settings = FilterSettings {
        path_depth: 2,
        ..FilterSettings::default()
    };

    for id in ["1", "2", "3"] {
        let app = demo_app(monitor.clone(), settings.clone());
        let response = app
            .oneshot(request(Method::GET, &format!("/api/users/{}", id)))
            .await
            .unwrap();
        body_string(response).await;
    }

    let rendered = monitor.render().unwrap();
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", USERS_SERIES)),
        Some(3.0)
    );
    assert_eq!(
        sample(&rendered, &format!("response_size_bytes{}", USERS_SERIES)),
        Some(111.0)
    );
}

#[tokio::test]
async fn excluded_paths_are_not_observed() {
    let monitor = initialized_monitor();
    let app = demo_app(
        monitor.clone(),
        FilterSettings {
            exclusions: vec!["/health".to_string()],
            ..FilterSettings::default()
        },
    );

    let response = app.oneshot(request(Method::GET, "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");

    let rendered = monitor.render().unwrap();
    assert!(!rendered.contains(r#"addr="/health""#));
}

#[tokio::test]
async fn exclusions_are_relative_to_the_context_path() {
    let monitor = initialized_monitor();
    let settings = FilterSettings {
        exclusions: vec!["/health".to_string()],
        context_path: "/app".to_string(),
        ..FilterSettings::default()
    };

    // Both unrouted, so answered with 404 by the router.
    let excluded = demo_app(monitor.clone(), settings.clone())
        .oneshot(request(Method::GET, "/app/health/live"))
        .await
        .unwrap();
    assert_eq!(excluded.status(), StatusCode::NOT_FOUND);
    body_string(excluded).await;
    let observed = demo_app(monitor.clone(), settings)
        .oneshot(request(Method::GET, "/app/status"))
        .await
        .unwrap();
    body_string(observed).await;

    let rendered = monitor.render().unwrap();
    assert!(!rendered.contains(r#"addr="/app/health"#));
    assert!(rendered.contains(r#"addr="/app/status",errorMessage="",isError="true""#));
}

#[tokio::test]
async fn error_message_attribute_is_sanitized_into_the_labels() {
    let monitor = initialized_monitor();
    let app = demo_app(
        monitor.clone(),
        FilterSettings {
            error_message_attribute: Some(ERROR_ATTRIBUTE.to_string()),
            ..FilterSettings::default()
        },
    );

    let response = app.oneshot(request(Method::GET, "/api/fail")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    body_string(response).await;

    let rendered = monitor.render().unwrap();
    let series = r#"{addr="/api/fail",errorMessage="Upstream timeout after 30s",isError="true",method="GET",status="502",type="http"}"#;
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", series)),
        Some(1.0)
    );
}

#[tokio::test]
async fn attribute_is_ignored_when_not_configured() {
    let monitor = initialized_monitor();
    let app = demo_app(monitor.clone(), FilterSettings::default());

    let response = app.oneshot(request(Method::GET, "/api/fail")).await.unwrap();
    body_string(response).await;

    let rendered = monitor.render().unwrap();
    assert!(rendered.contains(
        r#"{addr="/api/fail",errorMessage="",isError="true",method="GET",status="502",type="http"}"#
    ));
}

#[tokio::test]
async fn unmatched_routes_are_classified_as_errors() {
    let monitor = initialized_monitor();
    let app = demo_app(monitor.clone(), FilterSettings::default());

    let response = app
        .oneshot(request(Method::DELETE, "/nowhere/at/all"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    body_string(response).await;

    let rendered = monitor.render().unwrap();
    assert!(rendered.contains(
        r#"{addr="/nowhere/at/all",errorMessage="",isError="true",method="DELETE",status="404",type="http"}"#
    ));
}

#[tokio::test]
async fn dropped_body_is_still_reported() {
    let monitor = initialized_monitor();
    let app = demo_app(
        monitor.clone(),
        FilterSettings {
            path_depth: 2,
            ..FilterSettings::default()
        },
    );

    let response = app.oneshot(request(Method::POST, "/api/users/7")).await.unwrap();
    drop(response);

    let rendered = monitor.render().unwrap();
    let series = r#"{addr="/api/users",errorMessage="",isError="false",method="POST",status="200",type="http"}"#;
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", series)),
        Some(1.0)
    );
    assert_eq!(
        sample(&rendered, &format!("response_size_bytes{}", series)),
        Some(0.0)
    );
}

#[tokio::test]
async fn requests_before_init_pass_through_unobserved() {
    let monitor = common::monitor(Duration::from_secs(10));
    let app = demo_app(monitor.clone(), FilterSettings::default());

    let response = app.oneshot(request(Method::GET, "/api/users/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, USER_BODY);

    assert!(!monitor.is_initialized());
    assert!(!monitor.render().unwrap().contains("request_seconds"));
}

#[tokio::test]
async fn failing_inner_service_is_reported_as_500() {
    let monitor = initialized_monitor();
    let service = MetricsLayer::new(monitor.clone(), FilterSettings::default()).layer(
        service_fn(|_request: Request<Body>| async {
            Err::<Response<Body>, &'static str>("connection reset")
        }),
    );

    let result = service.oneshot(request(Method::GET, "/x")).await;
    assert_eq!(result.err(), Some("connection reset"));

    let rendered = monitor.render().unwrap();
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", FAILED_SERIES)),
        Some(1.0)
    );
    assert_eq!(
        sample(&rendered, &format!("response_size_bytes{}", FAILED_SERIES)),
        Some(0.0)
    );
}

#[tokio::test]
async fn abandoned_request_is_reported_as_500() {
    let monitor = initialized_monitor();
    let service = MetricsLayer::new(monitor.clone(), FilterSettings::default()).layer(
        service_fn(|_request: Request<Body>| async {
            std::future::pending::<Result<Response<Body>, std::convert::Infallible>>().await
        }),
    );

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        service.oneshot(request(Method::GET, "/x")),
    )
    .await;
    assert!(timed_out.is_err());

    let rendered = monitor.render().unwrap();
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", FAILED_SERIES)),
        Some(1.0)
    );
}

async fn panicking_handler() -> &'static str {
    panic!("handler bug")
}

#[tokio::test]
async fn panicking_handler_is_still_reported() {
    let monitor = initialized_monitor();
    let app = Router::new()
        .route("/x", get(panicking_handler))
        .layer(MetricsLayer::new(monitor.clone(), FilterSettings::default()));

    let joined = tokio::spawn(app.oneshot(request(Method::GET, "/x"))).await;
    assert!(joined.unwrap_err().is_panic());

    let rendered = monitor.render().unwrap();
    assert_eq!(
        sample(&rendered, &format!("request_seconds_count{}", FAILED_SERIES)),
        Some(1.0)
    );
}
