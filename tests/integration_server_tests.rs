//! # Coordination Server Integration Tests / 协调服务器集成测试
//!
//! Exercises the `/getstep` and `/message` endpoints through the router and
//! over a real socket.
//!
//! 通过路由器和真实套接字测试 `/getstep` 与 `/message` 端点。

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use crosstest::PageSpec;
use crosstest::remote::StepCoordinator;
use crosstest::remote::protocol::StepResponse;
use crosstest::remote::server::SessionEvent;
use serde_json::{Value, json};
use tower::ServiceExt;

fn coordinator() -> StepCoordinator {
    StepCoordinator::new(vec![
        PageSpec::new("http://localhost:8000/first.html"),
        PageSpec {
            include: vec!["ui".into()],
            ..PageSpec::new("http://localhost:8000/second.html")
        },
    ])
}

fn request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn call(coordinator: &StepCoordinator, req: Request<Body>) -> (StatusCode, Value) {
    let response = coordinator.router().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[cfg(test)]
mod getstep_tests {
    use super::*;

    #[tokio::test]
    async fn test_step_returns_page_then_terminal() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");

        let (status, body) = call(
            &coordinator,
            request(Method::POST, "/getstep", r#"{"id":"abc","step":1}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "http://localhost:8000/second.html");
        assert_eq!(body["include"], json!(["ui"]));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Step(1));

        let (status, body) = call(
            &coordinator,
            request(Method::POST, "/getstep", r#"{"id":"abc","step":"2"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reply: StepResponse = serde_json::from_value(body).unwrap();
        assert_eq!(reply, StepResponse::default());
        assert!(coordinator.is_complete());
    }

    #[tokio::test]
    async fn test_wrong_id_is_rejected() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");

        let (status, body) = call(
            &coordinator,
            request(Method::POST, "/getstep", r#"{"id":"zzz","step":0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidTestId");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_step_is_rejected() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");

        for payload in [
            r#"{"id":"abc"}"#,
            r#"{"id":"abc","step":"next"}"#,
            r#"{"id":"abc","step":-1}"#,
            r#"{"id":"abc","step":1.5}"#,
        ] {
            let (status, body) =
                call(&coordinator, request(Method::POST, "/getstep", payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
            assert_eq!(body["error"], "InvalidRequestFormat", "{payload}");
        }
        assert!(events.try_recv().is_err());
        assert!(!coordinator.is_complete());
    }

    #[tokio::test]
    async fn test_non_json_body_is_an_invalid_id() {
        let coordinator = coordinator();
        let _events = coordinator.open_session("abc");
        let (status, body) =
            call(&coordinator, request(Method::POST, "/getstep", "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidTestId");
    }

    #[tokio::test]
    async fn test_no_session_rejects_requests() {
        let coordinator = coordinator();
        let (status, _) = call(
            &coordinator,
            request(Method::POST, "/getstep", r#"{"id":"abc","step":0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[tokio::test]
    async fn test_message_reaches_the_session() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");

        let payload = json!({
            "id": "abc",
            "command": "start_test",
            "part": "p",
            "group": "g",
            "test": "t",
            "level": "log",
            "source": "crosstest",
            "message": "Test [p][g][t] running ..."
        });
        let (status, _) = call(
            &coordinator,
            request(Method::PUT, "/message", &payload.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        match events.try_recv().unwrap() {
            SessionEvent::Message(message) => {
                assert!(message.is_start());
                assert_eq!(message.test.as_deref(), Some("t"));
                assert_eq!(message.message, "Test [p][g][t] running ...");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_loosely_shaped_end_test_is_delivered() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");

        for (level, error) in [("warn", json!("boom")), ("error", json!({"message": "a != b"}))] {
            let payload = json!({
                "id": "abc",
                "command": "end_test",
                "part": "p",
                "group": "g",
                "test": "t",
                "level": level,
                "message": "Test [p][g][t] is failed.",
                "error": error,
            });
            let (status, _) = call(
                &coordinator,
                request(Method::PUT, "/message", &payload.to_string()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let mut delivered = Vec::new();
        while let Ok(SessionEvent::Message(message)) = events.try_recv() {
            assert!(message.is_end());
            delivered.push(message.error.map(|e| e.message));
        }
        assert_eq!(
            delivered,
            vec![Some("boom".to_string()), Some("a != b".to_string())]
        );
    }

    #[tokio::test]
    async fn test_wrong_id_message_is_not_observed() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");
        let (status, body) = call(
            &coordinator,
            request(Method::PUT, "/message", r#"{"id":"old-run","message":"late"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidTestId");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_any_origin() {
        let coordinator = coordinator();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/message")
            .header(header::ORIGIN, "http://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = coordinator.router().oneshot(req).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        let methods = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(methods.contains("PUT"));
        assert!(methods.contains("POST"));
    }
}

#[cfg(test)]
mod socket_tests {
    use super::*;

    #[tokio::test]
    async fn test_port_zero_binds_an_ephemeral_port() {
        let coordinator = coordinator();
        let mut events = coordinator.open_session("abc");
        let server = coordinator.serve(0).await.unwrap();
        assert_ne!(server.port(), 0);

        let url = format!("http://127.0.0.1:{}/getstep", server.port());
        let reply: StepResponse = reqwest::Client::new()
            .post(&url)
            .json(&json!({"id": "abc", "step": 0}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply.url.as_deref(), Some("http://localhost:8000/first.html"));
        assert_eq!(events.recv().await, Some(SessionEvent::Step(0)));

        let port = server.port();
        server.shutdown().await;
        let after = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/getstep"))
            .json(&json!({"id": "abc", "step": 0}))
            .send()
            .await;
        assert!(after.is_err());
    }

    #[tokio::test]
    async fn test_busy_port_is_a_bind_error() {
        let listener = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let err = coordinator().serve(port).await.unwrap_err();
        assert!(matches!(err, crosstest::Error::ServerBind { .. }));
    }
}
