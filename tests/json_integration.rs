use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use axum::{
    response::IntoResponse,
    routing::{any, post},
    Router,
};
use http::{header, HeaderValue, Method, StatusCode};
use httpjson::{
    call_json, check_method, edit_request, handle_json, handle_json_with, status_error,
    CallContext, Error, HandlerOptions, JsonError, Reply, RequestContext, StatusError,
    WithStatus,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

struct TestServer {
    base_url: String,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

async fn spawn_server(app: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("test server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        task,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Params {
    id: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Counted {
    count: u32,
}

impl Reply for Counted {}

#[tokio::test]
async fn handler_result_reaches_caller_with_request_plumbing() {
    let seen_path = Arc::new(std::sync::Mutex::new(String::new()));
    let path_slot = Arc::clone(&seen_path);
    let app = Router::new().route(
        "/testpath",
        post(handle_json(move |ctx: RequestContext, params: Params| {
            let path_slot = Arc::clone(&path_slot);
            async move {
                assert_eq!(params.id, "test");
                *path_slot.lock().expect("path mutex must not be poisoned") =
                    ctx.plumbing().request().uri.path().to_owned();
                Ok::<_, Error>(Counted { count: 25 })
            }
        })),
    );
    let server = spawn_server(app).await;
    let http = reqwest::Client::new();

    let call = call_json::<Params, Counted>(Method::POST, server.url("/testpath"));
    let called = call
        .call(
            &CallContext::new(),
            Some(&http),
            &Params {
                id: "test".to_owned(),
            },
        )
        .await
        .expect("call must succeed");

    assert_eq!(called.value, Counted { count: 25 });
    assert_eq!(called.response.status, StatusCode::OK);
    assert_eq!(
        *seen_path.lock().expect("path mutex must not be poisoned"),
        "/testpath"
    );
}

async fn status_handler(_ctx: RequestContext, code: u16) -> Result<bool, Error> {
    match code {
        200 => Ok(true),
        418 => Err(JsonError::new(StatusCode::IM_A_TEAPOT, json!({"json": true})).into()),
        other => {
            let status = StatusCode::from_u16(other).map_err(Error::other)?;
            Err(status_error!(status, "error thing").into())
        }
    }
}

#[tokio::test]
async fn errors_become_call_errors_with_exact_bodies() {
    let server = spawn_server(Router::new().route("/", post(handle_json(status_handler)))).await;
    let http = reqwest::Client::new();
    let call = call_json::<u16, bool>(Method::POST, server.url("/"));
    let ctx = CallContext::new();

    let ok = call
        .call(&ctx, Some(&http), &200)
        .await
        .expect("200 must succeed");
    assert!(ok.value);

    let err = call
        .call(&ctx, Some(&http), &500)
        .await
        .expect_err("500 must fail");
    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(call_err.body_text(), "error thing\n");
    assert_eq!(
        call_err.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let response = err.response().expect("raw response must be attached");
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body_text(), "error thing\n");

    let err = call
        .call(&ctx, Some(&http), &418)
        .await
        .expect_err("418 must fail");
    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.code(), StatusCode::IM_A_TEAPOT);
    assert_eq!(call_err.body_text(), r#"{"json":true}"#);
    assert_eq!(call_err.headers()[header::CONTENT_TYPE], "application/json");
}

#[tokio::test]
async fn json_error_payload_is_sent_verbatim() {
    let app = Router::new().route(
        "/",
        post(handle_json(|_ctx: RequestContext, _: i32| async {
            Err::<bool, _>(JsonError::new(
                StatusCode::NOT_FOUND,
                json!({"error": "you dun fuggup"}),
            ))
        })),
    );
    let server = spawn_server(app).await;

    let err = call_json::<i32, bool>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, &0)
        .await
        .expect_err("must fail");

    match err {
        Error::Call(call_err) => {
            assert_eq!(call_err.code(), StatusCode::NOT_FOUND);
            assert_eq!(call_err.body_text(), r#"{"error":"you dun fuggup"}"#);
        }
        other => panic!("expected call error, got {other:?}"),
    }
}

#[tokio::test]
async fn json_error_inside_status_error_is_sent_as_json() {
    let app = Router::new().route(
        "/",
        post(handle_json(|_ctx: RequestContext, _: i32| async {
            let inner = JsonError::new(StatusCode::IM_A_TEAPOT, json!({"json": true}));
            Err::<bool, _>(StatusError::new(StatusCode::BAD_REQUEST, inner))
        })),
    );
    let server = spawn_server(app).await;

    let err = call_json::<i32, bool>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, &0)
        .await
        .expect_err("must fail");

    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.code(), StatusCode::IM_A_TEAPOT);
    assert_eq!(call_err.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(call_err.body_text(), r#"{"json":true}"#);
}

#[tokio::test]
async fn encoded_error_bodies_are_kept_as_received() {
    let app = Router::new().route(
        "/",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_ENCODING, "gzip")],
                "not really gzip",
            )
                .into_response()
        }),
    );
    let server = spawn_server(app).await;

    let err = call_json::<u8, bool>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, &0)
        .await
        .expect_err("must fail");

    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(call_err.body_text(), "not really gzip");
}

/// Answers one request with a 503 whose body stops short of its declared length.
async fn spawn_truncating_peer() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("must accept");
        let mut request = Vec::new();
        let mut buf = [0_u8; 1024];
        loop {
            let read = socket.read(&mut buf).await.expect("must read request");
            request.extend_from_slice(&buf[..read]);
            if read == 0 || request_complete(&request) {
                break;
            }
        }
        socket
            .write_all(
                b"HTTP/1.1 503 Service Unavailable\r\n\
                  content-type: text/plain\r\n\
                  content-length: 100\r\n\
                  \r\n\
                  partial",
            )
            .await
            .expect("must write response");
        socket.shutdown().await.expect("must close");
    });
    (format!("http://{address}/"), task)
}

fn request_complete(request: &[u8]) -> bool {
    let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= head_end + 4 + length
}

#[tokio::test]
async fn truncated_error_body_still_yields_call_error() {
    let (url, task) = spawn_truncating_peer().await;

    let err = call_json::<u8, bool>(Method::POST, url)
        .call(&CallContext::new(), Some(&reqwest::Client::new()), &0)
        .await
        .expect_err("must fail");

    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(call_err.body_text(), "partial");
    task.await.expect("peer task must finish");
}

#[tokio::test]
async fn plumbing_sets_status_and_headers() {
    let app = Router::new().route(
        "/",
        post(handle_json(|ctx: RequestContext, s: String| async move {
            let plumbing = ctx.plumbing();
            plumbing.insert_header(
                "x-magic-pixies".parse().expect("valid header name"),
                HeaderValue::from_static("YES"),
            );
            plumbing.set_response_status(StatusCode::from_u16(222).expect("valid status"));
            Ok::<_, Error>(format!("{s} go"))
        })),
    );
    let server = spawn_server(app).await;

    let called = call_json::<str, String>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, "ok")
        .await
        .expect("call must succeed");

    assert_eq!(called.value, "ok go");
    assert_eq!(called.response.status.as_u16(), 222);
    assert_eq!(called.response.headers["x-magic-pixies"], "YES");
}

#[tokio::test]
async fn result_status_overrides_plumbing_status() {
    let app = Router::new().route(
        "/",
        post(handle_json(|ctx: RequestContext, n: u32| async move {
            ctx.plumbing().set_response_status(StatusCode::ACCEPTED);
            Ok::<_, Error>(WithStatus::new(StatusCode::CREATED, n + 1))
        })),
    );
    let server = spawn_server(app).await;

    let called = call_json::<u32, u32>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, &41)
        .await
        .expect("call must succeed");

    assert_eq!(called.value, 42);
    assert_eq!(called.response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn plumbing_headers_are_kept_on_error_responses() {
    let app = Router::new().route(
        "/",
        post(handle_json(|ctx: RequestContext, _: JsonValue| async move {
            ctx.plumbing()
                .insert_header(header::RETRY_AFTER, HeaderValue::from_static("30"));
            Err::<bool, _>(status_error!(StatusCode::SERVICE_UNAVAILABLE, "busy"))
        })),
    );
    let server = spawn_server(app).await;

    let err = call_json::<JsonValue, bool>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, &json!({}))
        .await
        .expect_err("must fail");

    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(call_err.headers()[header::RETRY_AFTER], "30");
}

#[tokio::test]
async fn wrong_content_type_is_rejected_before_handler() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let app = Router::new().route(
        "/",
        post(handle_json(move |_ctx: RequestContext, _: JsonValue| {
            flag.store(true, Ordering::SeqCst);
            async { Ok::<_, Error>(true) }
        })),
    );
    let server = spawn_server(app).await;

    let response = reqwest::Client::new()
        .post(server.url("/"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body("{}")
        .send()
        .await
        .expect("request must complete");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.expect("body must be readable"),
        "invalid content type\n"
    );
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn malformed_json_is_internal_error_without_invoking_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/",
        post(handle_json(move |_ctx: RequestContext, _: Params| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(true) }
        })),
    );
    let server = spawn_server(app).await;

    let response = reqwest::Client::new()
        .post(server.url("/"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"{"id": 7}"#)
        .send()
        .await
        .expect("request must complete");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = Router::new().route(
        "/",
        post(handle_json_with(
            HandlerOptions { max_body_bytes: 8 },
            |_ctx: RequestContext, s: String| async move { Ok::<_, Error>(s) },
        )),
    );
    let server = spawn_server(app).await;

    let err = call_json::<str, String>(Method::POST, server.url("/"))
        .call(&CallContext::new(), None, "far too long for the limit")
        .await
        .expect_err("must fail");

    let call_err = err.as_call_error().expect("must be a call error");
    assert_eq!(call_err.code(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn check_method_rejects_other_methods() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let inner = move || {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, Ordering::SeqCst);
            StatusCode::OK
        }
    };
    let app = Router::new().route("/", any(check_method(Method::POST, inner)));
    let server = spawn_server(app).await;
    let http = reqwest::Client::new();

    let response = http
        .get(server.url("/"))
        .send()
        .await
        .expect("request must complete");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.text().await.expect("body must be readable"),
        "method GET not allowed\n"
    );
    assert!(!called.load(Ordering::SeqCst));

    let response = http
        .post(server.url("/"))
        .header(header::CONTENT_TYPE, "text/plain")
        .send()
        .await
        .expect("request must complete");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn edit_request_client_adds_credentials_or_vetoes() {
    let app = Router::new().route(
        "/",
        post(handle_json(|ctx: RequestContext, name: String| async move {
            let authorized = ctx
                .plumbing()
                .request()
                .headers
                .get(header::AUTHORIZATION)
                .is_some_and(|value| value == "open sesame");
            if !authorized {
                return Err(status_error!(StatusCode::UNAUTHORIZED, "that is not the secret"));
            }
            Ok(format!("welcome {name}"))
        })),
    );
    let server = spawn_server(app).await;
    let call = call_json::<str, String>(Method::POST, server.url("/"));
    let ctx = CallContext::new();

    let with_secret = edit_request(reqwest::Client::new(), |request| {
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("open sesame"));
        Ok(())
    });
    let called = call
        .call(&ctx, Some(&with_secret), "Ali Baba")
        .await
        .expect("call must succeed");
    assert_eq!(called.value, "welcome Ali Baba");

    let without_secret = reqwest::Client::new();
    let err = call
        .call(&ctx, Some(&without_secret), "Ali Baba")
        .await
        .expect_err("call must be unauthorized");
    assert_eq!(
        err.as_call_error().map(|err| err.code()),
        Some(StatusCode::UNAUTHORIZED)
    );

    let refusing = edit_request(reqwest::Client::new(), |_| {
        Err(Error::other("computer says no"))
    });
    let err = call
        .call(&ctx, Some(&refusing), "Keyser Soze")
        .await
        .expect_err("edit hook must fail the call");
    match err {
        Error::Other(inner) => assert_eq!(inner.to_string(), "computer says no"),
        other => panic!("expected the hook's error, got {other:?}"),
    }
}
