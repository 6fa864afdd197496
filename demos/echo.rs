use axum::{routing::post, Router};
use http::{Method, StatusCode};
use httpjson::{
    call_json, check_method, edit_request, handle_json, status_error, CallContext, Error, Reply,
    RequestContext,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Welcome {
    message: String,
}

impl Reply for Welcome {}

async fn greet(ctx: RequestContext, greeting: Greeting) -> Result<Welcome, Error> {
    if greeting.name.trim().is_empty() {
        return Err(status_error!(StatusCode::UNPROCESSABLE_ENTITY, "name must not be empty").into());
    }
    ctx.plumbing()
        .insert_header(http::header::CACHE_CONTROL, http::HeaderValue::from_static("no-store"));
    Ok(Welcome {
        message: format!("welcome {}", greeting.name),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = Router::new().route("/greet", post(check_method(Method::POST, handle_json(greet))));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/greet", listener.local_addr()?);
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = edit_request(reqwest::Client::new(), |request| {
        request.headers_mut().insert(
            http::header::USER_AGENT,
            http::HeaderValue::from_static("httpjson-demo"),
        );
        Ok(())
    });
    let call = call_json::<Greeting, Welcome>(Method::POST, url);

    let called = call
        .call(
            &CallContext::new(),
            Some(&client),
            &Greeting {
                name: "Kit".to_owned(),
            },
        )
        .await?;
    println!("{} ({})", called.value.message, called.response.status);

    let empty = Greeting {
        name: String::new(),
    };
    match call.call(&CallContext::new(), Some(&client), &empty).await {
        Err(Error::Call(err)) => println!("rejected: {err}: {}", err.body_text().trim_end()),
        other => println!("unexpected: {other:?}"),
    }

    Ok(())
}
