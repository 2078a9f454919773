//! "Oneshot" version of the comparison report Lambda.
//!
//! This executable sends one report request through the live services, based
//! on arguments given on the command line, and prints the response.

use lambda_http::{http, Body};
use lambda_runtime::Error;
use std::env;

use comparativa_report_lambda::Services;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let token = args
        .next()
        .ok_or_else(|| -> Error { "first argument should be the caller's bearer token".into() })?;

    let payload_path = args
        .next()
        .ok_or_else(|| -> Error { "second argument should be a JSON payload file".into() })?;
    let payload = std::fs::read_to_string(&payload_path)?;

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri("/")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::Text(payload))?;

    let svcs = Services::init().await?;
    let response = svcs.handle(request).await;

    println!("{}", response.status());

    match response.body() {
        Body::Text(s) => println!("{s}"),
        Body::Binary(b) => println!("{}", String::from_utf8_lossy(b)),
        Body::Empty => {}
    }

    Ok(())
}
