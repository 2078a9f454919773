//! "Proxy event" version of the comparison report Lambda.
//!
//! This executable expects to be invoked through AWS API Gateway's "proxy
//! event" protocol. Use `comparativa-report-oneshot` to run a single request
//! locally.

use lambda_http::{run, service_fn, Error, Request};

use comparativa_report_lambda::Services;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let svcs = Services::init().await?;
    let ref_svcs = &svcs;

    run(service_fn(|req: Request| async move {
        Ok::<_, Error>(ref_svcs.handle(req).await)
    }))
    .await?;
    Ok(())
}
