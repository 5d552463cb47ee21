//! Metrics & health HTTP server (SPEC_FULL.md §11), grounded directly on
//! the `miketigerblue-rust-feed-ingestor` example's `/metrics` + `/healthz`
//! server: same hyper 0.14 service plumbing, same content-type handling.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};
use tracing::info;

use crate::metrics::Metrics;

/// Spawns the metrics/health server in the background and returns immediately.
pub fn spawn(addr: SocketAddr, metrics: Arc<Metrics>) {
    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move { Ok::<_, Infallible>(route(req, &metrics)) }
            }))
        }
    });

    tokio::spawn(async move {
        info!(%addr, "starting metrics/health server");
        if let Err(err) = Server::bind(&addr).serve(make_svc).await {
            tracing::error!(%err, "metrics/health server exited");
        }
    });
}

fn route(req: Request<Body>, metrics: &Metrics) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Response::builder()
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(metrics.gather()))
            .expect("metrics response is well-formed"),
        (&Method::GET, "/healthz") => Response::new(Body::from("OK")),
        _ => Response::builder()
            .status(404)
            .body(Body::empty())
            .expect("404 response is well-formed"),
    }
}
