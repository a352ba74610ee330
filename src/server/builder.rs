// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::listener::bind_tcp;
use anyhow::{anyhow, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower::Service;

/// Assembles the status server: where to listen, what serves each request
/// and which signal stops the accept loop.
pub struct ServerBuilder<H> {
    addr: SocketAddr,
    handler: Option<H>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handler: None,
            shutdown: None,
        }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Stop accepting connections once the receiver reads `true`.
    /// Connections already open finish on their own tasks.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Serves until the shutdown signal fires, or forever without one.
    pub async fn serve(self) -> Result<()> {
        let handler = self
            .handler
            .ok_or_else(|| anyhow!("status server started without a handler"))?;
        let mut shutdown = self.shutdown;

        let listener = bind_tcp(self.addr).await?;
        tracing::info!("Status server listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = stopped(&mut shutdown) => {
                    tracing::info!("Status server shutting down");
                    return Ok(());
                }
            };

            let svc = handler.clone();
            tokio::spawn(async move {
                if let Err(err) = Http::new().serve_connection(stream, svc).await {
                    tracing::debug!(%peer, %err, "status connection closed with error");
                }
            });
        }
    }
}

/// Resolves once shutdown is requested. Pends forever without a receiver,
/// or when every sender is gone without ever asking.
async fn stopped(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;
    use std::convert::Infallible;

    #[derive(Clone)]
    struct Teapot;

    impl Service<Request<Body>> for Teapot {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::IM_A_TEAPOT;
            futures::future::ready(Ok(response))
        }
    }

    fn local() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_serve_without_handler_fails() {
        let result = ServerBuilder::<Teapot>::new(local()).serve().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_returns_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let server = ServerBuilder::new(local())
            .with_handler(Teapot)
            .with_shutdown(rx);
        let handle = tokio::spawn(server.serve());

        tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
