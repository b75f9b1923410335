//! In-process transport to a simulated companion.
//!
//! Requests travel over an mpsc channel paired with a oneshot for the
//! reply, the same shape a real message bridge has. The link can be
//! dropped and restored from the outside to simulate Bluetooth loss.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use dripsync_common::{Error, Result};

use crate::transport::{Request, Response, Transport};

/// Handler the companion runs for every request.
pub type CompanionHandler =
    Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

type Envelope = (Request, oneshot::Sender<Result<Response>>);

/// Switch for the simulated radio link.
#[derive(Debug, Clone)]
pub struct LinkControl {
    up: Arc<AtomicBool>,
}

impl LinkControl {
    /// Bring the link up or down.
    pub fn set_up(&self, up: bool) {
        info!("Companion link {}", if up { "up" } else { "down" });
        self.up.store(up, Ordering::SeqCst);
    }

    /// Whether the link is up.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// Widget side of the loopback channel.
pub struct LoopbackTransport {
    request_tx: mpsc::Sender<Envelope>,
    link: LinkControl,
    connected: AtomicBool,
}

/// Companion side of the loopback channel.
pub struct Companion {
    request_rx: mpsc::Receiver<Envelope>,
    handler: CompanionHandler,
}

/// Create a connected pair. The link starts up, the transport starts
/// disconnected.
pub fn loopback(handler: CompanionHandler) -> (LoopbackTransport, Companion, LinkControl) {
    let (request_tx, request_rx) = mpsc::channel(16);
    let link = LinkControl {
        up: Arc::new(AtomicBool::new(true)),
    };

    let transport = LoopbackTransport {
        request_tx,
        link: link.clone(),
        connected: AtomicBool::new(false),
    };
    let companion = Companion {
        request_rx,
        handler,
    };

    (transport, companion, link)
}

impl Companion {
    /// Serve requests until every transport handle is dropped.
    ///
    /// Each request is handled on its own task so a slow answer does not
    /// hold up the next one.
    pub async fn serve(mut self) {
        info!("Companion started");

        while let Some((request, reply_tx)) = self.request_rx.recv().await {
            debug!("Companion handling {:?}", request.method);
            let handler = self.handler.clone();
            tokio::spawn(async move {
                let result = handler(request).await;
                // The caller may have timed out and gone away.
                let _ = reply_tx.send(result);
            });
        }

        info!("Companion stopped");
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn connect(&self) -> Result<()> {
        if !self.link.is_up() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(Error::TransportDisconnected);
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!("Loopback transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("Loopback transport disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.link.is_up()
    }

    async fn request(&self, request: Request) -> Result<Response> {
        if !self.is_connected() {
            return Err(Error::TransportDisconnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send((request, reply_tx))
            .await
            .map_err(|_| Error::Transport("companion is not running".to_string()))?;

        let response = reply_rx.await.map_err(|_| {
            warn!("Companion dropped a request without answering");
            Error::Transport("companion dropped the request".to_string())
        })??;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn echo_handler() -> CompanionHandler {
        Arc::new(|request: Request| {
            async move { Ok::<_, Error>(Response::reply(&request, r#"{"bg":{"val":"5.5"}}"#)) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (transport, companion, _link) = loopback(echo_handler());
        tokio::spawn(companion.serve());

        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        let request = Request::get_info();
        let response = transport.request(request.clone()).await.unwrap();
        assert_eq!(response.id, request.id);
        assert!(response.result.contains("5.5"));
    }

    #[tokio::test]
    async fn test_requests_fail_when_not_connected() {
        let (transport, companion, _link) = loopback(echo_handler());
        tokio::spawn(companion.serve());

        assert!(!transport.is_connected());
        let err = transport.request(Request::get_info()).await.unwrap_err();
        assert!(err.is_disconnected());

        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();
        let err = transport.request(Request::get_info()).await.unwrap_err();
        assert!(err.is_disconnected());
    }

    #[tokio::test]
    async fn test_link_down_blocks_connect_and_requests() {
        let (transport, companion, link) = loopback(echo_handler());
        tokio::spawn(companion.serve());

        transport.connect().await.unwrap();
        link.set_up(false);
        assert!(!transport.is_connected());
        assert!(transport.request(Request::get_info()).await.is_err());
        assert!(transport.connect().await.is_err());

        link.set_up(true);
        transport.connect().await.unwrap();
        assert!(transport.request(Request::get_info()).await.is_ok());
    }

    #[tokio::test]
    async fn test_companion_errors_are_forwarded() {
        let handler: CompanionHandler = Arc::new(|_request: Request| {
            async { Err::<Response, _>(Error::Transport("companion busy".to_string())) }.boxed()
        });
        let (transport, companion, _link) = loopback(handler);
        tokio::spawn(companion.serve());

        transport.connect().await.unwrap();
        let err = transport.request(Request::get_info()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(msg) if msg == "companion busy"));
    }

    #[tokio::test]
    async fn test_stopped_companion_is_transport_error() {
        let (transport, companion, _link) = loopback(echo_handler());
        drop(companion);

        transport.connect().await.unwrap();
        let err = transport.request(Request::get_info()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
