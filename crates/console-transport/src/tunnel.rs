//! Built-in protocol-client library: a raw WebSocket tunnel.
//!
//! [`TunnelSession`] opens the proxy WebSocket, reports `connect` once the
//! handshake completes, and then carries raw bytes both ways: binary frames
//! go to the render target's frame output, and bytes from its input go to
//! the proxy as binary frames. It reports `disconnect` when the socket
//! closes. It does not speak RFB itself, so it never raises credential or
//! security events.
//!
//! ## Close semantics
//!
//! | How the socket ended                          | `clean` |
//! |-----------------------------------------------|---------|
//! | `disconnect()` called / session dropped        | `true`  |
//! | Close frame received (normal or going away)   | `true`  |
//! | Close frame received with any other code      | `false` |
//! | Read error, stream ended without Close frame  | `false` |
//! | Handshake failed                              | `false` |

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use url::Url;

use console_core::prelude::*;

use crate::session::{
    ConsoleInput, ProtocolEvent, ProtocolSession, RenderTarget, SessionFactory, SessionListener,
    SessionOptions,
};

/// Session factory registered by [`crate::TunnelLibrary`]
#[derive(Debug, Default)]
pub struct TunnelSessionFactory;

impl TunnelSessionFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SessionFactory for TunnelSessionFactory {
    fn create(
        &self,
        target: RenderTarget,
        url: &Url,
        options: SessionOptions,
        listener: SessionListener,
    ) -> Result<Box<dyn ProtocolSession>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::transport(format!("no async runtime for tunnel: {e}")))?;
        let request = build_request(url, &options.ws_protocols)?;

        debug!(
            "Creating tunnel session to {} (shared: {}, protocols: {:?})",
            url, options.shared, options.ws_protocols
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run_tunnel(request, target, listener, shutdown_rx));

        Ok(Box::new(TunnelSession {
            url: url.clone(),
            shutdown_tx: Some(shutdown_tx),
            task,
        }))
    }
}

/// A live tunnel connection
pub struct TunnelSession {
    url: Url,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for TunnelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelSession")
            .field("url", &self.url.as_str())
            .field("closing", &self.shutdown_tx.is_none())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl ProtocolSession for TunnelSession {
    fn disconnect(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            debug!("Disconnecting tunnel session to {}", self.url);
            // The task may already have exited on its own.
            let _ = tx.send(());
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Build the WebSocket handshake request, offering `protocols`.
fn build_request(url: &Url, protocols: &[String]) -> Result<Request> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::transport(format!("invalid tunnel URL {url}: {e}")))?;

    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| Error::transport(format!("invalid WebSocket subprotocol: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

/// Whether a received close frame counts as a clean shutdown
fn is_clean_close(frame: Option<&CloseFrame>) -> bool {
    match frame {
        None => true,
        Some(frame) => matches!(frame.code, CloseCode::Normal | CloseCode::Away),
    }
}

/// Background I/O task for one tunnel session.
async fn run_tunnel(
    request: Request,
    target: RenderTarget,
    listener: SessionListener,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let uri = request.uri().to_string();

    let handshake = tokio::select! {
        result = connect_async(request) => result,
        _ = &mut shutdown_rx => {
            debug!("Tunnel to {} closed before the handshake finished", uri);
            listener.emit(ProtocolEvent::Disconnect { clean: true });
            return;
        }
    };

    let ws_stream = match handshake {
        Ok((ws_stream, response)) => {
            info!(
                "Tunnel connected to {} (subprotocol: {:?})",
                uri,
                response.headers().get(SEC_WEBSOCKET_PROTOCOL)
            );
            ws_stream
        }
        Err(err) => {
            warn!("Tunnel handshake with {} failed: {}", uri, err);
            listener.emit(ProtocolEvent::Disconnect { clean: false });
            return;
        }
    };

    listener.emit(ProtocolEvent::Connect);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut bytes_in: u64 = 0;
    let mut bytes_out: u64 = 0;
    let mut input_open = target.input().is_some();

    let clean = loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Binary(data))) => {
                        bytes_in += data.len() as u64;
                        forward_frame(&target, data.to_vec());
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!("Tunnel received Close frame: {:?}", frame);
                        let clean = is_clean_close(frame.as_ref());
                        let _ = ws_sink.close().await;
                        break clean;
                    }
                    Some(Ok(_)) => {
                        // Non-binary frames carry no console data
                    }
                    Some(Err(err)) => {
                        warn!("Tunnel read error: {}", err);
                        break false;
                    }
                    None => {
                        debug!("Tunnel stream ended without a Close frame");
                        break false;
                    }
                }
            }

            input = next_input(target.input()), if input_open => {
                match input {
                    Some(data) => {
                        bytes_out += data.len() as u64;
                        if let Err(err) = ws_sink.send(WsMessage::Binary(data.into())).await {
                            warn!("Tunnel write error: {}", err);
                            break false;
                        }
                    }
                    None => {
                        debug!("Render target '{}' closed its input", target.id());
                        input_open = false;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                let _ = ws_sink.send(WsMessage::Close(None)).await;
                let _ = ws_sink.close().await;
                break true;
            }
        }
    };

    debug!(
        "Tunnel to {} finished after {} byte(s) in, {} byte(s) out, clean: {}",
        uri, bytes_in, bytes_out, clean
    );
    listener.emit(ProtocolEvent::Disconnect { clean });
}

/// Next chunk of operator input. Pending forever without an input.
async fn next_input(input: Option<&ConsoleInput>) -> Option<Vec<u8>> {
    match input {
        Some(input) => input.lock().await.recv().await,
        None => std::future::pending().await,
    }
}

/// Hand received console bytes to the render target, dropping them if the
/// consumer is behind.
fn forward_frame(target: &RenderTarget, data: Vec<u8>) {
    let Some(output) = target.frame_output() else {
        return;
    };
    match output.try_send(data) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            trace!("Render target '{}' is behind, dropping frame", target.id());
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            trace!("Render target '{}' has no reader", target.id());
        }
    }
}
