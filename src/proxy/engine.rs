//! Connection acceptance and per-request relay.
//!
//! # Responsibilities
//! - Accept downstream connections, one task per connection
//! - Parse request heads off the raw stream and decide interception
//! - Rewrite container-creation bodies via the translator
//! - Dial a fresh upstream connection per request and relay verbatim
//! - Hand upgraded connections to the raw byte forwarder
//!
//! # Design Decisions
//! - One upstream dial per request: `Connection: close` is forced on the
//!   upstream side unless the client signaled upgrade intent
//! - Responses stream with a flush per chunk so log-tailing clients see
//!   data as the engine produces it
//! - Per-request failures answer that one client with a structured error
//!   and never touch other connections

use std::io;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::body::{self, BodyFraming, CarryStream};
use crate::http::head::{strip_version_prefix, RequestHead, ResponseHead};
use crate::http::response::write_error;
use crate::lifecycle::{ActivityTracker, Shutdown};
use crate::net::{BoundSocket, ConnectionIdentity};
use crate::proxy::forward::forward;
use crate::rewrite::{rewrite_body, BodyKind};
use crate::translate::Translator;

const APPLICATION_JSON: &str = "application/json";
const PING_REQUEST: &[u8] = b"GET /_ping HTTP/1.1\r\nHost: d\r\nConnection: close\r\n\r\n";

/// Outcome of one relayed request.
enum Disposition {
    /// Response fully relayed; the connection can serve the next request.
    Served,
    /// The downstream connection must close.
    Close,
    /// Status 101: the connection now belongs to the raw forwarder.
    Upgraded(CarryStream<UnixStream>),
}

pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    translator: Arc<Translator>,
    tracker: ActivityTracker,
    shutdown: Arc<Shutdown>,
}

impl ProxyServer {
    pub fn new(
        config: Arc<ProxyConfig>,
        translator: Arc<Translator>,
        tracker: ActivityTracker,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            config,
            translator,
            tracker,
            shutdown,
        }
    }

    /// Probe the upstream socket before accepting any traffic.
    pub async fn preflight(&self) -> Result<(), ProxyError> {
        let stream = UnixStream::connect(&self.config.upstream_socket)
            .await
            .map_err(|source| ProxyError::UpstreamUnreachable {
                path: self.config.upstream_socket.clone(),
                source,
            })?;

        let mut upstream = CarryStream::new(stream);
        upstream.write_all(PING_REQUEST).await?;
        let head_bytes = upstream.read_head().await?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "upstream closed without answering the health probe",
            )
        })?;
        let head = ResponseHead::parse(&head_bytes)?;
        if head.status != 200 {
            return Err(ProxyError::UpstreamProbeFailed(head.status));
        }
        debug!("upstream health probe succeeded");
        Ok(())
    }

    /// Accept connections until shutdown, then drain and tear down the
    /// socket.
    pub async fn run(&self, socket: BoundSocket) -> Result<(), ProxyError> {
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = socket.accept() => match accepted {
                    Ok(stream) => self.spawn_handler(stream),
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        info!(active = self.tracker.active_count(), "draining connections");
        self.tracker.wait_idle().await;
        socket.close();
        Ok(())
    }

    fn spawn_handler(&self, stream: UnixStream) {
        let guard = self.tracker.track();
        let identity = ConnectionIdentity::resolve(&stream);
        let span = info_span!("connection", id = %guard.id(), peer = %identity);

        let handler = RequestHandler {
            config: Arc::clone(&self.config),
            translator: Arc::clone(&self.translator),
        };
        tokio::spawn(
            async move {
                let _guard = guard;
                handler.handle_connection(stream).await;
            }
            .instrument(span),
        );
    }
}

struct RequestHandler {
    config: Arc<ProxyConfig>,
    translator: Arc<Translator>,
}

impl RequestHandler {
    async fn handle_connection(&self, stream: UnixStream) {
        let mut downstream = CarryStream::new(stream);
        loop {
            let head_bytes = match downstream.read_head().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "downstream read failed");
                    break;
                }
            };
            let head = match RequestHead::parse(&head_bytes) {
                Ok(head) => head,
                Err(e) => {
                    let _ = write_error(&mut downstream, 400, "could not parse the request", &e)
                        .await;
                    break;
                }
            };
            let wants_close = head.wants_close();

            match self.handle_request(&mut downstream, &head).await {
                Ok(Disposition::Served) => {
                    if wants_close {
                        break;
                    }
                }
                Ok(Disposition::Close) => break,
                Ok(Disposition::Upgraded(upstream)) => {
                    take_over(downstream, upstream).await;
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "connection ended");
                    break;
                }
            }
        }
    }

    async fn handle_request(
        &self,
        downstream: &mut CarryStream<UnixStream>,
        head: &RequestHead,
    ) -> io::Result<Disposition> {
        let routed = strip_version_prefix(&head.path);
        let request_framing = BodyFraming::for_request(head);
        let intercept = if head.method == "POST" {
            BodyKind::for_path(routed)
        } else {
            None
        };

        let mut rewritten: Option<Vec<u8>> = None;
        if let Some(kind) = intercept {
            if head
                .content_type()
                .is_some_and(|ct| ct != APPLICATION_JSON)
            {
                warn!(
                    method = %head.method,
                    path = %routed,
                    content_type = head.content_type().unwrap_or(""),
                    "unsupported content type, passing request through"
                );
            } else {
                match self.rewrite(downstream, kind, request_framing).await? {
                    Ok(encoded) => rewritten = Some(encoded),
                    Err(disposition) => return Ok(disposition),
                }
            }
        }

        let upstream = match UnixStream::connect(&self.config.upstream_socket).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "could not connect to upstream");
                write_error(downstream, 502, "could not reach the engine socket", &e).await?;
                return Ok(Disposition::Close);
            }
        };
        let mut upstream = CarryStream::new(upstream);

        let upgrade_intent = head.is_upgrade();
        let request_head = head.serialize(!upgrade_intent, rewritten.as_ref().map(Vec::len));

        let sent = async {
            upstream.write_all(&request_head).await?;
            match &rewritten {
                Some(encoded) => upstream.write_all(encoded).await?,
                None => {
                    body::relay_body(downstream, upstream.get_mut(), request_framing).await?;
                }
            }
            upstream.flush().await
        }
        .await;
        if let Err(e) = sent {
            error!(error = %e, "could not forward request upstream");
            write_error(
                downstream,
                502,
                "could not forward the request to the engine",
                &e,
            )
            .await?;
            return Ok(Disposition::Close);
        }

        let response_head_bytes = match upstream.read_head().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                error!("upstream closed before responding");
                write_error(
                    downstream,
                    500,
                    "engine closed the connection before responding",
                    &"unexpected end of stream",
                )
                .await?;
                return Ok(Disposition::Close);
            }
            Err(e) => {
                error!(error = %e, "could not read upstream response");
                write_error(downstream, 500, "could not read the engine response", &e).await?;
                return Ok(Disposition::Close);
            }
        };
        let response_head = match ResponseHead::parse(&response_head_bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "could not parse upstream response");
                write_error(downstream, 500, "could not parse the engine response", &e).await?;
                return Ok(Disposition::Close);
            }
        };

        info!(
            method = %head.method,
            path = %head.path,
            status = response_head.status,
            changed = rewritten.is_some(),
            "relayed"
        );

        // The head goes out exactly as the engine wrote it.
        downstream.write_all(&response_head_bytes).await?;
        downstream.flush().await?;

        if response_head.status == 101 {
            return Ok(Disposition::Upgraded(upstream));
        }

        let response_framing = BodyFraming::for_response(&response_head, &head.method);
        body::relay_body(&mut upstream, downstream.get_mut(), response_framing).await?;

        Ok(Disposition::Served)
    }

    /// Buffer and rewrite an intercepted creation body. The inner `Err`
    /// carries the disposition after a client-facing error was written.
    async fn rewrite(
        &self,
        downstream: &mut CarryStream<UnixStream>,
        kind: BodyKind,
        framing: BodyFraming,
    ) -> io::Result<Result<Vec<u8>, Disposition>> {
        let raw = body::read_framed_body(downstream, framing).await?;

        let mut decoded: Map<String, Value> = match serde_json::from_slice(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "could not decode request body");
                write_error(downstream, 400, "could not decode the request body", &e).await?;
                return Ok(Err(Disposition::Close));
            }
        };

        if let Err(e) = rewrite_body(kind, &mut decoded, &self.translator) {
            warn!(error = %e, "bind mount translation failed");
            write_error(downstream, 400, "could not translate bind mount paths", &e).await?;
            return Ok(Err(Disposition::Close));
        }

        match serde_json::to_vec(&decoded) {
            Ok(encoded) => Ok(Ok(encoded)),
            Err(e) => {
                error!(error = %e, "could not re-encode request body");
                write_error(downstream, 500, "could not re-encode the request body", &e).await?;
                Ok(Err(Disposition::Close))
            }
        }
    }
}

/// Hand an upgraded connection to the raw forwarder, flushing any bytes
/// over-read past either head first.
async fn take_over(downstream: CarryStream<UnixStream>, upstream: CarryStream<UnixStream>) {
    let (mut ds, ds_carry) = downstream.into_inner();
    let (mut us, us_carry) = upstream.into_inner();

    if !us_carry.is_empty() {
        if let Err(e) = ds.write_all(&us_carry).await {
            warn!(error = %e, "could not flush buffered upstream bytes");
            return;
        }
    }
    if !ds_carry.is_empty() {
        if let Err(e) = us.write_all(&ds_carry).await {
            warn!(error = %e, "could not flush buffered downstream bytes");
            return;
        }
    }

    match forward(&mut ds, &mut us).await {
        Ok(()) => info!("upgraded connection closed"),
        Err(e) => warn!(error = %e, "upgraded connection failed"),
    }
}
