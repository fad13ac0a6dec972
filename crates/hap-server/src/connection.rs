//! Per-connection worker.
//!
//! Reads HTTP requests, runs the pairing handlers, switches to encrypted
//! framing after pair-verify, hands everything else to the dispatcher and
//! interleaves queued `EVENT/1.0` notifications between responses.

use crate::broker::Notification;
use crate::dispatcher::SessionContext;
use crate::server::ServerState;
use crate::session::SessionHandle;
use hap_core::error::HttpError;
use hap_core::{Error, HapStatus, Result};
use hap_http::{parse_request, HttpRequest, HttpResponse, Method};
use hap_pairing::{handle_pairings, EncryptedChannel, PairSetup, PairVerify};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// One controller connection.
pub(crate) struct Connection<S> {
    stream: S,
    state: Arc<ServerState>,
    session: SessionContext,
    handle: Arc<SessionHandle>,
    events: mpsc::UnboundedReceiver<Notification>,
    pair_setup: PairSetup,
    pair_verify: PairVerify,
    channel: Option<EncryptedChannel>,
    /// Installed after the pair-verify M4 response has gone out.
    pending_channel: Option<EncryptedChannel>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, state: Arc<ServerState>) -> Self {
        let (id, handle) = state.sessions.open();
        let events = state.broker.register(id);
        let manager = state.manager.clone();
        Self {
            stream,
            session: SessionContext::new(id),
            handle,
            events,
            pair_setup: PairSetup::new(manager.clone(), id),
            pair_verify: PairVerify::new(manager, id),
            channel: None,
            pending_channel: None,
            state,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.session.id
    }

    /// Serve until the peer disconnects or the session is closed.
    pub(crate) async fn run(mut self) -> Result<()> {
        let handle = self.handle.clone();
        let mut read_buf = vec![0u8; READ_CHUNK];
        let mut inbound = Vec::new();
        let mut plaintext = Vec::new();

        loop {
            tokio::select! {
                _ = handle.closed() => {
                    info!(session = self.session.id, "Session closed");
                    return Err(Error::SessionClosed);
                }
                Some(first) = self.events.recv() => {
                    self.send_events(first).await?;
                }
                read = self.stream.read(&mut read_buf) => {
                    let n = read?;
                    if n == 0 {
                        debug!(session = self.session.id, "Controller disconnected");
                        return Ok(());
                    }
                    inbound.extend_from_slice(&read_buf[..n]);
                    self.process(&mut inbound, &mut plaintext).await?;
                }
            }
        }
    }

    /// Decrypt what arrived and answer every complete request.
    async fn process(&mut self, inbound: &mut Vec<u8>, plaintext: &mut Vec<u8>) -> Result<()> {
        let session = self.session.id;
        loop {
            match &mut self.channel {
                Some(channel) => {
                    let decrypted = channel.decrypt(inbound).map_err(|e| {
                        warn!(session, error = %e, "Dropping session on bad frame");
                        e
                    })?;
                    plaintext.extend_from_slice(&decrypted);
                }
                None => plaintext.append(inbound),
            }

            let mut upgraded = false;
            loop {
                let request = match parse_request(plaintext) {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(session = self.session.id, error = %e, "Malformed request");
                        let status = match e {
                            HttpError::BodyTooLarge(_) => 413,
                            HttpError::UnsupportedMethod(_) => 405,
                            _ => 400,
                        };
                        if let Err(send_err) = self.send(&HttpResponse::new(status)).await {
                            debug!(session = self.session.id, error = %send_err, "Could not report malformed request");
                        }
                        return Err(e.into());
                    }
                };
                if self.handle.is_closed() {
                    return Err(Error::SessionClosed);
                }

                let response = self.handle_request(request).await;
                self.send(&response).await?;

                if let Some(channel) = self.pending_channel.take() {
                    self.channel = Some(channel);
                    info!(
                        session = self.session.id,
                        controller = self.session.controller.as_deref().unwrap_or(""),
                        "Session verified"
                    );
                    upgraded = true;
                    break;
                }
            }

            if upgraded && !plaintext.is_empty() {
                // Bytes after M3 are already framed; decrypt them on the next pass.
                let mut framed = std::mem::take(plaintext);
                framed.append(inbound);
                *inbound = framed;
                continue;
            }
            return Ok(());
        }
    }

    async fn handle_request(&mut self, request: HttpRequest) -> HttpResponse {
        debug!(
            session = self.session.id,
            method = request.method.as_str(),
            path = %request.path,
            "Request"
        );

        match request.path.as_str() {
            "/pair-setup" | "/pair-verify" | "/pairings" if request.method != Method::Post => {
                HttpResponse::new(405)
            }
            "/pair-setup" => HttpResponse::tlv(self.pair_setup.handle(&request.body).await),
            "/pair-verify" => {
                let step = self.pair_verify.handle(&request.body).await;
                if let Some(verified) = step.verified {
                    let controller = verified.controller.identifier;
                    self.state
                        .sessions
                        .set_controller(self.session.id, &controller);
                    self.session.controller = Some(controller);
                    self.pending_channel = Some(EncryptedChannel::new(&verified.keys));
                }
                HttpResponse::tlv(step.response)
            }
            "/pairings" => match self.session.controller.clone() {
                Some(controller) => {
                    let outcome =
                        handle_pairings(&self.state.manager, &controller, &request.body).await;
                    for removed in &outcome.removed {
                        self.state.sessions.close_controller(removed);
                    }
                    HttpResponse::tlv(outcome.response)
                }
                None => HttpResponse::hap_status(470, HapStatus::InsufficientPrivileges),
            },
            "/identify" => self.state.dispatcher.dispatch(&mut self.session, &request),
            _ if !self.session.is_verified() => {
                debug!(session = self.session.id, path = %request.path, "Unverified request");
                HttpResponse::hap_status(470, HapStatus::InsufficientPrivileges)
            }
            _ => self.state.dispatcher.dispatch(&mut self.session, &request),
        }
    }

    /// Coalesce everything queued into one event message.
    async fn send_events(&mut self, first: Notification) -> Result<()> {
        let mut batch = vec![first];
        while let Ok(next) = self.events.try_recv() {
            batch.push(next);
        }
        if self.channel.is_none() {
            return Ok(());
        }

        let characteristics: Vec<_> = batch
            .iter()
            .map(|n| json!({ "aid": n.aid, "iid": n.iid, "value": n.value }))
            .collect();
        debug!(session = self.session.id, count = batch.len(), "Sending event");
        self.send(&HttpResponse::event(&json!({ "characteristics": characteristics })))
            .await
    }

    async fn send(&mut self, response: &HttpResponse) -> Result<()> {
        let bytes = response.serialize();
        let bytes = match &mut self.channel {
            Some(channel) => channel.encrypt(&bytes)?,
            None => bytes,
        };
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        self.state.broker.remove_session(self.session.id);
        self.state.sessions.remove(self.session.id);
    }
}
