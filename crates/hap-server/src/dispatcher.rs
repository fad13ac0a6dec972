//! Routes JSON requests of a session against the attribute database.
//!
//! Batch requests are processed item by item: one item failing never
//! aborts its siblings, and results come back in request order.

use crate::broker::{EventBroker, SessionId};
use crate::database::{characteristic_json, AccessoryDatabase, JsonOptions};
use hap_core::error::{Access, CharacteristicError};
use hap_core::{HapStatus, Value};
use hap_http::body::{self, PrepareRequest, ReadQuery, WriteItem, WriteRequest};
use hap_http::{HttpRequest, HttpResponse, Method};
use serde_json::{json, Map, Value as Json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Per-connection state the dispatcher needs.
#[derive(Debug)]
pub struct SessionContext {
    pub id: SessionId,
    /// Pairing identifier of the verified controller.
    pub controller: Option<String>,
    prepared: Option<PreparedWrite>,
}

#[derive(Debug, Clone, Copy)]
struct PreparedWrite {
    pid: u64,
    deadline: Instant,
}

impl SessionContext {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            controller: None,
            prepared: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.controller.is_some()
    }

    /// Whether `pid` matches an unexpired `/prepare` of this session.
    fn prepared_for(&self, pid: Option<u64>) -> bool {
        match (self.prepared, pid) {
            (Some(prepared), Some(pid)) => prepared.pid == pid && Instant::now() < prepared.deadline,
            _ => false,
        }
    }
}

/// JSON request handler shared by all connections.
pub struct Dispatcher {
    database: Arc<AccessoryDatabase>,
    broker: Arc<EventBroker>,
    paired: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        database: Arc<AccessoryDatabase>,
        broker: Arc<EventBroker>,
        paired: watch::Receiver<bool>,
    ) -> Self {
        Self {
            database,
            broker,
            paired,
        }
    }

    pub fn database(&self) -> &Arc<AccessoryDatabase> {
        &self.database
    }

    /// Handle a non-pairing request.
    pub fn dispatch(&self, session: &mut SessionContext, request: &HttpRequest) -> HttpResponse {
        match (request.method, request.path.as_str()) {
            (Method::Get, "/accessories") => HttpResponse::json(200, &self.database.to_json()),
            (Method::Get, "/characteristics") => self.read(session, request),
            (Method::Put, "/characteristics") => self.write(session, request),
            (Method::Put, "/prepare") => self.prepare(session, request),
            (Method::Post, "/identify") => self.identify(),
            (_, "/accessories" | "/characteristics" | "/prepare" | "/identify") => {
                HttpResponse::new(405)
            }
            (_, path) => {
                debug!(session = session.id, path, "Unknown resource");
                HttpResponse::hap_status(404, HapStatus::ResourceDoesNotExist)
            }
        }
    }

    fn read(&self, session: &SessionContext, request: &HttpRequest) -> HttpResponse {
        let query = match ReadQuery::parse(&request.query_pairs()) {
            Ok(query) => query,
            Err(e) => {
                debug!(session = session.id, error = %e, "Bad read query");
                return HttpResponse::hap_status(400, HapStatus::InvalidValueInRequest);
            }
        };
        let options = JsonOptions {
            meta: query.meta,
            perms: query.perms,
            hap_type: query.hap_type,
        };

        let mut all_ok = true;
        let mut items = Vec::with_capacity(query.ids.len());
        for &(aid, iid) in &query.ids {
            let item = self
                .database
                .resolve(aid, iid)
                .and_then(|c| c.read().map(|value| (c, value)));
            match item {
                Ok((c, value)) => {
                    let mut object = characteristic_json(Some(aid), c, Some(&value), options);
                    if query.ev {
                        insert(&mut object, "ev", json!(self.broker.is_subscribed(session.id, aid, iid)));
                    }
                    items.push((object, HapStatus::Success));
                }
                Err(e) => {
                    debug!(session = session.id, aid, iid, error = %e, "Read failed");
                    all_ok = false;
                    items.push((json!({ "aid": aid, "iid": iid }), e.status()));
                }
            }
        }

        let characteristics: Vec<Json> = items
            .into_iter()
            .map(|(mut object, status)| {
                if !all_ok {
                    insert(&mut object, "status", json!(status.code()));
                }
                object
            })
            .collect();
        let status = if all_ok { 200 } else { 207 };
        HttpResponse::json(status, &json!({ "characteristics": characteristics }))
    }

    fn write(&self, session: &mut SessionContext, request: &HttpRequest) -> HttpResponse {
        let write: WriteRequest = match body::decode(&request.body) {
            Ok(write) => write,
            Err(e) => {
                debug!(session = session.id, error = %e, "Bad write body");
                return HttpResponse::hap_status(400, HapStatus::InvalidValueInRequest);
            }
        };

        let timed_ok = session.prepared_for(write.pid);
        if write.pid.is_some() {
            // A prepare authorizes exactly one write request.
            session.prepared = None;
        }

        let mut needs_body = false;
        let mut results = Vec::with_capacity(write.characteristics.len());
        for item in &write.characteristics {
            let result = self.write_item(session.id, item, timed_ok);
            match &result {
                Ok(Some(_)) => needs_body = true,
                Ok(None) => {}
                Err(e) => {
                    debug!(session = session.id, aid = item.aid, iid = item.iid, error = %e, "Write failed");
                    needs_body = true;
                }
            }
            results.push((item, result));
        }

        if !needs_body {
            return HttpResponse::no_content();
        }
        let characteristics: Vec<Json> = results
            .into_iter()
            .map(|(item, result)| {
                let mut object = json!({ "aid": item.aid, "iid": item.iid });
                match result {
                    Ok(value) => {
                        insert(&mut object, "status", json!(HapStatus::Success.code()));
                        if let Some(value) = value {
                            insert(&mut object, "value", value.to_json());
                        }
                    }
                    Err(e) => insert(&mut object, "status", json!(e.status().code())),
                }
                object
            })
            .collect();
        HttpResponse::json(207, &json!({ "characteristics": characteristics }))
    }

    /// One write item. `Ok(Some(value))` when a write response was requested.
    fn write_item(
        &self,
        session: SessionId,
        item: &WriteItem,
        timed_ok: bool,
    ) -> Result<Option<Value>, CharacteristicError> {
        let (aid, iid) = (item.aid, item.iid);
        let characteristic = self.database.resolve(aid, iid)?;
        let perms = characteristic.perms();

        if let Some(enable) = item.ev {
            if !perms.notifies() {
                return Err(CharacteristicError::NotAuthorized(Access::Notify));
            }
            if enable {
                self.broker.subscribe(session, aid, iid);
            } else {
                self.broker.unsubscribe(session, aid, iid);
            }
        }

        let Some(json) = &item.value else {
            return Ok(None);
        };
        if !perms.writable() {
            return Err(CharacteristicError::NotAuthorized(Access::Write));
        }
        if perms.requires_timed_write() && !timed_ok {
            return Err(CharacteristicError::InvalidValue(
                "timed write without a valid prepare".into(),
            ));
        }

        let value = characteristic.properties().format.decode(json)?;
        let broker = &self.broker;
        let outcome = characteristic.write(&value, |committed| {
            broker.publish(aid, iid, committed, Some(session));
        })?;
        if !outcome.changed {
            debug!(session, aid, iid, "Write left value unchanged");
        }

        if item.r == Some(true) && perms.write_response() {
            Ok(Some(characteristic.value()))
        } else {
            Ok(None)
        }
    }

    fn prepare(&self, session: &mut SessionContext, request: &HttpRequest) -> HttpResponse {
        match body::decode::<PrepareRequest>(&request.body) {
            Ok(prepare) => {
                session.prepared = Some(PreparedWrite {
                    pid: prepare.pid,
                    deadline: Instant::now() + Duration::from_millis(prepare.ttl),
                });
                debug!(session = session.id, pid = prepare.pid, ttl = prepare.ttl, "Prepared timed write");
                HttpResponse::json(200, &json!({ "status": HapStatus::Success.code() }))
            }
            Err(e) => {
                debug!(session = session.id, error = %e, "Bad prepare body");
                HttpResponse::hap_status(400, HapStatus::InvalidValueInRequest)
            }
        }
    }

    /// `POST /identify`, only honoured while unpaired.
    fn identify(&self) -> HttpResponse {
        if *self.paired.borrow() {
            return HttpResponse::hap_status(400, HapStatus::InsufficientPrivileges);
        }
        let identify = self
            .database
            .primary()
            .and_then(|a| a.service_by_name("AccessoryInformation"))
            .and_then(|s| s.characteristic("Identify"));
        match identify {
            Some(c) => match c.write(&Value::Bool(true), |_| {}) {
                Ok(_) => {
                    info!("Identify requested");
                    HttpResponse::no_content()
                }
                Err(e) => {
                    warn!(error = %e, "Identify failed");
                    HttpResponse::hap_status(500, e.status())
                }
            },
            None => HttpResponse::hap_status(404, HapStatus::ResourceDoesNotExist),
        }
    }
}

fn insert(object: &mut Json, key: &str, value: Json) {
    if let Json::Object(map) = object {
        map.insert(key.to_string(), value);
    } else {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        *object = Json::Object(map);
    }
}
