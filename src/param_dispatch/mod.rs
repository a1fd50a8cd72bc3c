//! Parameter / remote-call dispatch
//!
//! ## 概要
//! twin更新とfunction呼び出しを受信し、登録済みコールバックへ振り分ける。
//! 受信ペイロードはコールバック実行前に必ず型付きメッセージへパースする。
//!
//! ## Contract
//! - `subscribe` registers `(remote_name, trigger, scope) → callback` and
//!   returns the topic the caller must subscribe to on the link.
//! - On a twin update, every registration whose remote name appears among
//!   the requested keys fires, in registration order. Several
//!   registrations matching one payload all fire; this is a defined part
//!   of the contract.
//! - On a remote call, each matching registration fires and a
//!   [`FunctionResponse`] echoing the request id is published to the
//!   functions/out topic.
//! - Requested values are absorbed into the [`ParameterStore`] before any
//!   callback runs, so callbacks observe the new values through the
//!   parameter accessors.
//!
//! Malformed payloads return [`Error::MalformedMessage`]; the pump logs
//! and keeps running.

mod types;

pub use types::{
    CallbackTrigger, FunctionCall, FunctionEvent, FunctionResponse, ParameterScope, TwinUpdate,
};

use crate::cloud_session::ParameterStore;
use crate::error::{Error, Result};
use crate::mqtt_link::{InboundMessage, LinkHandle, TopicSet};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Callback signature. Runs on the dispatch task; keep it short or hand
/// off through a flag/channel like the loop callbacks do.
pub type Callback = Arc<dyn Fn(&mut FunctionEvent) + Send + Sync>;

struct SubscriptionEntry {
    remote_name: String,
    trigger: CallbackTrigger,
    scope: ParameterScope,
    callback: Callback,
}

/// Name → callback dispatch table
pub struct DispatchTable {
    topics: TopicSet,
    params: Arc<ParameterStore>,
    link: LinkHandle,
    entries: RwLock<Vec<SubscriptionEntry>>,
}

impl DispatchTable {
    pub fn new(topics: TopicSet, params: Arc<ParameterStore>, link: LinkHandle) -> Self {
        Self {
            topics,
            params,
            link,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback. Returns the topic carrying its messages;
    /// the caller subscribes to it on the link (duplicates are fine).
    pub fn subscribe(
        &self,
        remote_name: impl Into<String>,
        trigger: CallbackTrigger,
        scope: ParameterScope,
        callback: Callback,
    ) -> String {
        let remote_name = remote_name.into();
        let topic = match trigger {
            CallbackTrigger::OnParameterUpdate => self.topics.twin_update(scope),
            CallbackTrigger::OnRemoteCall => self.topics.functions_in(),
        };
        debug!(remote_name = %remote_name, topic = %topic, "Callback registered");
        let mut entries = self.entries.write().expect("dispatch table lock");
        entries.push(SubscriptionEntry {
            remote_name,
            trigger,
            scope,
            callback,
        });
        topic
    }

    /// Route one inbound publish. Returns the number of callbacks fired.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Result<usize> {
        if topic == self.topics.twin_update(ParameterScope::Device) {
            self.dispatch_twin(ParameterScope::Device, payload)
        } else if topic == self.topics.twin_update(ParameterScope::Application) {
            self.dispatch_twin(ParameterScope::Application, payload)
        } else if topic == self.topics.functions_in() {
            self.dispatch_function(payload)
        } else {
            debug!(topic = %topic, "No dispatch route for topic");
            Ok(0)
        }
    }

    fn dispatch_twin(&self, scope: ParameterScope, payload: &[u8]) -> Result<usize> {
        let update = TwinUpdate::parse(payload)?;
        if update.requested.is_empty() {
            return Ok(0);
        }

        self.params.absorb(scope, &update);

        // Collect matches first so callbacks never run under the table lock
        let matches: Vec<(String, Callback)> = {
            let entries = self.entries.read().expect("dispatch table lock");
            entries
                .iter()
                .filter(|e| {
                    e.trigger == CallbackTrigger::OnParameterUpdate
                        && e.scope == scope
                        && update.requested.contains_key(&e.remote_name)
                })
                .map(|e| (e.remote_name.clone(), e.callback.clone()))
                .collect()
        };

        for (name, callback) in &matches {
            let value = update.requested[name].clone();
            let mut event = FunctionEvent::parameter_update(name, value);
            callback(&mut event);
        }
        Ok(matches.len())
    }

    fn dispatch_function(&self, payload: &[u8]) -> Result<usize> {
        let call = FunctionCall::parse(payload)?;

        let matches: Vec<Callback> = {
            let entries = self.entries.read().expect("dispatch table lock");
            entries
                .iter()
                .filter(|e| e.trigger == CallbackTrigger::OnRemoteCall && e.remote_name == call.name)
                .map(|e| e.callback.clone())
                .collect()
        };

        for callback in &matches {
            let mut event = FunctionEvent::remote_call(&call);
            callback(&mut event);

            let response = FunctionResponse {
                name: call.name.clone(),
                call_id: call.id.clone(),
                status: event.status,
                result: event.result,
            };
            let body = serde_json::to_vec(&response)?;
            self.link.publish(self.topics.functions_out(), body)?;
        }
        Ok(matches.len())
    }
}

/// Drain inbound messages into the table until the link closes
pub async fn pump(mut rx: mpsc::UnboundedReceiver<InboundMessage>, table: Arc<DispatchTable>) {
    while let Some(msg) = rx.recv().await {
        match table.dispatch(&msg.topic, &msg.payload) {
            Ok(fired) if fired > 0 => {
                debug!(topic = %msg.topic, fired = fired, "Dispatched inbound message");
            }
            Ok(_) => {}
            Err(Error::MalformedMessage(reason)) => {
                warn!(topic = %msg.topic, reason = %reason, "Dropping malformed message");
            }
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "Dispatch failed");
            }
        }
    }
    debug!("Dispatch pump stopped");
}
