//! One-to-one call signaling relay.
//!
//! The relay keeps no call table. Every message resolves its target through
//! the registry and is forwarded with the sender identity taken from the
//! registry entry of the sending connection; a `from` field in the client
//! payload is never read.
//!
//! Only `call-initiate` reports failures back to the sender. The other steps
//! drop silently when the target is missing or unreachable and leave a log
//! line behind.

use serde_json::Value;

use crate::db::models::CallKind;
use crate::ws::broadcast::send_event;
use crate::ws::protocol::{
    CallAnswerRequest, CallInitiateRequest, IceCandidateRequest, ServerEvent, TargetRequest,
};
use crate::ws::{ConnectionHandle, ConnectionRegistry, UserId};

pub const RECIPIENT_REQUIRED: &str = "Recipient ID required";
pub const USER_OFFLINE: &str = "User is offline";
pub const IDENTIFY_REQUIRED: &str = "Identify before signaling";

/// What happened to one signaling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    MissingTarget,
    TargetUnreachable,
    Unidentified,
}

#[derive(Debug, Clone)]
pub struct SignalingRelay {
    registry: ConnectionRegistry,
}

impl SignalingRelay {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Caller offers a call. The caller always gets a terminal answer:
    /// either the callee's eventual response or a `call-error` now.
    pub fn call_initiate(&self, origin: &ConnectionHandle, req: CallInitiateRequest) -> RelayOutcome {
        let Some(from) = self.registry.user_of(origin.id) else {
            tracing::warn!(connection_id = %origin.id, "call-initiate from unidentified connection");
            reply_error(origin, IDENTIFY_REQUIRED);
            return RelayOutcome::Unidentified;
        };
        let Some(target) = req.target else {
            tracing::warn!(from = %from, "call-initiate without recipient");
            reply_error(origin, RECIPIENT_REQUIRED);
            return RelayOutcome::MissingTarget;
        };
        let Some(callee) = self.registry.resolve(&target) else {
            tracing::info!(from = %from, target = %target, "call-initiate to offline user");
            reply_error(origin, USER_OFFLINE);
            return RelayOutcome::TargetUnreachable;
        };

        let kind = req.kind.unwrap_or(CallKind::Audio);
        tracing::info!(from = %from, target = %target, kind = kind.as_str(), "Relaying call offer");

        send_event(
            &callee,
            &ServerEvent::CallIncoming {
                offer: req.offer,
                from,
                caller_name: req
                    .caller_name
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
                kind,
            },
        );
        RelayOutcome::Delivered
    }

    /// Callee accepts; forwarded to the caller.
    pub fn call_answer(&self, origin: &ConnectionHandle, req: CallAnswerRequest) -> RelayOutcome {
        let answer = req.answer;
        self.forward("call-answer", origin, req.target, |from| ServerEvent::CallAnswered {
            answer,
            from,
        })
    }

    pub fn ice_candidate(&self, origin: &ConnectionHandle, req: IceCandidateRequest) -> RelayOutcome {
        let candidate: Value = req.candidate;
        self.forward("ice-candidate", origin, req.target, |from| ServerEvent::IceCandidate {
            candidate,
            from,
        })
    }

    pub fn call_reject(&self, origin: &ConnectionHandle, req: TargetRequest) -> RelayOutcome {
        self.forward("call-reject", origin, req.target, |from| ServerEvent::CallRejected { from })
    }

    pub fn call_end(&self, origin: &ConnectionHandle, req: TargetRequest) -> RelayOutcome {
        self.forward("call-end", origin, req.target, |from| ServerEvent::CallEnded { from })
    }

    /// Shared path for the steps that fail silently.
    fn forward<F>(
        &self,
        step: &'static str,
        origin: &ConnectionHandle,
        target: Option<UserId>,
        build: F,
    ) -> RelayOutcome
    where
        F: FnOnce(UserId) -> ServerEvent,
    {
        let Some(from) = self.registry.user_of(origin.id) else {
            tracing::warn!(step, connection_id = %origin.id, "Dropping signal from unidentified connection");
            return RelayOutcome::Unidentified;
        };
        let Some(target) = target else {
            tracing::warn!(step, from = %from, "Dropping signal without recipient");
            return RelayOutcome::MissingTarget;
        };
        let Some(peer) = self.registry.resolve(&target) else {
            tracing::info!(step, from = %from, target = %target, "Dropping signal, target offline");
            return RelayOutcome::TargetUnreachable;
        };

        tracing::debug!(step, from = %from, target = %target, "Relaying signal");
        send_event(&peer, &build(from));
        RelayOutcome::Delivered
    }
}

fn reply_error(origin: &ConnectionHandle, message: &str) {
    send_event(
        origin,
        &ServerEvent::CallError {
            message: message.to_string(),
        },
    );
}
