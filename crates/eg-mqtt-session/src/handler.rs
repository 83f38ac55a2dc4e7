//! Event classification for the MQTT v5 event loop.
//!
//! Turns raw rumqttc events into a small set of typed routes so the
//! session driver can update state, resolve pending operations and deliver
//! inbound messages without matching on packet internals.

use bytes::Bytes;
use rumqttc::Outgoing;
use rumqttc::v5::{ConnectionError, Event, StateError};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{
    ConnectReturnCode, Packet, PubAckReason, PubCompReason, PubRecReason, Publish,
    SubscribeReasonCode,
};

/// Which client request an outgoing packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Subscribe,
    Publish,
}

/// Which broker acknowledgement was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    SubAck,
    PubAck,
    PubRec,
    PubComp,
}

/// Progress of a subscribe or publish, matched by packet id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckEvent {
    /// Request written to the network. QoS 0 publishes use packet id 0.
    Sent { kind: RequestKind, pkid: u16 },
    /// Broker answered. `Err` carries the failing reason code(s).
    Acked {
        kind: AckKind,
        pkid: u16,
        outcome: Result<(), String>,
    },
    /// Broker answered with a failure reason that the event loop turned
    /// into an error, so the packet id is not known.
    Rejected { kind: AckKind, reason: String },
}

/// A PUBLISH received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl InboundMessage {
    /// Payload parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }

    /// Payload as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl From<&Publish> for InboundMessage {
    fn from(publish: &Publish) -> Self {
        Self {
            topic: String::from_utf8_lossy(&publish.topic).into_owned(),
            payload: publish.payload.clone(),
            qos: publish.qos,
            retain: publish.retain,
        }
    }
}

/// A classified event-loop event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// CONNACK. `Err` carries the non-zero reason code.
    ConnAck(Result<(), String>),
    /// Subscribe/publish progress.
    Ack(AckEvent),
    /// Application message.
    Message(InboundMessage),
    /// Broker-initiated DISCONNECT with its reason code.
    Disconnected(String),
    /// Pings, our own acks to the broker and other bookkeeping.
    Other,
}

/// Classify one event-loop event.
pub fn route(event: &Event) -> Route {
    match event {
        Event::Incoming(packet) => route_incoming(packet),
        Event::Outgoing(Outgoing::Subscribe(pkid)) => Route::Ack(AckEvent::Sent {
            kind: RequestKind::Subscribe,
            pkid: *pkid,
        }),
        Event::Outgoing(Outgoing::Publish(pkid)) => Route::Ack(AckEvent::Sent {
            kind: RequestKind::Publish,
            pkid: *pkid,
        }),
        Event::Outgoing(_) => Route::Other,
    }
}

fn route_incoming(packet: &Packet) -> Route {
    match packet {
        Packet::ConnAck(connack) => {
            if connack.code == ConnectReturnCode::Success {
                Route::ConnAck(Ok(()))
            } else {
                Route::ConnAck(Err(format!("{:?}", connack.code)))
            }
        }
        Packet::SubAck(suback) => {
            let failures: Vec<String> = suback
                .return_codes
                .iter()
                .filter(|code| !matches!(code, SubscribeReasonCode::Success(_)))
                .map(|code| format!("{code:?}"))
                .collect();
            let outcome = if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.join(", "))
            };
            Route::Ack(AckEvent::Acked {
                kind: AckKind::SubAck,
                pkid: suback.pkid,
                outcome,
            })
        }
        Packet::PubAck(puback) => {
            let accepted = matches!(
                puback.reason,
                PubAckReason::Success | PubAckReason::NoMatchingSubscribers
            );
            Route::Ack(AckEvent::Acked {
                kind: AckKind::PubAck,
                pkid: puback.pkid,
                outcome: outcome(accepted, &puback.reason),
            })
        }
        Packet::PubRec(pubrec) => {
            let accepted = matches!(
                pubrec.reason,
                PubRecReason::Success | PubRecReason::NoMatchingSubscribers
            );
            Route::Ack(AckEvent::Acked {
                kind: AckKind::PubRec,
                pkid: pubrec.pkid,
                outcome: outcome(accepted, &pubrec.reason),
            })
        }
        Packet::PubComp(pubcomp) => {
            let accepted = matches!(pubcomp.reason, PubCompReason::Success);
            Route::Ack(AckEvent::Acked {
                kind: AckKind::PubComp,
                pkid: pubcomp.pkid,
                outcome: outcome(accepted, &pubcomp.reason),
            })
        }
        Packet::Publish(publish) => Route::Message(InboundMessage::from(publish)),
        Packet::Disconnect(disconnect) => {
            Route::Disconnected(format!("{:?}", disconnect.reason_code))
        }
        _ => Route::Other,
    }
}

/// Acknowledgement failure carried by an event-loop error, if any.
///
/// rumqttc reports failing SUBACK, PUBACK, PUBREC and PUBCOMP reason codes
/// as errors and drops the link. Polling again reconnects.
pub fn ack_failure(error: &ConnectionError) -> Option<AckEvent> {
    let ConnectionError::MqttState(state) = error else {
        return None;
    };
    let (kind, reason) = match state {
        StateError::SubFail { reason } => (AckKind::SubAck, format!("{reason:?}")),
        StateError::PubAckFail { reason } => (AckKind::PubAck, format!("{reason:?}")),
        StateError::PubRecFail { reason } => (AckKind::PubRec, format!("{reason:?}")),
        StateError::PubCompFail { reason } => (AckKind::PubComp, format!("{reason:?}")),
        _ => return None,
    };
    Some(AckEvent::Rejected { kind, reason })
}

fn outcome(accepted: bool, reason: &impl std::fmt::Debug) -> Result<(), String> {
    if accepted {
        Ok(())
    } else {
        Err(format!("{reason:?}"))
    }
}
