use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::hub::Hub;
use crate::session::Session;

/// Addressing shared by every signaling message
#[derive(Debug, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub target_open_id: String,
    #[serde(default)]
    pub call_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallInvite {
    #[serde(flatten)]
    pub route: Route,
    #[serde(default)]
    pub call_type: String,
    #[serde(default)]
    pub caller_info: Value,
}

#[derive(Debug, Deserialize)]
pub struct CallAnswer {
    #[serde(flatten)]
    pub route: Route,
    #[serde(default)]
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct CallEnd {
    #[serde(flatten)]
    pub route: Route,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionDescription {
    #[serde(flatten)]
    pub route: Route,
    #[serde(default)]
    pub sdp: Value,
}

#[derive(Debug, Deserialize)]
pub struct IceCandidate {
    #[serde(flatten)]
    pub route: Route,
    #[serde(default)]
    pub candidate: Value,
}

/// Point-to-point call setup messages a client may send over its session
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Signal {
    CallInvite(CallInvite),
    CallAnswer(CallAnswer),
    CallEnd(CallEnd),
    WebrtcOffer(SessionDescription),
    WebrtcAnswer(SessionDescription),
    IceCandidate(IceCandidate),
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::CallInvite(_) => "call_invite",
            Signal::CallAnswer(_) => "call_answer",
            Signal::CallEnd(_) => "call_end",
            Signal::WebrtcOffer(_) => "webrtc_offer",
            Signal::WebrtcAnswer(_) => "webrtc_answer",
            Signal::IceCandidate(_) => "ice_candidate",
        }
    }

    pub fn route(&self) -> &Route {
        match self {
            Signal::CallInvite(m) => &m.route,
            Signal::CallAnswer(m) => &m.route,
            Signal::CallEnd(m) => &m.route,
            Signal::WebrtcOffer(m) | Signal::WebrtcAnswer(m) => &m.route,
            Signal::IceCandidate(m) => &m.route,
        }
    }

    /// Payload delivered to the target, stamped with the sender's identity
    fn forward_from(&self, sender: &Session) -> Value {
        let mut data = json!({
            "call_id": self.route().call_id,
            "from_user_id": sender.user_id(),
            "from_open_id": sender.open_id().unwrap_or_default(),
        });
        let extra = match self {
            Signal::CallInvite(m) => json!({ "call_type": m.call_type, "caller_info": m.caller_info }),
            Signal::CallAnswer(m) => json!({ "accept": m.accept }),
            Signal::CallEnd(m) => json!({ "reason": m.reason }),
            Signal::WebrtcOffer(m) | Signal::WebrtcAnswer(m) => json!({ "sdp": m.sdp }),
            Signal::IceCandidate(m) => json!({ "candidate": m.candidate }),
        };
        if let (Some(data), Value::Object(extra)) = (data.as_object_mut(), extra) {
            data.extend(extra);
        }
        data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Forwarded,
    /// Valid signal but the addressee has no live session
    TargetOffline,
    /// Not a signaling message, or missing its target
    Ignored,
}

impl Hub {
    /// Relay one inbound frame from `sender` if it is a signaling message
    pub fn relay_signal(&self, sender: &Session, raw: &str) -> RelayOutcome {
        let signal: Signal = match serde_json::from_str(raw) {
            Ok(signal) => signal,
            Err(e) => {
                debug!(user_id = %sender.user_id(), "Ignoring inbound frame: {}", e);
                return RelayOutcome::Ignored;
            }
        };

        let target = signal.route().target_open_id.as_str();
        if target.is_empty() {
            warn!(user_id = %sender.user_id(), kind = signal.kind(), "Signaling message missing target_open_id");
            return RelayOutcome::Ignored;
        }

        info!(
            kind = signal.kind(),
            from = sender.open_id().unwrap_or_default(),
            to = target,
            call_id = %signal.route().call_id,
            "Forwarding call signaling"
        );

        let event = Event {
            kind: signal.kind().to_string(),
            data: signal.forward_from(sender),
        };
        if self.send_to_open_id(target, &event) {
            RelayOutcome::Forwarded
        } else {
            RelayOutcome::TargetOffline
        }
    }
}
