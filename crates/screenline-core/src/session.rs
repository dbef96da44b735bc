//! Per-call session state and the response scheduler.
//!
//! One `CallSession` exists per accepted call, owned exclusively by
//! the connection handler. Every mutation happens on the event
//! delivery path, in order, so no locking is needed.

use serde::{Deserialize, Serialize};

/// Conversational phase. Transitions are monotonic: consent →
/// interview → ending (interview may be skipped), never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Consent,
    Interview,
    Ending,
}

/// One generation request. `instructions: None` asks the engine for an
/// unconstrained continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub instructions: Option<String>,
}

impl TurnRequest {
    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        Self {
            instructions: Some(instructions.into()),
        }
    }

    pub fn unconstrained() -> Self {
        Self { instructions: None }
    }
}

/// State for one call, created on transport connect and destroyed on
/// transport close.
#[derive(Debug, Default)]
pub struct CallSession {
    /// Transport's media-stream identifier, required on every outbound frame.
    pub stream_sid: Option<String>,
    /// Transport's call identifier, used for call-control actions.
    pub call_sid: Option<String>,
    phase: Option<Phase>,
    greeted: bool,
    response_in_flight: bool,
    queued_request: Option<TurnRequest>,
    last_transcript_item: Option<String>,
    pub pending_hangup: bool,
    hangup_ack_sent: bool,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            phase: Some(Phase::Consent),
            ..Default::default()
        }
    }

    /// Latch the transport identifiers from the `start` frame.
    pub fn latch_start(&mut self, stream_sid: String, call_sid: String) {
        self.stream_sid = Some(stream_sid);
        self.call_sid = Some(call_sid);
    }

    pub fn phase(&self) -> Phase {
        self.phase.unwrap_or(Phase::Consent)
    }

    /// Advance the phase. Backward transitions are ignored and reported
    /// as `false`; the phase order is total (consent < interview < ending).
    pub fn advance_phase(&mut self, to: Phase) -> bool {
        if to >= self.phase() {
            self.phase = Some(to);
            true
        } else {
            false
        }
    }

    /// First-time guard for the opening consent turn. Returns `true`
    /// exactly once.
    pub fn mark_greeted(&mut self) -> bool {
        if self.greeted {
            return false;
        }
        self.greeted = true;
        true
    }

    /// Dedupe finalized transcripts by item id. Returns `true` if the
    /// item has not been processed before and records it.
    pub fn is_new_transcript(&mut self, item_id: &str) -> bool {
        if self.last_transcript_item.as_deref() == Some(item_id) {
            return false;
        }
        self.last_transcript_item = Some(item_id.to_string());
        true
    }

    // --- Response scheduler ---

    /// Ask for a generation turn. Returns the request to issue now, or
    /// `None` if one is already in flight — in which case the request
    /// is queued, replacing any previously queued one (depth 1,
    /// last-caller-wins).
    pub fn request_turn(&mut self, request: TurnRequest) -> Option<TurnRequest> {
        if self.response_in_flight {
            self.queued_request = Some(request);
            return None;
        }
        self.response_in_flight = true;
        Some(request)
    }

    /// The in-flight generation finished. Returns the queued request to
    /// issue immediately, if any (the in-flight flag stays set for it).
    pub fn on_response_completed(&mut self) -> Option<TurnRequest> {
        self.response_in_flight = false;
        let queued = self.queued_request.take()?;
        self.response_in_flight = true;
        Some(queued)
    }

    /// The engine reported an error for the in-flight generation.
    /// Treated like a completion so the queued request (if any) is
    /// dispatched and the call never wedges.
    pub fn on_engine_error(&mut self) -> Option<TurnRequest> {
        self.on_response_completed()
    }

    pub fn response_in_flight(&self) -> bool {
        self.response_in_flight
    }

    /// True while a request is queued behind the in-flight one.
    pub fn has_queued_request(&self) -> bool {
        self.queued_request.is_some()
    }

    /// One-shot guard for sending the termination mark. Transitions
    /// false → true exactly once.
    pub fn arm_hangup_ack(&mut self) -> bool {
        if self.hangup_ack_sent {
            return false;
        }
        self.hangup_ack_sent = true;
        true
    }
}
