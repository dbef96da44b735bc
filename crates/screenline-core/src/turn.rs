//! Turn-taking state machine.
//!
//! An explicit transition table: (phase, classification) → next phase
//! plus side effects. Entered only via classified caller speech, never
//! by elapsed time. Unit-testable without any live socket.

use crate::classify::Classification;
use crate::prompts;
use crate::session::Phase;

/// Result of evaluating one classified caller utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next_phase: Phase,
    /// Set `pending_hangup` on the session; the termination sequencer
    /// takes over after the closing audio finishes.
    pub hang_up: bool,
    /// Instruction for the next generation turn, if one should be issued.
    pub instructions: Option<&'static str>,
}

/// Evaluate the transition table in fixed priority order.
pub fn evaluate(phase: Phase, classification: Classification) -> Transition {
    // 1. Farewell wins in any phase.
    if classification == Classification::Farewell {
        return Transition {
            next_phase: Phase::Ending,
            hang_up: true,
            instructions: Some(prompts::FAREWELL_CLOSE),
        };
    }

    match (phase, classification) {
        // 2. Declined consent: close politely, never insist.
        (Phase::Consent, Classification::Decline) => Transition {
            next_phase: Phase::Ending,
            hang_up: true,
            instructions: Some(prompts::DECLINE_CLOSE),
        },
        // 3. Consent granted: start the interview with the fixed first question.
        (Phase::Consent, Classification::Accept) => Transition {
            next_phase: Phase::Interview,
            hang_up: false,
            instructions: Some(prompts::FIRST_QUESTION),
        },
        // 4. Unclear consent: re-ask the permission question verbatim.
        // (Farewell was handled above, so only Ambiguous reaches here.)
        (Phase::Consent, _) => Transition {
            next_phase: Phase::Consent,
            hang_up: false,
            instructions: Some(prompts::CONSENT_REASK),
        },
        // 5. Interview: the engine drives question sequencing; the
        // bridge only triggers each turn.
        (Phase::Interview, _) => Transition {
            next_phase: Phase::Interview,
            hang_up: false,
            instructions: Some(prompts::CONTINUE_INTERVIEW),
        },
        // Transcript arriving while already ending: no new turn.
        (Phase::Ending, _) => Transition {
            next_phase: Phase::Ending,
            hang_up: false,
            instructions: None,
        },
    }
}
