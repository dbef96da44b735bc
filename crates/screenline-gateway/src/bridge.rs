//! Per-call bridge between the telephony stream and the speech engine.
//!
//! Owns the session state and applies every orchestration rule in one
//! place: greeting, transcript classification, turn scheduling,
//! barge-in, and the hangup sequencer. The bridge is purely reactive;
//! it holds no sockets, only a command handle toward the engine and a
//! frame sender toward the transport, so every path is testable with
//! plain channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use screenline_core::classify::classify;
use screenline_core::prompts;
use screenline_core::session::{CallSession, TurnRequest};
use screenline_core::turn;
use screenline_engine::{EngineEvent, EngineHandle};

use crate::call_control::CallControl;
use crate::transport::{self, TransportEvent};

pub struct CallBridge {
    session: CallSession,
    engine: EngineHandle,
    transport_tx: mpsc::UnboundedSender<String>,
    call_control: Arc<dyn CallControl>,
    /// Name of the mark appended after the closing audio; its echo
    /// confirms playback finished.
    hangup_mark: String,
    hangup_fallback: Duration,
    /// Cancels the fallback timer when the mark echo arrives first.
    fallback_guard: Option<CancellationToken>,
    /// Shared between the echo path and the timer task so termination
    /// fires exactly once whichever comes first.
    terminate_once: Arc<AtomicBool>,
}

impl CallBridge {
    pub fn new(
        engine: EngineHandle,
        transport_tx: mpsc::UnboundedSender<String>,
        call_control: Arc<dyn CallControl>,
        hangup_fallback: Duration,
    ) -> Self {
        Self {
            session: CallSession::new(),
            engine,
            transport_tx,
            call_control,
            hangup_mark: format!("hangup-{}", Uuid::new_v4()),
            hangup_fallback,
            fallback_guard: None,
            terminate_once: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn hangup_mark(&self) -> &str {
        &self.hangup_mark
    }

    fn send_frame(&self, frame: String) {
        // A closed channel means the connection task already exited.
        if self.transport_tx.send(frame).is_err() {
            debug!("Transport frame channel closed");
        }
    }

    /// Handle one inbound telephony frame. `Stop` is handled by the
    /// connection loop itself (it tears the whole call down).
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Start { start } => {
                info!(
                    stream_sid = %start.stream_sid,
                    call_sid = %start.call_sid,
                    "Media stream started"
                );
                self.session.latch_start(start.stream_sid, start.call_sid);
            }
            TransportEvent::Media { media } => {
                // Codecs match end to end, so the payload is forwarded
                // verbatim without re-encoding.
                self.engine.append_audio(media.payload);
            }
            TransportEvent::Mark { mark } => {
                if mark.name == self.hangup_mark {
                    debug!("Hangup mark echoed, closing audio fully played");
                    self.finalize_hangup();
                } else {
                    debug!(name = %mark.name, "Ignoring unrelated mark echo");
                }
            }
            TransportEvent::Stop => {}
        }
    }

    /// Handle one engine event. `Closed` is handled by the connection loop.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SessionReady => {
                if self.session.mark_greeted() {
                    self.issue_turn(TurnRequest::with_instructions(prompts::CONSENT_GREETING));
                }
            }
            EngineEvent::ResponseStarted => {
                debug!("Engine response started");
            }
            EngineEvent::ResponseCompleted => {
                if let Some(queued) = self.session.on_response_completed() {
                    self.engine.create_response(queued.instructions);
                }
            }
            EngineEvent::SpeechStarted => {
                // Barge-in: generation finishes far ahead of real-time
                // playback, so buffered audio may still be playing long
                // after the response completed. Cancel and clear
                // unconditionally; a spurious cancel only draws a
                // recoverable engine error.
                debug!("Caller barge-in, cancelling playback");
                self.engine.cancel_response();
                if let Some(sid) = self.session.stream_sid.as_deref() {
                    self.send_frame(transport::clear_frame(sid));
                }
            }
            EngineEvent::TranscriptCompleted {
                item_id,
                transcript,
            } => {
                if !self.session.is_new_transcript(&item_id) {
                    debug!(item_id = %item_id, "Duplicate transcript dropped");
                    return;
                }
                self.handle_transcript(&transcript);
            }
            EngineEvent::AudioDelta { payload } => {
                if let Some(sid) = self.session.stream_sid.as_deref() {
                    self.send_frame(transport::media_frame(sid, &payload));
                }
            }
            EngineEvent::AudioDone => {
                // The closing turn may still be queued behind an earlier
                // response; only its own audio-done arms the sequencer.
                if self.session.pending_hangup
                    && !self.session.has_queued_request()
                    && self.session.arm_hangup_ack()
                {
                    self.begin_hangup_sequence();
                }
            }
            EngineEvent::Error { message } => {
                warn!(%message, "Engine error");
                if let Some(queued) = self.session.on_engine_error() {
                    self.engine.create_response(queued.instructions);
                }
            }
            EngineEvent::Closed => {}
        }
    }

    fn handle_transcript(&mut self, transcript: &str) {
        let phase = self.session.phase();
        let classification = classify(transcript);
        let transition = turn::evaluate(phase, classification);
        info!(
            ?phase,
            ?classification,
            next = ?transition.next_phase,
            "Caller turn"
        );

        self.session.advance_phase(transition.next_phase);
        if transition.hang_up {
            self.session.pending_hangup = true;
        }
        if let Some(text) = transition.instructions {
            self.issue_turn(TurnRequest::with_instructions(text));
        }
    }

    fn issue_turn(&mut self, request: TurnRequest) {
        if let Some(request) = self.session.request_turn(request) {
            self.engine.create_response(request.instructions);
        }
    }

    /// The closing audio has fully left the engine. Append a mark so
    /// the transport tells us when the caller has actually heard it,
    /// and arm a fallback in case the echo never comes.
    fn begin_hangup_sequence(&mut self) {
        let Some(sid) = self.session.stream_sid.as_deref() else {
            warn!("Hangup requested before stream start; terminating directly");
            self.finalize_hangup();
            return;
        };
        self.send_frame(transport::mark_frame(sid, &self.hangup_mark));

        let guard = CancellationToken::new();
        self.fallback_guard = Some(guard.clone());

        let fired = self.terminate_once.clone();
        let call_control = self.call_control.clone();
        let call_sid = self.session.call_sid.clone();
        let delay = self.hangup_fallback;
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !fired.swap(true, Ordering::SeqCst) {
                        warn!("Hangup mark echo timed out, terminating anyway");
                        if let Some(sid) = call_sid {
                            call_control.terminate(&sid).await;
                        }
                    }
                }
            }
        });
    }

    fn finalize_hangup(&mut self) {
        if let Some(guard) = self.fallback_guard.take() {
            guard.cancel();
        }
        if self.terminate_once.swap(true, Ordering::SeqCst) {
            return;
        }
        let call_control = self.call_control.clone();
        let call_sid = self.session.call_sid.clone();
        tokio::spawn(async move {
            if let Some(sid) = call_sid {
                call_control.terminate(&sid).await;
            }
        });
    }

    /// Release everything the bridge holds: stop the fallback timer
    /// and ask the engine task to shut down.
    pub fn teardown(&mut self) {
        if let Some(guard) = self.fallback_guard.take() {
            guard.cancel();
        }
        self.engine.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use screenline_core::session::Phase;
    use screenline_engine::EngineCommand;

    use crate::transport::{MarkMeta, MediaMeta, StartMeta};

    struct MockCallControl {
        terminations: AtomicUsize,
    }

    impl MockCallControl {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                terminations: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.terminations.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CallControl for MockCallControl {
        async fn terminate(&self, _call_sid: &str) {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        bridge: CallBridge,
        engine_rx: mpsc::UnboundedReceiver<EngineCommand>,
        transport_rx: mpsc::UnboundedReceiver<String>,
        call_control: Arc<MockCallControl>,
    }

    fn harness_with_fallback(fallback: Duration) -> Harness {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let call_control = MockCallControl::new();
        let bridge = CallBridge::new(
            EngineHandle::from_sender(engine_tx),
            transport_tx,
            call_control.clone(),
            fallback,
        );
        Harness {
            bridge,
            engine_rx,
            transport_rx,
            call_control,
        }
    }

    fn harness() -> Harness {
        harness_with_fallback(Duration::from_secs(6))
    }

    fn start_event() -> TransportEvent {
        TransportEvent::Start {
            start: StartMeta {
                stream_sid: "MZtest".into(),
                call_sid: "CAtest".into(),
            },
        }
    }

    fn transcript(item_id: &str, text: &str) -> EngineEvent {
        EngineEvent::TranscriptCompleted {
            item_id: item_id.into(),
            transcript: text.into(),
        }
    }

    fn expect_create(h: &mut Harness) -> Option<String> {
        match h.engine_rx.try_recv() {
            Ok(EngineCommand::CreateResponse { instructions }) => instructions,
            other => panic!("expected CreateResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_greeting_sent_once_on_session_ready() {
        let mut h = harness();
        h.bridge.handle_engine_event(EngineEvent::SessionReady);
        h.bridge.handle_engine_event(EngineEvent::SessionReady);

        let instructions = expect_create(&mut h);
        assert_eq!(instructions.as_deref(), Some(prompts::CONSENT_GREETING));
        assert!(h.engine_rx.try_recv().is_err(), "greeting must be sent once");
    }

    #[tokio::test]
    async fn test_caller_audio_forwarded_verbatim() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_transport_event(TransportEvent::Media {
            media: MediaMeta {
                payload: "AAEC".into(),
            },
        });

        assert_eq!(
            h.engine_rx.try_recv(),
            Ok(EngineCommand::AppendAudio("AAEC".into()))
        );
    }

    #[tokio::test]
    async fn test_engine_audio_framed_for_transport() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(EngineEvent::AudioDelta {
            payload: "//8A".into(),
        });

        let frame: serde_json::Value =
            serde_json::from_str(&h.transport_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "media");
        assert_eq!(frame["streamSid"], "MZtest");
        assert_eq!(frame["media"]["payload"], "//8A");
    }

    #[tokio::test]
    async fn test_consent_accepted_starts_interview() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));

        assert_eq!(h.bridge.session().phase(), Phase::Interview);
        assert!(!h.bridge.session().pending_hangup);
        let instructions = expect_create(&mut h);
        assert_eq!(instructions.as_deref(), Some(prompts::FIRST_QUESTION));
    }

    #[tokio::test]
    async fn test_consent_declined_schedules_hangup() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge
            .handle_engine_event(transcript("item_1", "ahora no puedo"));

        assert_eq!(h.bridge.session().phase(), Phase::Ending);
        assert!(h.bridge.session().pending_hangup);
        let instructions = expect_create(&mut h);
        assert_eq!(instructions.as_deref(), Some(prompts::DECLINE_CLOSE));
    }

    #[tokio::test]
    async fn test_farewell_mid_interview_schedules_hangup() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        h.bridge.handle_engine_event(EngineEvent::ResponseCompleted);
        h.bridge.handle_engine_event(transcript("item_2", "chau"));

        assert_eq!(h.bridge.session().phase(), Phase::Ending);
        assert!(h.bridge.session().pending_hangup);
    }

    #[tokio::test]
    async fn test_barge_in_cancels_and_clears() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);

        h.bridge.handle_engine_event(EngineEvent::SpeechStarted);

        assert_eq!(h.engine_rx.try_recv(), Ok(EngineCommand::CancelResponse));
        let frame: serde_json::Value =
            serde_json::from_str(&h.transport_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "clear");
        assert_eq!(frame["streamSid"], "MZtest");
    }

    #[tokio::test]
    async fn test_barge_in_after_completion_still_clears_playback() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);
        h.bridge.handle_engine_event(EngineEvent::AudioDelta {
            payload: "//8A".into(),
        });
        h.transport_rx.try_recv().unwrap();

        // Generation is done, but the transport is still playing the
        // buffered audio when the caller starts speaking.
        h.bridge.handle_engine_event(EngineEvent::ResponseCompleted);
        h.bridge.handle_engine_event(EngineEvent::SpeechStarted);

        assert_eq!(h.engine_rx.try_recv(), Ok(EngineCommand::CancelResponse));
        let frame: serde_json::Value =
            serde_json::from_str(&h.transport_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "clear");
        assert_eq!(frame["streamSid"], "MZtest");
    }

    #[tokio::test]
    async fn test_second_turn_queued_until_completion() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);

        // Transcript lands while the first response is still in flight.
        h.bridge
            .handle_engine_event(transcript("item_2", "tengo tiempo, contame"));
        assert!(
            h.engine_rx.try_recv().is_err(),
            "second turn must wait for completion"
        );

        h.bridge.handle_engine_event(EngineEvent::ResponseCompleted);
        let instructions = expect_create(&mut h);
        assert_eq!(instructions.as_deref(), Some(prompts::CONTINUE_INTERVIEW));
    }

    #[tokio::test]
    async fn test_engine_error_dispatches_queued_turn() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);
        h.bridge.handle_engine_event(transcript("item_2", "bueno"));

        h.bridge.handle_engine_event(EngineEvent::Error {
            message: "server hiccup".into(),
        });
        let instructions = expect_create(&mut h);
        assert_eq!(instructions.as_deref(), Some(prompts::CONTINUE_INTERVIEW));
    }

    #[tokio::test]
    async fn test_duplicate_transcript_dropped() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);

        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        assert!(h.engine_rx.try_recv().is_err());

        // Completing the first response must not dispatch anything the
        // duplicate could have queued.
        h.bridge.handle_engine_event(EngineEvent::ResponseCompleted);
        assert!(h.engine_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hangup_mark_sent_once_after_closing_audio() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "chau"));
        expect_create(&mut h);

        h.bridge.handle_engine_event(EngineEvent::AudioDone);
        let frame: serde_json::Value =
            serde_json::from_str(&h.transport_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "mark");
        assert_eq!(frame["mark"]["name"], h.bridge.hangup_mark());

        // A second audio-done must not re-arm the sequencer.
        h.bridge.handle_engine_event(EngineEvent::AudioDone);
        assert!(h.transport_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_farewell_while_in_flight_waits_for_closing_audio() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);

        // Farewell lands while the first response is still in flight:
        // the closing turn is queued, not yet dispatched.
        h.bridge.handle_engine_event(transcript("item_2", "chau"));
        assert!(h.bridge.session().pending_hangup);
        assert!(h.engine_rx.try_recv().is_err());

        // The previous response's audio finishing must not send the mark.
        h.bridge.handle_engine_event(EngineEvent::AudioDone);
        assert!(
            h.transport_rx.try_recv().is_err(),
            "mark must wait for the closing turn's audio"
        );

        // Completion dispatches the closing turn; its audio-done arms
        // the sequencer.
        h.bridge.handle_engine_event(EngineEvent::ResponseCompleted);
        let instructions = expect_create(&mut h);
        assert_eq!(instructions.as_deref(), Some(prompts::FAREWELL_CLOSE));

        h.bridge.handle_engine_event(EngineEvent::AudioDone);
        let frame: serde_json::Value =
            serde_json::from_str(&h.transport_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "mark");
        assert_eq!(frame["mark"]["name"], h.bridge.hangup_mark());
    }

    #[tokio::test]
    async fn test_audio_done_without_pending_hangup_does_nothing() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "dale"));
        expect_create(&mut h);

        h.bridge.handle_engine_event(EngineEvent::AudioDone);
        assert!(h.transport_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mark_echo_terminates_exactly_once() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "chau"));
        expect_create(&mut h);
        h.bridge.handle_engine_event(EngineEvent::AudioDone);

        let mark = h.bridge.hangup_mark().to_string();
        h.bridge.handle_transport_event(TransportEvent::Mark {
            mark: MarkMeta { name: mark.clone() },
        });
        // Duplicate echo must not terminate twice.
        h.bridge.handle_transport_event(TransportEvent::Mark {
            mark: MarkMeta { name: mark },
        });

        tokio::task::yield_now().await;
        assert_eq!(h.call_control.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_timer_terminates_without_echo() {
        let mut h = harness_with_fallback(Duration::from_millis(50));
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "chau"));
        expect_create(&mut h);
        h.bridge.handle_engine_event(EngineEvent::AudioDone);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(h.call_control.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_cancels_fallback_timer() {
        let mut h = harness_with_fallback(Duration::from_millis(50));
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "chau"));
        expect_create(&mut h);
        h.bridge.handle_engine_event(EngineEvent::AudioDone);

        let mark = h.bridge.hangup_mark().to_string();
        h.bridge
            .handle_transport_event(TransportEvent::Mark {
                mark: MarkMeta { name: mark },
            });
        tokio::task::yield_now().await;

        // Let the fallback window pass; the timer must stay silent.
        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(h.call_control.count(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_mark_echo_ignored() {
        let mut h = harness();
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_transport_event(TransportEvent::Mark {
            mark: MarkMeta {
                name: "someone-elses-mark".into(),
            },
        });

        tokio::task::yield_now().await;
        assert_eq!(h.call_control.count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_closes_engine_and_stops_timer() {
        let mut h = harness_with_fallback(Duration::from_millis(10));
        h.bridge.handle_transport_event(start_event());
        h.bridge.handle_engine_event(transcript("item_1", "chau"));
        expect_create(&mut h);
        h.bridge.handle_engine_event(EngineEvent::AudioDone);

        h.bridge.teardown();
        assert_eq!(h.engine_rx.try_recv(), Ok(EngineCommand::Close));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            h.call_control.count(),
            0,
            "teardown must cancel the fallback timer"
        );
    }
}
