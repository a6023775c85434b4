//! End-to-end session flow tests: client frames in, protocol frames out,
//! with the degraded transcription source and a scripted generation backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use murmur_agent::ScriptedBackend;
use murmur_core::config::MurmurConfig;
use murmur_core::error::MurmurError;
use murmur_core::types::SessionId;
use murmur_session::{InboundFrame, SessionHandler, SessionManager};
use murmur_transcribe::{
    DegradedProvider, ProviderStream, StreamParams, TranscriptionProvider,
};

/// Provider that is never reachable, forcing the stream's degraded fallback.
struct UnreachableProvider;

#[async_trait]
impl TranscriptionProvider for UnreachableProvider {
    async fn connect(
        &self,
        _params: &StreamParams,
    ) -> Result<Box<dyn ProviderStream>, MurmurError> {
        Err(MurmurError::ProviderUnavailable("no credentials".into()))
    }
}

struct TestSession {
    manager: Arc<SessionManager>,
    session_id: SessionId,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    outbound: mpsc::UnboundedReceiver<String>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestSession {
    fn send_text(&self, text: &str) {
        self.inbound
            .send(InboundFrame::Text(text.to_string()))
            .unwrap();
    }

    fn send_binary(&self, bytes: Vec<u8>) {
        self.inbound.send(InboundFrame::Binary(bytes)).unwrap();
    }

    async fn next_frame(&mut self) -> Value {
        let frame = self.outbound.recv().await.expect("outbound channel closed");
        serde_json::from_str(&frame).expect("frame is not valid JSON")
    }

    /// Receive frames until one of the given type arrives.
    async fn next_frame_of_type(&mut self, frame_type: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == frame_type {
                return frame;
            }
        }
    }
}

fn spawn_session(
    provider: Arc<dyn TranscriptionProvider>,
    responses: Vec<&str>,
) -> TestSession {
    let manager = Arc::new(SessionManager::new());
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let session_id = manager.open(out_tx, None);

    let config = MurmurConfig::default();
    let backend = Arc::new(ScriptedBackend::new(
        responses.into_iter().map(String::from).collect(),
    ));

    let handler = SessionHandler::new(
        session_id,
        Arc::clone(&manager),
        &config,
        provider,
        backend,
        None,
    );

    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(handler.run(in_rx));

    TestSession {
        manager,
        session_id,
        inbound: in_tx,
        outbound: out_rx,
        handle,
    }
}

#[tokio::test(start_paused = true)]
async fn start_with_unreachable_provider_goes_degraded_and_listens() {
    let mut session = spawn_session(
        Arc::new(UnreachableProvider),
        vec!["Mention the standard onboarding timeline here."],
    );
    let mut events = session.manager.subscribe_events();

    let connected = session.next_frame().await;
    assert_eq!(connected["type"], "status");
    assert_eq!(connected["status"], "connected");
    assert_eq!(connected["session_id"], session.session_id.to_string());
    assert_eq!(connected["transcription_connected"], false);

    // Start while the upstream provider is unreachable: the session answers
    // "listening", not "transcription_unavailable".
    session.send_text(r#"{"type": "control", "control": "start"}"#);
    let status = session.next_frame().await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["status"], "listening");

    // Scripted transcripts arrive periodically on the degraded path.
    let transcript = session.next_frame_of_type("transcript").await;
    assert_eq!(transcript["is_final"], true);
    let trigger = transcript["text"].as_str().unwrap().to_string();
    assert!(!trigger.is_empty());

    // The scripted utterance drives a suggestion.
    let suggestion = session.next_frame_of_type("suggestion").await;
    assert_eq!(suggestion["question"], trigger.as_str());
    assert_eq!(suggestion["source"], "scripted");
    assert!(suggestion["confidence"].as_f64().unwrap() > 0.0);

    // A second transcript follows at the configured interval.
    let second = session.next_frame_of_type("transcript").await;
    assert_ne!(second["text"], transcript["text"]);

    // The degraded transition was published for observability.
    let mut saw_degraded = false;
    while let Ok(event) = events.try_recv() {
        if event.event_name() == "stream_degraded" {
            saw_degraded = true;
        }
    }
    assert!(saw_degraded);
}

#[tokio::test(start_paused = true)]
async fn suggestions_respect_cooldown_between_transcripts() {
    // Degraded interval (3s) is shorter than the agent cooldown (5s), so
    // consecutive transcripts cannot all produce suggestions.
    let mut session = spawn_session(
        Arc::new(DegradedProvider::new(Duration::from_secs(3))),
        vec!["Some concrete advice for the consultant."],
    );

    session.next_frame().await; // connected
    session.send_text(r#"{"type": "start"}"#);
    session.next_frame().await; // listening

    let mut transcript_times = Vec::new();
    let mut suggestion_count = 0;
    for _ in 0..8 {
        let frame = session.next_frame().await;
        match frame["type"].as_str().unwrap() {
            "transcript" => transcript_times.push(frame["text"].clone()),
            "suggestion" => suggestion_count += 1,
            other => panic!("unexpected frame type {}", other),
        }
        if transcript_times.len() == 5 {
            break;
        }
    }

    // Five transcripts at 3s spacing cover 12 seconds. With a 5s cooldown at
    // most three suggestions fit (t=3, t=9, t=15 -> only t=3 and t=9 here).
    assert!(suggestion_count >= 1);
    assert!(suggestion_count <= 3);
}

#[tokio::test(start_paused = true)]
async fn ping_answers_pong_and_status_reports_counters() {
    let mut session = spawn_session(
        Arc::new(DegradedProvider::new(Duration::from_secs(60))),
        vec![],
    );
    session.next_frame().await; // connected

    session.send_text(r#"{"type": "ping"}"#);
    let pong = session.next_frame().await;
    assert_eq!(pong["type"], "pong");

    // Audio before `start` is counted but not forwarded.
    session.send_binary(vec![0u8; 256]);
    session.send_text(r#"{"type": "audio_chunk", "data": [1, 2, 3]}"#);

    session.send_text(r#"{"type": "control", "control": "get_status"}"#);
    let status = session.next_frame().await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["status"], "active");
    assert_eq!(status["is_listening"], false);
    assert_eq!(status["transcription_connected"], false);
    assert_eq!(status["session"]["audio_chunks"], 2);
    assert!(status["session"]["messages"].as_u64().unwrap() >= 2);
}

#[tokio::test(start_paused = true)]
async fn invalid_frames_get_error_and_connection_survives() {
    let mut session = spawn_session(
        Arc::new(DegradedProvider::new(Duration::from_secs(60))),
        vec![],
    );
    session.next_frame().await; // connected

    session.send_text("this is not json");
    let error = session.next_frame().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "INVALID_JSON");

    session.send_text(r#"{"type": "telemetry", "payload": 1}"#);
    let error = session.next_frame().await;
    assert_eq!(error["type"], "error");

    session.send_text(r#"{"type": "control"}"#);
    let error = session.next_frame().await;
    assert_eq!(error["code"], "INVALID_CONTROL");

    // The connection stayed open throughout.
    session.send_text(r#"{"type": "ping"}"#);
    let pong = session.next_frame().await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test(start_paused = true)]
async fn stop_and_clear_context_respond_with_status() {
    let mut session = spawn_session(
        Arc::new(DegradedProvider::new(Duration::from_secs(3))),
        vec![],
    );
    session.next_frame().await; // connected

    session.send_text(r#"{"type": "control", "control": "start"}"#);
    let listening = session.next_frame().await;
    assert_eq!(listening["status"], "listening");

    session.send_text(r#"{"type": "control", "control": "stop"}"#);
    let stopped = session.next_frame_of_type("status").await;
    assert_eq!(stopped["status"], "stopped");

    session.send_text(r#"{"type": "control", "control": "clear_context"}"#);
    let cleared = session.next_frame_of_type("status").await;
    assert_eq!(cleared["status"], "context_cleared");

    // After stop, scripted transcripts are no longer forwarded.
    tokio::time::sleep(Duration::from_secs(10)).await;
    loop {
        match session.outbound.try_recv() {
            Ok(frame) => {
                let value: Value = serde_json::from_str(&frame).unwrap();
                assert_ne!(value["type"], "transcript");
            }
            Err(_) => break,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn speaker_filter_marks_self_and_suppresses_suggestions() {
    let mut session = spawn_session(
        Arc::new(DegradedProvider::new(Duration::from_secs(3))),
        vec!["Advice that must never be emitted for self speech."],
    );
    session.next_frame().await; // connected

    session.send_text(
        r#"{"type": "control", "control": "start", "params": {"speakerFilterEnabled": true}}"#,
    );
    session.next_frame().await; // listening

    // All scripted transcripts come from speaker 0, which becomes "self";
    // they are delivered with is_self and never trigger suggestions.
    for _ in 0..3 {
        let frame = session.next_frame().await;
        assert_eq!(frame["type"], "transcript");
        assert_eq!(frame["is_self"], true);
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_runs_teardown_to_completion() {
    let mut session = spawn_session(
        Arc::new(DegradedProvider::new(Duration::from_secs(3))),
        vec![],
    );
    let mut events = session.manager.subscribe_events();
    session.next_frame().await; // connected

    session.send_text(r#"{"type": "start"}"#);
    session.next_frame().await; // listening

    session.inbound.send(InboundFrame::Closed).unwrap();
    session.handle.await.unwrap();

    assert_eq!(session.manager.session_count(), 0);

    let mut saw_closed = false;
    while let Ok(event) = events.try_recv() {
        if event.event_name() == "session_closed" {
            saw_closed = true;
        }
    }
    assert!(saw_closed);

    // The manager dropped the transport; the channel drains then closes.
    while let Some(_frame) = session.outbound.recv().await {}
}

#[tokio::test(start_paused = true)]
async fn second_session_is_isolated_from_first() {
    let manager = Arc::new(SessionManager::new());
    let config = MurmurConfig::default();

    let (out_tx1, mut out_rx1) = mpsc::unbounded_channel();
    let id1 = manager.open(out_tx1, None);
    let (in_tx1, in_rx1) = mpsc::unbounded_channel();
    let handler1 = SessionHandler::new(
        id1,
        Arc::clone(&manager),
        &config,
        Arc::new(DegradedProvider::new(Duration::from_secs(3))),
        Arc::new(ScriptedBackend::new(vec![])),
        None,
    );
    let handle1 = tokio::spawn(handler1.run(in_rx1));

    let (out_tx2, mut out_rx2) = mpsc::unbounded_channel();
    let id2 = manager.open(out_tx2, None);
    let (in_tx2, in_rx2) = mpsc::unbounded_channel();
    let handler2 = SessionHandler::new(
        id2,
        Arc::clone(&manager),
        &config,
        Arc::new(DegradedProvider::new(Duration::from_secs(3))),
        Arc::new(ScriptedBackend::new(vec![])),
        None,
    );
    let _handle2 = tokio::spawn(handler2.run(in_rx2));

    assert_ne!(id1, id2);
    assert_eq!(manager.session_count(), 2);

    // Tearing down the first call leaves the second fully alive.
    in_tx1.send(InboundFrame::Closed).unwrap();
    handle1.await.unwrap();
    assert_eq!(manager.session_count(), 1);

    out_rx1.recv().await; // drain connected frame
    in_tx2.send(InboundFrame::Text(r#"{"type": "ping"}"#.to_string())).unwrap();
    loop {
        let frame = out_rx2.recv().await.unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        if value["type"] == "pong" {
            break;
        }
    }
}
