//! Voice capture: input assistance that folds dictated text into the
//! compose buffer.
//!
//! The recognizer itself is an ambient capability that may not exist in
//! a given environment, so it sits behind a trait the capture adapter
//! drives; tests script it, production probes availability before
//! starting. Recognition errors never abort an in-progress turn.

use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum RecognizerEvent {
    /// A transcript fragment. Only fragments with `is_final` set are
    /// folded into the text buffer; interim fragments are discarded.
    Transcript { text: String, is_final: bool },
    Error(String),
    Ended,
}

#[derive(Debug)]
pub enum VoiceError {
    /// No speech-recognition capability in this environment. Surfaced
    /// as a one-line notice, never a transcript entry.
    Unavailable,
    Failed(String),
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::Unavailable => {
                write!(f, "Speech recognition is not available in this environment")
            }
            VoiceError::Failed(e) => write!(f, "Speech recognition failed: {e}"),
        }
    }
}

impl std::error::Error for VoiceError {}

/// The recognition backend: start a session and receive its events.
pub trait SpeechRecognizer: Send {
    fn is_available(&self) -> bool;
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, VoiceError>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
}

/// At most one recognition session per client; the accumulator is the
/// caller's text buffer, appended to via [`VoiceCapture::drain_into`].
pub struct VoiceCapture<R: SpeechRecognizer> {
    recognizer: R,
    state: CaptureState,
    events: Option<mpsc::UnboundedReceiver<RecognizerEvent>>,
}

impl<R: SpeechRecognizer> VoiceCapture<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            state: CaptureState::Idle,
            events: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    /// Begin a recognition session. Checks the capability first; when
    /// it is absent nothing starts and the caller shows the notice.
    /// Starting while already listening is a no-op.
    pub fn start(&mut self) -> Result<(), VoiceError> {
        if !self.recognizer.is_available() {
            return Err(VoiceError::Unavailable);
        }
        if self.state == CaptureState::Listening {
            return Ok(());
        }
        let events = self.recognizer.start()?;
        self.events = Some(events);
        self.state = CaptureState::Listening;
        Ok(())
    }

    /// End the session. Idempotent: stopping while idle has no effect.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Idle {
            return;
        }
        self.recognizer.stop();
        self.events = None;
        self.state = CaptureState::Idle;
    }

    /// Fold any pending final transcript fragments into `buffer`.
    /// Recognition errors drop the session and are logged, nothing
    /// more; dictation is input assistance, not part of the turn
    /// lifecycle.
    pub fn drain_into(&mut self, buffer: &mut String) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        loop {
            match events.try_recv() {
                Ok(RecognizerEvent::Transcript { text, is_final }) => {
                    if is_final {
                        buffer.push_str(&text);
                    }
                }
                Ok(RecognizerEvent::Error(e)) => {
                    tracing::warn!(error = %e, "speech recognition error");
                    self.stop();
                    return;
                }
                Ok(RecognizerEvent::Ended) => {
                    self.stop();
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => return,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.stop();
                    return;
                }
            }
        }
    }
}

/// Placeholder backend for environments without a recognizer; `start`
/// is unreachable because the availability probe always fails first.
#[derive(Default)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, VoiceError> {
        Err(VoiceError::Unavailable)
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted recognizer that replays a fixed event sequence.
    struct ScriptedRecognizer {
        script: Vec<RecognizerEvent>,
        stops: u32,
        // Held so the session channel stays open after the script is
        // replayed; dropping it would read as the session ending.
        tx: Option<mpsc::UnboundedSender<RecognizerEvent>>,
    }

    impl ScriptedRecognizer {
        fn new(script: Vec<RecognizerEvent>) -> Self {
            Self {
                script,
                stops: 0,
                tx: None,
            }
        }
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn is_available(&self) -> bool {
            true
        }

        fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecognizerEvent>, VoiceError> {
            let (tx, rx) = mpsc::unbounded_channel();
            for event in self.script.drain(..) {
                let _ = tx.send(event);
            }
            self.tx = Some(tx);
            Ok(rx)
        }

        fn stop(&mut self) {
            self.stops += 1;
        }
    }

    fn final_fragment(text: &str) -> RecognizerEvent {
        RecognizerEvent::Transcript {
            text: text.to_string(),
            is_final: true,
        }
    }

    #[test]
    fn final_fragments_append_to_the_buffer_verbatim() {
        let recognizer = ScriptedRecognizer::new(vec![
            final_fragment("客户一直"),
            RecognizerEvent::Transcript {
                text: "（临时）".to_string(),
                is_final: false,
            },
            final_fragment("不回复"),
        ]);
        let mut capture = VoiceCapture::new(recognizer);
        capture.start().unwrap();

        let mut buffer = String::new();
        capture.drain_into(&mut buffer);
        assert_eq!(buffer, "客户一直不回复");
        assert!(capture.is_listening());
    }

    #[test]
    fn stop_is_idempotent() {
        let recognizer = ScriptedRecognizer::new(vec![]);
        let mut capture = VoiceCapture::new(recognizer);
        capture.start().unwrap();
        capture.stop();
        assert!(!capture.is_listening());
        capture.stop();
        assert!(!capture.is_listening());
        // The backend saw exactly one stop.
        assert_eq!(capture.recognizer.stops, 1);
    }

    #[test]
    fn recognition_errors_return_to_idle_and_keep_the_buffer() {
        let recognizer = ScriptedRecognizer::new(vec![
            final_fragment("预算"),
            RecognizerEvent::Error("audio device lost".to_string()),
            final_fragment("不该到达"),
        ]);
        let mut capture = VoiceCapture::new(recognizer);
        capture.start().unwrap();

        let mut buffer = String::new();
        capture.drain_into(&mut buffer);
        assert_eq!(buffer, "预算");
        assert!(!capture.is_listening());
    }

    #[test]
    fn unavailable_capability_refuses_to_start() {
        let mut capture = VoiceCapture::new(UnavailableRecognizer);
        match capture.start() {
            Err(VoiceError::Unavailable) => {}
            other => panic!("expected unavailable error, got {other:?}"),
        }
        assert!(!capture.is_listening());
    }

    #[test]
    fn start_while_listening_is_a_no_op() {
        let recognizer = ScriptedRecognizer::new(vec![final_fragment("第一段")]);
        let mut capture = VoiceCapture::new(recognizer);
        capture.start().unwrap();
        capture.start().unwrap();

        let mut buffer = String::new();
        capture.drain_into(&mut buffer);
        assert_eq!(buffer, "第一段");
    }
}
