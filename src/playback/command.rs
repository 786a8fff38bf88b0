use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::backend::{SpeechBackend, SpeechError, SpeechSink};
use super::process::{run_to_end, ProcessSlot};

/// Speaks through a local speech engine such as `espeak-ng`, one process per utterance.
///
/// Pausing stops the engine; resuming speaks the text again from the start.
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    slot: ProcessSlot,
    last: Option<(String, SpeechSink)>,
    paused: bool,
}

impl CommandSpeech {
    /// `command` is the program followed by its arguments; the text is appended last.
    pub fn new(command: &[String]) -> Result<Self, SpeechError> {
        let (program, args) = command.split_first().ok_or(SpeechError::EmptyCommand)?;
        Ok(CommandSpeech {
            program: program.clone(),
            args: args.to_vec(),
            slot: ProcessSlot::default(),
            last: None,
            paused: false,
        })
    }

    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(text);
        command
    }
}

#[async_trait]
impl SpeechBackend for CommandSpeech {
    async fn speak(&mut self, text: &str, sink: SpeechSink) -> Result<(), SpeechError> {
        let command = self.command(text);
        let job_sink = sink.clone();
        self.slot
            .replace(move |token, speaking| run_to_end(command, job_sink, speaking, token))
            .await;
        self.last = Some((text.to_string(), sink));
        self.paused = false;
        Ok(())
    }

    fn cancel(&mut self) {
        self.slot.cancel();
        self.last = None;
        self.paused = false;
    }

    fn pause(&mut self) -> bool {
        if !self.slot.is_speaking() {
            return false;
        }
        self.slot.cancel();
        self.paused = true;
        true
    }

    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if let Some((text, sink)) = self.last.clone() {
            debug!(program = %self.program, "speaking again after pause");
            let command = self.command(&text);
            self.slot
                .spawn(move |token, speaking| run_to_end(command, sink, speaking, token));
        }
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_speaking()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::playback::backend::{SpeechEventKind, SpeechFailure};
    use crate::playback::PlayerEvent;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine(command: &[&str]) -> CommandSpeech {
        let command: Vec<String> = command.iter().map(|part| part.to_string()).collect();
        CommandSpeech::new(&command).unwrap()
    }

    async fn next_kind(rx: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> SpeechEventKind {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("speech event")
            .expect("channel open");
        match event {
            PlayerEvent::Speech(event) => event.kind,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(CommandSpeech::new(&[]), Err(SpeechError::EmptyCommand)));
    }

    #[tokio::test]
    async fn completed_process_reports_start_then_finish() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = engine(&["true"]);

        speech.speak("hello", SpeechSink::new(1, tx)).await.unwrap();

        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Started);
        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Finished);
    }

    #[tokio::test]
    async fn failing_process_reports_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = engine(&["false"]);

        speech.speak("hello", SpeechSink::new(1, tx)).await.unwrap();

        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Started);
        assert!(matches!(
            next_kind(&mut rx).await,
            SpeechEventKind::Failed(SpeechFailure::Error(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_reports_error_without_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = engine(&["/nonexistent/speech-engine"]);

        speech.speak("hello", SpeechSink::new(1, tx)).await.unwrap();

        assert!(matches!(
            next_kind(&mut rx).await,
            SpeechEventKind::Failed(SpeechFailure::Error(_))
        ));
    }

    #[tokio::test]
    async fn killed_process_counts_as_interruption() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // the text lands in $0 and is ignored
        let mut speech = engine(&["sh", "-c", "kill -TERM $$"]);

        speech.speak("hello", SpeechSink::new(1, tx)).await.unwrap();

        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Started);
        assert_eq!(
            next_kind(&mut rx).await,
            SpeechEventKind::Failed(SpeechFailure::Interrupted)
        );
    }

    #[tokio::test]
    async fn cancelled_process_reports_nothing_further() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = engine(&["sleep"]);

        speech.speak("30", SpeechSink::new(1, tx)).await.unwrap();
        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Started);
        assert!(speech.is_speaking());

        speech.cancel();
        // the next utterance waits for the old process to be gone
        speech.slot.teardown().await;

        assert!(!speech.is_speaking());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pause_stops_and_resume_speaks_again() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = engine(&["sleep"]);

        speech.speak("30", SpeechSink::new(4, tx)).await.unwrap();
        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Started);

        assert!(speech.pause());
        speech.resume();

        assert_eq!(next_kind(&mut rx).await, SpeechEventKind::Started);
        assert!(speech.is_speaking());
        speech.cancel();
    }

    #[tokio::test]
    async fn pause_without_audio_is_refused() {
        let mut speech = engine(&["true"]);
        assert!(!speech.pause());
    }
}
