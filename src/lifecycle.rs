//! The request lifecycle state machine.
//!
//! Each user moves through `Idle → AwaitingSelection → Answering → Idle`.
//! "Awaiting selection" is represented by a pending question in the
//! [`SessionStore`]; there is no separate state table. Error paths loop
//! back to awaiting-selection with an annotation instead of resetting, so
//! a user can retry with a different provider without resending the photo.
//!
//! Everything that can go wrong per event is converted to a user-visible
//! message here. Nothing in this module should ever crash the process.

use std::sync::Arc;

use async_trait::async_trait;

use crate::drivers::Dispatcher;
use crate::errors::AnswerError;
use crate::extract::Extractor;
use crate::prelude::*;
use crate::registry::{ProviderDescriptor, Registry};
use crate::session::{SessionStore, UserId};

/// Callback tokens for provider buttons are `solve_<provider id>`.
pub const SELECTION_PREFIX: &str = "solve_";

/// How much of the question to echo back in the selection prompt.
const PREVIEW_CHARS: usize = 150;

/// A transport handle to a previously sent message, for later edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageRef(pub i64);

/// One inline button: a label and the callback token it sends back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

/// Outbound side of the chat transport. The controller only ever talks to
/// this trait; the Telegram client implements it.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, user: UserId, text: &str) -> Result<()>;

    /// Send a message with a selection keyboard attached.
    async fn send_selection_prompt(
        &self,
        user: UserId,
        text: &str,
        buttons: &[Button],
    ) -> Result<()>;

    /// Edit a previously sent message, optionally replacing its keyboard.
    async fn edit_message(
        &self,
        user: UserId,
        message: MessageRef,
        text: &str,
        buttons: Option<&[Button]>,
    ) -> Result<()>;
}

/// Orchestrates the image → OCR → selection → answer flow.
pub struct Controller {
    registry: Registry,
    sessions: Arc<SessionStore>,
    dispatcher: Dispatcher,
    extractor: Extractor,
}

impl Controller {
    pub fn new(
        registry: Registry,
        sessions: Arc<SessionStore>,
        dispatcher: Dispatcher,
        extractor: Extractor,
    ) -> Self {
        Self {
            registry,
            sessions,
            dispatcher,
            extractor,
        }
    }

    /// Handle an inbound photo.
    ///
    /// On success this stores the extracted question (overwriting any
    /// unresolved one, last image wins) and presents the provider menu. On
    /// an empty extraction the user stays idle and gets retry guidance.
    #[instrument(level = "debug", skip_all, fields(user = %user))]
    pub async fn handle_image(
        &self,
        user: UserId,
        image_bytes: Vec<u8>,
        out: &dyn Outbound,
    ) -> Result<()> {
        out.send_text(user, "🔍 Extracting text from image...").await?;

        let question = match self.extractor.extract(image_bytes).await {
            Ok(question) => question,
            Err(err) => {
                info!(user = %user, stage = "extract", "no text extracted: {err}");
                out.send_text(
                    user,
                    "❌ Couldn't extract any text from the image.\n\n\
                     💡 Tips:\n\
                     - Use a clear, well-lit photo\n\
                     - Make sure text is readable\n\
                     - Avoid shadows or glare",
                )
                .await?;
                return Ok(());
            }
        };

        self.sessions.put(user, question.clone());
        out.send_text(
            user,
            "✅ Text extracted successfully!\n\nNow choose an AI model to solve your question:",
        )
        .await?;
        let prompt = format!(
            "🤖 Choose an AI model to solve your question:\n\n📝 Question preview:\n{}",
            preview(&question)
        );
        out.send_selection_prompt(user, &prompt, &self.provider_buttons())
            .await?;
        Ok(())
    }

    /// Handle a provider selection.
    ///
    /// Consumes the pending question, dispatches it, and either delivers
    /// the answer or restores the question so the user can retry with a
    /// different provider.
    #[instrument(level = "debug", skip_all, fields(user = %user, provider = %provider_id))]
    pub async fn handle_selection(
        &self,
        user: UserId,
        provider_id: &str,
        message: MessageRef,
        out: &dyn Outbound,
    ) -> Result<()> {
        let Some(descriptor) = self.registry.get(provider_id) else {
            // A stale button from before a restart with different config.
            // Treated like a provider failure, but there was no dispatch,
            // so there is nothing to restore.
            warn!(user = %user, stage = "select", "{}", AnswerError::UnknownProvider(provider_id.to_owned()));
            out.edit_message(
                user,
                message,
                "❌ That model is no longer available.\n\nTry a different model:",
                Some(&self.provider_buttons()),
            )
            .await?;
            return Ok(());
        };

        let Some(question) = self.sessions.take(user) else {
            info!(user = %user, stage = "select", "{}", AnswerError::SessionDesync);
            out.edit_message(
                user,
                message,
                "❌ Error: No question found. Please send a new photo.",
                None,
            )
            .await?;
            return Ok(());
        };

        out.edit_message(
            user,
            message,
            &format!(
                "🤖 Processing with {}...\n\nPlease wait...",
                descriptor.display_name
            ),
            None,
        )
        .await?;

        match self.dispatcher.answer(descriptor, &question).await {
            Ok(answer) => {
                // Session already consumed by `take`; back to idle.
                out.send_text(
                    user,
                    &format!("✅ Answer from {}:\n\n{}", descriptor.display_name, answer),
                )
                .await?;
                out.edit_message(
                    user,
                    message,
                    &format!("✅ Answer provided using {}!", descriptor.display_name),
                    None,
                )
                .await?;
            }
            Err(err) => {
                error!(user = %user, stage = "dispatch", "provider call failed: {err:#}");
                // `take` consumed the question, so put the identical text
                // back to allow a retry with a different provider.
                self.sessions.put(user, question);
                out.edit_message(
                    user,
                    message,
                    &format!(
                        "❌ Error with {}: {}\n\nTry a different model:",
                        descriptor.display_name, err
                    ),
                    Some(&self.provider_buttons()),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Buttons for every provider whose credential was configured.
    fn provider_buttons(&self) -> Vec<Button> {
        self.registry
            .list_available()
            .map(button_for_provider)
            .collect()
    }
}

fn button_for_provider(descriptor: &ProviderDescriptor) -> Button {
    Button {
        label: format!("{} {}", descriptor.display_name, descriptor.cost.badge()),
        token: format!("{SELECTION_PREFIX}{}", descriptor.id),
    }
}

/// Truncate the question preview on a char boundary.
fn preview(question: &str) -> String {
    if question.chars().count() <= PREVIEW_CHARS {
        question.to_owned()
    } else {
        let clipped: String = question.chars().take(PREVIEW_CHARS).collect();
        format!("{clipped}...")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use crate::config::Credentials;
    use crate::drivers::testing::{ScriptedGenerator, StuckGenerator};
    use crate::drivers::{DispatchOpts, Generator};
    use crate::errors::ProviderFailure;
    use crate::extract::testing::ScriptedOcr;

    use super::*;

    /// What the recording transport saw.
    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Sent {
        Text(String),
        Prompt { text: String, tokens: Vec<String> },
        Edit { text: String, tokens: Option<Vec<String>> },
    }

    #[derive(Debug, Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingOutbound {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().expect("lock poisoned").clone()
        }

        fn last(&self) -> Sent {
            self.sent().last().expect("no messages sent").clone()
        }

        fn push(&self, event: Sent) {
            self.sent.lock().expect("lock poisoned").push(event);
        }
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send_text(&self, _user: UserId, text: &str) -> Result<()> {
            self.push(Sent::Text(text.to_owned()));
            Ok(())
        }

        async fn send_selection_prompt(
            &self,
            _user: UserId,
            text: &str,
            buttons: &[Button],
        ) -> Result<()> {
            self.push(Sent::Prompt {
                text: text.to_owned(),
                tokens: buttons.iter().map(|b| b.token.clone()).collect(),
            });
            Ok(())
        }

        async fn edit_message(
            &self,
            _user: UserId,
            _message: MessageRef,
            text: &str,
            buttons: Option<&[Button]>,
        ) -> Result<()> {
            self.push(Sent::Edit {
                text: text.to_owned(),
                tokens: buttons.map(|bs| bs.iter().map(|b| b.token.clone()).collect()),
            });
            Ok(())
        }
    }

    fn all_credentials() -> Credentials {
        Credentials {
            telegram_token: Some("123:abc".to_owned()),
            openai_api_key: Some("sk-test".to_owned()),
            groq_api_key: Some("gsk-test".to_owned()),
            gemini_api_key: Some("AIza-test".to_owned()),
        }
    }

    struct Fixture {
        controller: Controller,
        sessions: Arc<SessionStore>,
        groq: Arc<ScriptedGenerator>,
        gemini: Arc<ScriptedGenerator>,
        out: RecordingOutbound,
    }

    /// Build a controller with scripted OCR and scripted Groq/Gemini
    /// backends; OpenAI is a stuck backend nothing should call.
    fn fixture(
        ocr_replies: Vec<Result<String>>,
        groq_replies: Vec<Result<String, ProviderFailure>>,
        gemini_replies: Vec<Result<String, ProviderFailure>>,
    ) -> Fixture {
        let sessions = Arc::new(SessionStore::new());
        let groq = Arc::new(ScriptedGenerator::new(groq_replies));
        let gemini = Arc::new(ScriptedGenerator::new(gemini_replies));
        let dispatcher = Dispatcher::with_generators(
            Some(Arc::new(StuckGenerator::default()) as Arc<dyn Generator>),
            Some(groq.clone() as Arc<dyn Generator>),
            Some(gemini.clone() as Arc<dyn Generator>),
            DispatchOpts::default(),
        );
        let controller = Controller::new(
            Registry::new(&all_credentials()),
            sessions.clone(),
            dispatcher,
            Extractor::new(Arc::new(ScriptedOcr::new(ocr_replies))),
        );
        Fixture {
            controller,
            sessions,
            groq,
            gemini,
            out: RecordingOutbound::default(),
        }
    }

    fn png_bytes() -> Vec<u8> {
        crate::extract::preprocess::tests::synthetic_image_bytes()
    }

    const USER: UserId = UserId(1);
    const MSG: MessageRef = MessageRef(77);

    #[tokio::test]
    async fn happy_path_answers_and_consumes_the_session() {
        let fx = fixture(
            vec![Ok("What is 2+2?".to_owned())],
            vec![Ok("4".to_owned())],
            vec![],
        );
        fx.controller
            .handle_image(USER, png_bytes(), &fx.out)
            .await
            .unwrap();

        // The selection prompt lists every available provider.
        match fx.out.last() {
            Sent::Prompt { text, tokens } => {
                assert!(text.contains("What is 2+2?"));
                assert_eq!(
                    tokens,
                    vec![
                        "solve_openai_gpt35",
                        "solve_openai_gpt4",
                        "solve_groq_llama3",
                        "solve_groq_mixtral",
                        "solve_gemini"
                    ]
                );
            }
            other => panic!("expected selection prompt, got {other:?}"),
        }

        fx.controller
            .handle_selection(USER, "groq_llama3", MSG, &fx.out)
            .await
            .unwrap();

        let sent = fx.out.sent();
        let answer = sent
            .iter()
            .find_map(|s| match s {
                Sent::Text(text) if text.contains("Answer from") => Some(text.clone()),
                _ => None,
            })
            .expect("no answer delivered");
        assert!(answer.contains("Groq Llama 3 8B"));
        assert!(answer.contains('4'));

        // Consumed exactly once.
        assert_eq!(fx.sessions.take(USER), None);
        assert_eq!(fx.groq.calls().len(), 1);
        assert_eq!(fx.groq.calls()[0].1, "What is 2+2?");
    }

    #[tokio::test]
    async fn empty_extraction_leaves_the_session_untouched() {
        let fx = fixture(vec![Err(anyhow!("nothing readable"))], vec![], vec![]);
        fx.controller
            .handle_image(USER, png_bytes(), &fx.out)
            .await
            .unwrap();

        match fx.out.last() {
            Sent::Text(text) => assert!(text.contains("Couldn't extract any text")),
            other => panic!("expected guidance text, got {other:?}"),
        }
        assert_eq!(fx.sessions.take(USER), None);
    }

    #[tokio::test]
    async fn provider_failure_restores_the_question_for_retry() {
        let fx = fixture(
            vec![Ok("integrate x^2 dx".to_owned())],
            vec![Err(ProviderFailure::Timeout)],
            vec![Ok("x^3/3 + C".to_owned())],
        );
        fx.controller
            .handle_image(USER, png_bytes(), &fx.out)
            .await
            .unwrap();

        // First attempt times out.
        fx.controller
            .handle_selection(USER, "groq_llama3", MSG, &fx.out)
            .await
            .unwrap();
        match fx.out.last() {
            Sent::Edit { text, tokens } => {
                assert!(text.contains("Error with Groq Llama 3 8B"));
                assert!(text.contains("Try a different model"));
                assert!(tokens.is_some(), "retry keyboard missing");
            }
            other => panic!("expected error edit, got {other:?}"),
        }

        // Retry with a different provider uses the restored text.
        fx.controller
            .handle_selection(USER, "gemini", MSG, &fx.out)
            .await
            .unwrap();
        assert_eq!(fx.gemini.calls().len(), 1);
        assert_eq!(fx.gemini.calls()[0].1, "integrate x^2 dx");
        assert_eq!(fx.sessions.take(USER), None);
    }

    #[tokio::test]
    async fn selection_without_pending_question_is_a_desync() {
        let fx = fixture(vec![], vec![Ok("unused".to_owned())], vec![]);
        fx.controller
            .handle_selection(USER, "groq_llama3", MSG, &fx.out)
            .await
            .unwrap();

        match fx.out.last() {
            Sent::Edit { text, .. } => {
                assert!(text.contains("No question found"));
                assert!(text.contains("send a new photo"));
            }
            other => panic!("expected desync edit, got {other:?}"),
        }
        assert_eq!(fx.groq.calls().len(), 0);
    }

    #[tokio::test]
    async fn unknown_provider_does_not_consume_the_question() {
        let fx = fixture(
            vec![Ok("a question".to_owned())],
            vec![Ok("answer".to_owned())],
            vec![],
        );
        fx.controller
            .handle_image(USER, png_bytes(), &fx.out)
            .await
            .unwrap();

        fx.controller
            .handle_selection(USER, "claude_opus", MSG, &fx.out)
            .await
            .unwrap();
        match fx.out.last() {
            Sent::Edit { text, tokens } => {
                assert!(text.contains("no longer available"));
                assert!(tokens.is_some());
            }
            other => panic!("expected unknown-provider edit, got {other:?}"),
        }

        // The pending question survived; a valid retry still works.
        fx.controller
            .handle_selection(USER, "groq_llama3", MSG, &fx.out)
            .await
            .unwrap();
        assert_eq!(fx.groq.calls()[0].1, "a question");
    }

    #[tokio::test]
    async fn new_image_overwrites_a_pending_question() {
        // Three OCR variants per image; pad so the second image starts on
        // the fourth reply.
        let fx = fixture(
            vec![
                Ok("first question".to_owned()),
                Ok(String::new()),
                Ok(String::new()),
                Ok("second question".to_owned()),
            ],
            vec![Ok("answer".to_owned())],
            vec![],
        );
        fx.controller
            .handle_image(USER, png_bytes(), &fx.out)
            .await
            .unwrap();
        fx.controller
            .handle_image(USER, png_bytes(), &fx.out)
            .await
            .unwrap();

        fx.controller
            .handle_selection(USER, "groq_llama3", MSG, &fx.out)
            .await
            .unwrap();
        assert_eq!(fx.groq.calls()[0].1, "second question");
    }

    #[test]
    fn preview_truncates_on_a_char_boundary() {
        let short = "What is 2+2?";
        assert_eq!(preview(short), short);

        let long = "é".repeat(200);
        let clipped = preview(&long);
        assert_eq!(clipped.chars().count(), PREVIEW_CHARS + 3);
        assert!(clipped.ends_with("..."));
    }
}
