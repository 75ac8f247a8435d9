pub mod command;
pub mod context;
pub mod conversation_state;
pub mod error;
pub mod generate;
pub mod history;
pub mod prompt;
pub mod sanitize;
pub mod search;
pub mod translate;
pub mod voice;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use eyre::Result;
use tracing::{error, warn};
use url::Url;

use command::Command;
use context::ContextManager;
use conversation_state::ConversationState;
use error::CaptureError;
use history::HistoryStore;
use search::WebAugmenter;
use translate::{LanguagePreference, Translator, WORKING_LANGUAGE};
use voice::{SpeechCapture, SpeechSynthesizer, VoiceLoopState};

use crate::ollama_client::GenerationBackend;

/// Inputs longer than this are rejected before anything else runs; it is
/// also the practical ceiling of the free translation endpoint.
pub const MAX_INPUT_CHARS: usize = 4900;

/// Phrase that ends voice mode.
const STOP_LISTENING_PHRASE: &str = "stop listening";

const WELCOME_TEXT: &str = "
Hi, I'm Eva. Ask me anything, typed or spoken, in any supported language.

Things to try
• What's the latest news?
• open browser rust tutorials
• /lang fr     Chat in French
• /voice       Talk instead of typing

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Ollama Voice Chat

/clear            Clear the conversation history
/new              Archive this chat and start a fresh one
/chats            List recently archived chats
/load <n>         Load an archived chat
/rename <n> <name>  Rename an archived chat
/delete <n>       Delete an archived chat
/lang <code>      Switch language (en, fr, es, de, it, pt, ru, ar, el, zh-CN, ja, he)
/voice            Start the voice loop (say \"stop listening\" to leave)
/help             Show this help dialogue
/quit             Quit the application
";

/// External collaborators the orchestrator drives.
pub struct ChatBackends {
    pub generator: Box<dyn GenerationBackend>,
    pub translator: Box<dyn Translator>,
    pub augmenter: Box<dyn WebAugmenter>,
    pub capture: Box<dyn SpeechCapture>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub history: Box<dyn HistoryStore>,
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    conversation_state: ConversationState,
    context_manager: ContextManager,
    language: LanguagePreference,
    backends: ChatBackends,
    voice_loop: VoiceLoopState,
    /// At most one turn may be in flight per session, even on a
    /// multi-threaded runtime.
    turn_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        language: LanguagePreference,
        context_manager: ContextManager,
        backends: ChatBackends,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            conversation_state: ConversationState::new(),
            context_manager,
            language,
            backends,
            voice_loop: VoiceLoopState::default(),
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        match self.backends.history.load() {
            Ok(messages) => {
                self.conversation_state = ConversationState::from_messages(messages);
            }
            Err(e) => {
                error!(error = %e, "could not load chat history; starting empty");
            }
        }

        if self.interactive {
            self.print_welcome()?;
            self.print_transcript()?;
        }

        // Non-interactive mode: a single turn.
        if let Some(input) = self.input.take() {
            self.take_turn(&input, false).await?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        Ok(())
    }

    fn print_transcript(&mut self) -> Result<()> {
        for message in self.conversation_state.messages() {
            let marker = if message.voice { " (voice)" } else { "" };
            writeln!(
                self.output,
                "{}{}: {}",
                message.role.as_str(),
                marker,
                message.content
            )?;
        }
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = prompt::generate_prompt(None);
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if line.trim() == "/quit" {
                        break;
                    }

                    if let Err(e) = self.handle_input(&line).await {
                        writeln!(self.output, "Error: {}", e)?;
                    }
                }
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<()> {
        let trimmed = input.trim();
        match trimmed {
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/clear" => {
                self.conversation_state.clear();
                self.persist();
                writeln!(self.output, "Conversation cleared.")?;
            }
            "/new" => {
                self.new_chat()?;
            }
            "/chats" => {
                self.list_chats()?;
            }
            "/voice" => {
                self.run_voice_loop().await?;
            }
            _ => {
                if let Some(code) = trimmed.strip_prefix("/lang ") {
                    self.switch_language(code.trim())?;
                } else if let Some(arg) = trimmed.strip_prefix("/load ") {
                    self.load_chat(arg.trim())?;
                } else if let Some(args) = trimmed.strip_prefix("/rename ") {
                    self.rename_chat(args.trim())?;
                } else if let Some(arg) = trimmed.strip_prefix("/delete ") {
                    self.delete_chat(arg.trim())?;
                } else {
                    self.take_turn(input, false).await?;
                }
            }
        }

        Ok(())
    }

    /// Run one conversation turn end to end.
    ///
    /// Validates the input, intercepts trigger commands, and otherwise runs
    /// augmentation, inbound translation, generation, outbound translation
    /// and speech, appending to the transcript at the defined points.
    pub async fn take_turn(&mut self, input: &str, from_voice: bool) -> Result<()> {
        let lock = Arc::clone(&self.turn_lock);
        let _turn = lock.lock().await;

        let trimmed = input.trim().to_string();
        if trimmed.is_empty() {
            writeln!(self.output, "Nothing to send.")?;
            return Ok(());
        }
        if trimmed.chars().count() > MAX_INPUT_CHARS {
            writeln!(
                self.output,
                "Message too long: the limit is {} characters.",
                MAX_INPUT_CHARS
            )?;
            return Ok(());
        }

        if let Some(cmd) = command::match_command(&trimmed) {
            return self.handle_command(&trimmed, cmd, from_voice).await;
        }

        // Best-effort web digest on the raw input; never aborts the turn.
        let digest = match self.backends.augmenter.search(&trimmed).await {
            Ok(d) if !d.is_empty() => Some(d),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "web augmentation failed; continuing without digest");
                None
            }
        };

        // Inbound translation into the working language. A failure here
        // aborts the whole turn before anything is appended.
        let translated = if self.language.is_working_language() {
            trimmed.clone()
        } else {
            match self
                .backends
                .translator
                .translate(&trimmed, "auto", WORKING_LANGUAGE)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    writeln!(self.output, "Could not translate your message: {}", e)?;
                    return Ok(());
                }
            }
        };

        self.conversation_state.add_user_message(&trimmed, from_voice);
        self.persist();

        let history_len = self.conversation_state.len() - 1;
        let generated = generate::generate(
            self.backends.generator.as_ref(),
            &self.context_manager,
            &self.conversation_state.messages()[..history_len],
            &translated,
            digest.as_deref(),
        )
        .await;

        // Outbound translation back to the user's language. On failure the
        // untranslated reply is better than no reply.
        let final_text = if self.language.is_working_language() {
            generated
        } else {
            match self
                .backends
                .translator
                .translate(&generated, WORKING_LANGUAGE, &self.language.code)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "reply translation failed; keeping untranslated text");
                    generated
                }
            }
        };

        self.conversation_state.add_assistant_message(&final_text);
        self.persist();
        writeln!(self.output, "{}", final_text)?;

        self.speak(&final_text).await;
        Ok(())
    }

    /// Command path: build the reply directly, no search/translate/generate.
    async fn handle_command(
        &mut self,
        raw_input: &str,
        cmd: Command,
        from_voice: bool,
    ) -> Result<()> {
        self.conversation_state.add_user_message(raw_input, from_voice);
        self.persist();

        let reply = match cmd {
            Command::GetLocalNews => {
                let location = self.context_manager.location.clone();
                match self.backends.augmenter.local_news(&location).await {
                    Ok(digest) if !digest.is_empty() => {
                        format!("Here are the latest headlines near {}:\n{}", location, digest)
                    }
                    Ok(_) => format!("No local news found for {}.", location),
                    Err(e) => {
                        warn!(error = %e, "news lookup failed");
                        format!("No local news found for {}.", location)
                    }
                }
            }
            Command::OpenBrowser(query) => {
                open_browser(&query);
                if query.is_empty() {
                    "Opening the browser.".to_string()
                } else {
                    format!("Opening the browser for \"{}\".", query)
                }
            }
            Command::CloseBrowser => {
                close_browser();
                "Closing the browser.".to_string()
            }
        };

        self.conversation_state.add_assistant_message(&reply);
        self.persist();
        writeln!(self.output, "{}", reply)?;

        self.speak(&reply).await;
        Ok(())
    }

    /// Voice loop controller: capture, orchestrate, account for failures.
    async fn run_voice_loop(&mut self) -> Result<()> {
        self.voice_loop.start();
        writeln!(
            self.output,
            "Voice mode on. Say \"{}\" to go back to typing.",
            STOP_LISTENING_PHRASE
        )?;

        while self.voice_loop.is_active() {
            if !self.voice_loop.begin_cycle() {
                break;
            }

            let captured = self.backends.capture.capture(&self.language.locale).await;
            match captured {
                Ok(Some(transcript))
                    if transcript.to_lowercase().contains(STOP_LISTENING_PHRASE) =>
                {
                    self.voice_loop.stop();
                    writeln!(self.output, "Voice mode off.")?;
                }
                Ok(Some(transcript)) => {
                    writeln!(self.output, "Heard: {}", transcript)?;
                    match self.take_turn(&transcript, true).await {
                        Ok(()) => self.voice_loop.record_success(),
                        Err(e) => {
                            writeln!(self.output, "Error: {}", e)?;
                        }
                    }
                }
                Err(CaptureError::Unavailable) => {
                    writeln!(
                        self.output,
                        "No speech capture configured. Set CHAT_CAPTURE_CMD to a command \
that records one utterance and prints the transcript."
                    )?;
                    self.voice_loop.stop();
                }
                Ok(None) | Err(_) => {
                    if self.voice_loop.record_failure() {
                        writeln!(
                            self.output,
                            "I keep missing you. Check your microphone, or say \"{}\".",
                            STOP_LISTENING_PHRASE
                        )?;
                    }
                }
            }

            // Clear busy on every exit path so the loop can never wedge.
            self.voice_loop.end_cycle();
        }

        self.voice_loop.end_cycle();
        Ok(())
    }

    async fn speak(&mut self, text: &str) {
        let spoken = sanitize::sanitize_for_speech(text);
        if spoken.is_empty() {
            return;
        }
        if let Err(e) = self
            .backends
            .synthesizer
            .speak(&spoken, &self.language.code)
            .await
        {
            warn!(error = %e, "speech synthesis failed");
        }
    }

    fn persist(&self) {
        if let Err(e) = self.backends.history.persist(self.conversation_state.messages()) {
            error!(error = %e, "could not persist chat history; continuing in memory");
        }
    }

    fn switch_language(&mut self, code: &str) -> Result<()> {
        match LanguagePreference::resolve(code) {
            Ok(language) => {
                writeln!(
                    self.output,
                    "Language set to {} ({}).",
                    language.locale, language.code
                )?;
                self.language = language;
            }
            Err(e) => {
                writeln!(self.output, "{}", e)?;
            }
        }
        Ok(())
    }

    fn new_chat(&mut self) -> Result<()> {
        match self.backends.history.archive(self.conversation_state.messages()) {
            Ok(Some(name)) => writeln!(self.output, "Archived this chat as {}.", name)?,
            Ok(None) => writeln!(self.output, "Nothing to archive.")?,
            Err(e) => writeln!(self.output, "Could not archive the chat: {}", e)?,
        }
        self.conversation_state.clear();
        self.persist();
        writeln!(self.output, "Started a new chat.")?;
        Ok(())
    }

    fn list_chats(&mut self) -> Result<()> {
        match self.backends.history.list_archives() {
            Ok(names) if names.is_empty() => {
                writeln!(self.output, "No archived chats yet.")?;
            }
            Ok(names) => {
                writeln!(self.output, "Recent chats:")?;
                for (i, name) in names.iter().enumerate() {
                    writeln!(self.output, "  {}. {}", i + 1, name)?;
                }
            }
            Err(e) => writeln!(self.output, "Could not list archived chats: {}", e)?,
        }
        Ok(())
    }

    /// Resolve a `/load`-style argument: an index into the recent list or a
    /// literal archive name.
    fn resolve_archive(&mut self, arg: &str) -> Result<Option<String>> {
        let names = match self.backends.history.list_archives() {
            Ok(names) => names,
            Err(e) => {
                writeln!(self.output, "Could not list archived chats: {}", e)?;
                return Ok(None);
            }
        };
        if let Ok(index) = arg.parse::<usize>() {
            if index >= 1 && index <= names.len() {
                return Ok(Some(names[index - 1].clone()));
            }
            writeln!(self.output, "No archived chat numbered {}.", index)?;
            return Ok(None);
        }
        Ok(Some(arg.to_string()))
    }

    fn load_chat(&mut self, arg: &str) -> Result<()> {
        let Some(name) = self.resolve_archive(arg)? else {
            return Ok(());
        };
        match self.backends.history.load_archive(&name) {
            Ok(messages) => {
                self.conversation_state = ConversationState::from_messages(messages);
                self.persist();
                writeln!(self.output, "Loaded {}.", name)?;
                self.print_transcript()?;
            }
            Err(e) => writeln!(self.output, "Could not load {}: {}", name, e)?,
        }
        Ok(())
    }

    fn rename_chat(&mut self, args: &str) -> Result<()> {
        let Some((target, new_name)) = args.split_once(' ') else {
            writeln!(self.output, "Usage: /rename <n> <new-name>")?;
            return Ok(());
        };
        let Some(name) = self.resolve_archive(target.trim())? else {
            return Ok(());
        };
        match self.backends.history.rename_archive(&name, new_name.trim()) {
            Ok(()) => writeln!(self.output, "Renamed {} to {}.", name, new_name.trim())?,
            Err(e) => writeln!(self.output, "Could not rename {}: {}", name, e)?,
        }
        Ok(())
    }

    fn delete_chat(&mut self, arg: &str) -> Result<()> {
        let Some(name) = self.resolve_archive(arg)? else {
            return Ok(());
        };
        match self.backends.history.delete_archive(&name) {
            Ok(()) => writeln!(self.output, "Deleted {}.", name)?,
            Err(e) => writeln!(self.output, "Could not delete {}: {}", name, e)?,
        }
        Ok(())
    }
}

/// Best-effort browser launch; failures are logged and swallowed.
fn open_browser(query: &str) {
    let target = if query.is_empty() {
        "https://duckduckgo.com".to_string()
    } else {
        let mut url = Url::parse("https://duckduckgo.com").expect("static url is valid");
        url.query_pairs_mut().append_pair("q", query);
        url.to_string()
    };

    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    if let Err(e) = std::process::Command::new(opener)
        .arg(&target)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        warn!(error = %e, target, "could not open the browser");
    }
}

/// Best-effort browser shutdown; failures are logged and swallowed.
fn close_browser() {
    let process = std::env::var("CHAT_BROWSER_PROCESS").unwrap_or_else(|_| "firefox".to_string());
    if let Err(e) = std::process::Command::new("pkill")
        .arg(&process)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
    {
        warn!(error = %e, process, "could not close the browser");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conversation_state::Message;
    use error::{
        AugmentationError, GenerationError, PersistenceError, SynthesisError, TranslationError,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTranslator {
        calls: AtomicUsize,
        /// Fail calls whose target language equals this code.
        fail_for_target: Option<&'static str>,
    }

    #[async_trait]
    impl Translator for MockTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            target: &str,
        ) -> Result<String, TranslationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for_target == Some(target) {
                return Err(TranslationError::Http("service down".into()));
            }
            Ok(format!("{text} [{target}]"))
        }
    }

    #[derive(Default)]
    struct MockGenerator {
        calls: AtomicUsize,
        unreachable: bool,
    }

    #[async_trait]
    impl GenerationBackend for MockGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unreachable {
                return Err(GenerationError::Connect("refused".into()));
            }
            Ok("a generated reply".to_string())
        }
    }

    #[derive(Default)]
    struct MockAugmenter {
        digest: Option<&'static str>,
        news: Option<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl WebAugmenter for MockAugmenter {
        async fn search(&self, _query: &str) -> Result<String, AugmentationError> {
            if self.fail {
                return Err(AugmentationError::Timeout(8));
            }
            Ok(self.digest.unwrap_or("").to_string())
        }

        async fn local_news(&self, _location: &str) -> Result<String, AugmentationError> {
            if self.fail {
                return Err(AugmentationError::Timeout(8));
            }
            Ok(self.news.unwrap_or("").to_string())
        }
    }

    /// Scripted capture results, consumed in order.
    struct MockCapture {
        script: Mutex<VecDeque<Result<Option<String>, CaptureError>>>,
    }

    impl MockCapture {
        fn scripted(results: Vec<Result<Option<String>, CaptureError>>) -> Self {
            Self {
                script: Mutex::new(results.into()),
            }
        }
    }

    #[async_trait]
    impl SpeechCapture for MockCapture {
        async fn capture(&self, _locale: &str) -> Result<Option<String>, CaptureError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CaptureError::Unavailable))
        }
    }

    #[derive(Default)]
    struct MockSynthesizer {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynthesizer {
        async fn speak(&self, text: &str, _lang: &str) -> Result<(), SynthesisError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockHistory {
        persisted: Mutex<Vec<Message>>,
    }

    impl HistoryStore for MockHistory {
        fn load(&self) -> Result<Vec<Message>, PersistenceError> {
            Ok(Vec::new())
        }

        fn persist(&self, messages: &[Message]) -> Result<(), PersistenceError> {
            *self.persisted.lock().unwrap() = messages.to_vec();
            Ok(())
        }

        fn archive(&self, _messages: &[Message]) -> Result<Option<String>, PersistenceError> {
            Ok(None)
        }

        fn list_archives(&self) -> Result<Vec<String>, PersistenceError> {
            Ok(Vec::new())
        }

        fn load_archive(&self, name: &str) -> Result<Vec<Message>, PersistenceError> {
            Err(PersistenceError::NoSuchArchive(name.to_string()))
        }

        fn rename_archive(&self, name: &str, _new: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::NoSuchArchive(name.to_string()))
        }

        fn delete_archive(&self, name: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::NoSuchArchive(name.to_string()))
        }
    }

    struct Fixture {
        translator: std::sync::Arc<MockTranslator>,
        generator: std::sync::Arc<MockGenerator>,
        synthesizer: std::sync::Arc<MockSynthesizer>,
    }

    /// Arc wrappers so the test can observe backends the context owns.
    #[async_trait]
    impl Translator for std::sync::Arc<MockTranslator> {
        async fn translate(
            &self,
            text: &str,
            source: &str,
            target: &str,
        ) -> Result<String, TranslationError> {
            self.as_ref().translate(text, source, target).await
        }
    }

    #[async_trait]
    impl GenerationBackend for std::sync::Arc<MockGenerator> {
        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            self.as_ref().complete(prompt).await
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for std::sync::Arc<MockSynthesizer> {
        async fn speak(&self, text: &str, lang: &str) -> Result<(), SynthesisError> {
            self.as_ref().speak(text, lang).await
        }
    }

    fn build_context(
        language: &str,
        translator: MockTranslator,
        generator: MockGenerator,
        augmenter: MockAugmenter,
        capture: MockCapture,
    ) -> (ChatContext, Fixture) {
        let translator = std::sync::Arc::new(translator);
        let generator = std::sync::Arc::new(generator);
        let synthesizer = std::sync::Arc::new(MockSynthesizer::default());

        let fixture = Fixture {
            translator: std::sync::Arc::clone(&translator),
            generator: std::sync::Arc::clone(&generator),
            synthesizer: std::sync::Arc::clone(&synthesizer),
        };

        let backends = ChatBackends {
            generator: Box::new(generator),
            translator: Box::new(translator),
            augmenter: Box::new(augmenter),
            capture: Box::new(capture),
            synthesizer: Box::new(synthesizer),
            history: Box::new(MockHistory::default()),
        };

        let context = ChatContext::new(
            Box::new(std::io::sink()),
            None,
            false,
            LanguagePreference::resolve(language).unwrap(),
            ContextManager::new("Testville".to_string()),
            backends,
        );
        (context, fixture)
    }

    fn english_context() -> (ChatContext, Fixture) {
        build_context(
            "en",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![]),
        )
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_side_effects() {
        let (mut ctx, fixture) = english_context();
        ctx.take_turn("   \t  ", false).await.unwrap();

        assert!(ctx.conversation_state.is_empty());
        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_without_state_change() {
        let (mut ctx, fixture) = english_context();
        let huge = "x".repeat(MAX_INPUT_CHARS + 1);
        ctx.take_turn(&huge, false).await.unwrap();

        assert!(ctx.conversation_state.is_empty());
        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn input_at_the_limit_is_accepted() {
        let (mut ctx, _fixture) = english_context();
        let max = "x".repeat(MAX_INPUT_CHARS);
        ctx.take_turn(&max, false).await.unwrap();
        assert_eq!(ctx.conversation_state.len(), 2);
    }

    #[tokio::test]
    async fn working_language_never_touches_the_translator() {
        let (mut ctx, fixture) = english_context();
        ctx.take_turn("hello there", false).await.unwrap();

        assert_eq!(fixture.translator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.conversation_state.len(), 2);
        assert_eq!(
            ctx.conversation_state.messages()[1].content,
            "a generated reply"
        );
    }

    #[tokio::test]
    async fn non_working_language_translates_both_directions() {
        let (mut ctx, fixture) = build_context(
            "fr",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("bonjour", false).await.unwrap();

        assert_eq!(fixture.translator.calls.load(Ordering::SeqCst), 2);
        // The transcript keeps the raw input, not the working-language form.
        assert_eq!(ctx.conversation_state.messages()[0].content, "bonjour");
        assert_eq!(
            ctx.conversation_state.messages()[1].content,
            "a generated reply [fr]"
        );
    }

    #[tokio::test]
    async fn inbound_translation_failure_aborts_before_append() {
        let (mut ctx, fixture) = build_context(
            "fr",
            MockTranslator {
                fail_for_target: Some(WORKING_LANGUAGE),
                ..Default::default()
            },
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("bonjour", false).await.unwrap();

        assert!(ctx.conversation_state.is_empty());
        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn outbound_translation_failure_falls_back_to_untranslated_text() {
        let (mut ctx, _fixture) = build_context(
            "fr",
            MockTranslator {
                fail_for_target: Some("fr"),
                ..Default::default()
            },
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("bonjour", false).await.unwrap();

        assert_eq!(ctx.conversation_state.len(), 2);
        assert_eq!(
            ctx.conversation_state.messages()[1].content,
            "a generated reply"
        );
    }

    #[tokio::test]
    async fn augmentation_failure_never_blocks_the_turn() {
        let (mut ctx, fixture) = build_context(
            "en",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter {
                fail: true,
                ..Default::default()
            },
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("what's new?", false).await.unwrap();

        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.conversation_state.len(), 2);
    }

    #[tokio::test]
    async fn open_browser_command_bypasses_translation_and_generation() {
        let (mut ctx, fixture) = build_context(
            "fr",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("open browser cats", false).await.unwrap();

        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.translator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.conversation_state.len(), 2);
        assert!(ctx.conversation_state.messages()[1].content.contains("cats"));
    }

    #[tokio::test]
    async fn news_command_replies_with_the_digest() {
        let (mut ctx, fixture) = build_context(
            "en",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter {
                news: Some("- [Storm](https://news.test/1)"),
                ..Default::default()
            },
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("what's the latest news?", false).await.unwrap();

        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 0);
        let reply = &ctx.conversation_state.messages()[1].content;
        assert!(reply.contains("Testville"));
        assert!(reply.contains("Storm"));
    }

    #[tokio::test]
    async fn unreachable_backend_appends_and_speaks_the_diagnostic() {
        let (mut ctx, fixture) = build_context(
            "en",
            MockTranslator::default(),
            MockGenerator {
                unreachable: true,
                ..Default::default()
            },
            MockAugmenter::default(),
            MockCapture::scripted(vec![]),
        );
        ctx.take_turn("hello?", false).await.unwrap();

        assert_eq!(
            ctx.conversation_state.messages()[1].content,
            generate::UNREACHABLE_REPLY
        );
        let spoken = fixture.synthesizer.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("Could not connect"));
    }

    #[tokio::test]
    async fn voice_turn_marks_the_user_message() {
        let (mut ctx, _fixture) = english_context();
        ctx.take_turn("spoken words", true).await.unwrap();

        assert!(ctx.conversation_state.messages()[0].voice);
        assert!(!ctx.conversation_state.messages()[1].voice);
    }

    #[tokio::test]
    async fn voice_loop_processes_transcripts_until_the_stop_phrase() {
        let (mut ctx, fixture) = build_context(
            "en",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![
                Ok(Some("hello from voice".to_string())),
                Ok(None),
                Ok(Some("stop listening".to_string())),
            ]),
        );
        ctx.run_voice_loop().await.unwrap();

        assert!(!ctx.voice_loop.is_active());
        assert!(!ctx.voice_loop.is_busy());
        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 1);
        assert!(ctx.conversation_state.messages()[0].voice);
    }

    #[tokio::test]
    async fn voice_loop_stops_when_capture_is_unavailable() {
        let (mut ctx, _fixture) = build_context(
            "en",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![Err(CaptureError::Unavailable)]),
        );
        ctx.run_voice_loop().await.unwrap();

        assert!(!ctx.voice_loop.is_active());
        assert!(!ctx.voice_loop.is_busy());
    }

    #[tokio::test]
    async fn voice_loop_survives_a_failure_streak_and_keeps_listening() {
        let (mut ctx, fixture) = build_context(
            "en",
            MockTranslator::default(),
            MockGenerator::default(),
            MockAugmenter::default(),
            MockCapture::scripted(vec![
                Ok(None),
                Ok(None),
                Ok(None),
                Err(CaptureError::Timeout(20)),
                Ok(Some("still here".to_string())),
                Ok(Some("stop listening".to_string())),
            ]),
        );
        ctx.run_voice_loop().await.unwrap();

        // The streak warned once, reset, and the loop carried on to process
        // the real transcript.
        assert_eq!(fixture.generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.voice_loop.consecutive_failures(), 0);
        assert!(!ctx.voice_loop.is_active());
    }
}
