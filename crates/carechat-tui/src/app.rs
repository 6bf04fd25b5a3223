use std::path::PathBuf;
use std::sync::Arc;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};
use carechat_core::{
    Behavior, ChatClient, ChatError, ChatTransport, ComposeMode, Config, Conversation,
    Endpoint, DEFAULT_BEHAVIORS, OTHER_BEHAVIOR,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Setup,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupFocus {
    Categories,
    CustomName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaField {
    Question,
    Answer,
}

pub type ReplyTask = JoinHandle<Result<String, ChatError>>;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,

    // Setup state
    pub behavior_state: ListState,
    pub custom_behavior: String,
    pub setup_focus: SetupFocus,

    // Chat state
    pub conversation: Conversation,
    pub qa_field: QaField,
    pub cursor: usize, // cursor position (in chars) within the active input
    pub chat_scroll: u16,
    pub chat_height: u16,      // Height of chat area for scroll calculations
    pub chat_total_lines: u16, // Rendered line count of the thread
    pub follow_tail: bool,
    pub reply_task: Option<ReplyTask>,

    // Animation state
    pub animation_frame: u8, // 0-2 for the typing indicator

    // Chat area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    // Endpoint
    pub endpoint: Endpoint,
    transport: Arc<dyn ChatTransport>,

    // Where the chosen behavior is remembered; None keeps it in memory only
    pub config_path: Option<PathBuf>,
}

impl App {
    pub fn new(endpoint: Endpoint, config: &Config) -> Self {
        let client = ChatClient::new(endpoint.base_url());
        let mut app = Self::with_transport(endpoint, config, Arc::new(client));
        app.config_path = Config::get_config_path()
            .map_err(|err| warn!(error = %err, "no config path, behavior will not be remembered"))
            .ok();
        app
    }

    pub fn with_transport(
        endpoint: Endpoint,
        config: &Config,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        // Preselect whatever was used last time
        let last = config.last_behavior.as_ref();
        let selected = last
            .and_then(|b| DEFAULT_BEHAVIORS.iter().position(|label| *label == b.label()))
            .unwrap_or(0);
        let custom_behavior = last
            .filter(|b| b.is_other())
            .map(|b| b.custom_name().to_string())
            .unwrap_or_default();

        let mut behavior_state = ListState::default();
        behavior_state.select(Some(selected));

        Self {
            should_quit: false,
            screen: Screen::Setup,

            behavior_state,
            custom_behavior,
            setup_focus: SetupFocus::Categories,

            conversation: Conversation::with_greeting(),
            qa_field: QaField::Question,
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_total_lines: 0,
            follow_tail: true,
            reply_task: None,

            animation_frame: 0,

            chat_area: None,

            endpoint,
            transport,

            config_path: None,
        }
    }

    // Setup screen

    pub fn selected_behavior_label(&self) -> Option<&'static str> {
        self.behavior_state
            .selected()
            .and_then(|i| DEFAULT_BEHAVIORS.get(i).copied())
    }

    pub fn other_selected(&self) -> bool {
        self.selected_behavior_label() == Some(OTHER_BEHAVIOR)
    }

    pub fn setup_nav_down(&mut self) {
        let i = self.behavior_state.selected().unwrap_or(0);
        self.behavior_state
            .select(Some((i + 1).min(DEFAULT_BEHAVIORS.len() - 1)));
    }

    pub fn setup_nav_up(&mut self) {
        let i = self.behavior_state.selected().unwrap_or(0);
        self.behavior_state.select(Some(i.saturating_sub(1)));
    }

    /// Moves between the category list and the custom-name field. The field
    /// only exists while the catch-all category is selected.
    pub fn toggle_setup_focus(&mut self) {
        self.setup_focus = match self.setup_focus {
            SetupFocus::Categories if self.other_selected() => SetupFocus::CustomName,
            _ => SetupFocus::Categories,
        };
        self.cursor_end();
    }

    /// Leaves the setup screen. With `with_behavior` false the chat runs
    /// without any category context.
    pub fn start_chat(&mut self, with_behavior: bool) {
        let behavior = if with_behavior {
            self.selected_behavior_label().map(|label| {
                if label == OTHER_BEHAVIOR {
                    Behavior::with_custom(label, self.custom_behavior.trim())
                } else {
                    Behavior::new(label)
                }
            })
        } else {
            None
        };

        debug!(behavior = ?behavior.as_ref().map(Behavior::effective), "starting chat");
        self.conversation.set_behavior(behavior);
        self.screen = Screen::Chat;
        self.setup_focus = SetupFocus::Categories;
        self.follow_tail = true;
        self.cursor_end();
    }

    pub fn back_to_setup(&mut self) {
        self.screen = Screen::Setup;
        self.setup_focus = SetupFocus::Categories;
        self.cursor_end();
    }

    /// Header label for the current context.
    pub fn context_label(&self) -> String {
        self.conversation
            .behavior()
            .map(Behavior::effective)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "未設定".to_string())
    }

    // Composer

    pub fn compose_mode(&self) -> ComposeMode {
        self.conversation.draft.mode
    }

    pub fn toggle_mode(&mut self) {
        let draft = &mut self.conversation.draft;
        draft.mode = draft.mode.toggled();
        self.qa_field = QaField::Question;
        self.cursor_end();
    }

    pub fn switch_qa_field(&mut self) {
        if self.compose_mode() == ComposeMode::Qa {
            self.qa_field = match self.qa_field {
                QaField::Question => QaField::Answer,
                QaField::Answer => QaField::Question,
            };
            self.cursor_end();
        }
    }

    pub fn active_input(&self) -> Option<&str> {
        match self.screen {
            Screen::Setup => match self.setup_focus {
                SetupFocus::CustomName => Some(self.custom_behavior.as_str()),
                SetupFocus::Categories => None,
            },
            Screen::Chat => {
                let draft = &self.conversation.draft;
                Some(match (draft.mode, self.qa_field) {
                    (ComposeMode::Free, _) => draft.text.as_str(),
                    (ComposeMode::Qa, QaField::Question) => draft.question.as_str(),
                    (ComposeMode::Qa, QaField::Answer) => draft.answer.as_str(),
                })
            }
        }
    }

    fn active_input_mut(&mut self) -> Option<&mut String> {
        match self.screen {
            Screen::Setup => match self.setup_focus {
                SetupFocus::CustomName => Some(&mut self.custom_behavior),
                SetupFocus::Categories => None,
            },
            Screen::Chat => {
                let draft = &mut self.conversation.draft;
                Some(match (draft.mode, self.qa_field) {
                    (ComposeMode::Free, _) => &mut draft.text,
                    (ComposeMode::Qa, QaField::Question) => &mut draft.question,
                    (ComposeMode::Qa, QaField::Answer) => &mut draft.answer,
                })
            }
        }
    }

    pub fn insert_char(&mut self, c: char) {
        let cursor = self.cursor;
        if let Some(input) = self.active_input_mut() {
            let byte_pos = char_to_byte_index(input, cursor);
            input.insert(byte_pos, c);
            self.cursor += 1;
        }
    }

    pub fn insert_str(&mut self, text: &str) {
        let cursor = self.cursor;
        if let Some(input) = self.active_input_mut() {
            let byte_pos = char_to_byte_index(input, cursor);
            input.insert_str(byte_pos, text);
            self.cursor += text.chars().count();
        }
    }

    pub fn delete_back(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let cursor = self.cursor - 1;
        if let Some(input) = self.active_input_mut() {
            let byte_pos = char_to_byte_index(input, cursor);
            input.remove(byte_pos);
            self.cursor = cursor;
        }
    }

    pub fn delete_forward(&mut self) {
        let cursor = self.cursor;
        if let Some(input) = self.active_input_mut() {
            if cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, cursor);
                input.remove(byte_pos);
            }
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let len = self.active_input().map(|s| s.chars().count()).unwrap_or(0);
        self.cursor = (self.cursor + 1).min(len);
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.active_input().map(|s| s.chars().count()).unwrap_or(0);
    }

    // Sending

    /// Sends the current draft unless a request is already in flight or the
    /// draft composes to nothing.
    pub fn submit(&mut self) {
        match self.conversation.begin_send() {
            Ok(pending) => {
                let transport = Arc::clone(&self.transport);
                self.reply_task = Some(tokio::spawn(async move {
                    transport.send_message(&pending.payload).await
                }));
                self.qa_field = QaField::Question;
                self.cursor = 0;
                self.follow_tail = true;
            }
            Err(reason) => debug!(%reason, "send ignored"),
        }
    }

    /// Applies the outcome of the reply task.
    pub fn complete_send(&mut self, joined: Result<Result<String, ChatError>, JoinError>) {
        self.reply_task = None;
        let result = joined.unwrap_or_else(|err| {
            warn!(error = %err, "reply task did not finish");
            Err(ChatError::Interrupted(err.to_string()))
        });
        self.conversation.finish_send(result);
        self.follow_tail = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_in_flight() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Scrolling

    fn max_scroll(&self) -> u16 {
        self.chat_total_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        if self.chat_scroll >= self.max_scroll() {
            self.follow_tail = true;
        }
    }

    /// Called by the renderer once it knows how tall the thread is.
    pub fn update_chat_metrics(&mut self, total_lines: u16, height: u16) {
        self.chat_total_lines = total_lines;
        self.chat_height = height;
        if self.follow_tail || self.chat_scroll > self.max_scroll() {
            self.chat_scroll = self.max_scroll();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carechat_core::{ChatRole, Draft, FAILURE_NOTICE};
    use tokio::sync::Notify;

    /// Echoes the payload back once released.
    struct GatedEcho {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ChatTransport for GatedEcho {
        async fn send_message(&self, message: &str) -> Result<String, ChatError> {
            self.gate.notified().await;
            Ok(format!("echo: {}", message))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ChatTransport for AlwaysFails {
        async fn send_message(&self, _message: &str) -> Result<String, ChatError> {
            Err(ChatError::Status {
                status: 404,
                reason: "Not Found".into(),
                body: String::new(),
            })
        }
    }

    fn app_with(transport: Arc<dyn ChatTransport>) -> App {
        let endpoint = Endpoint::resolve(Some("http://localhost:1"), &Config::new());
        App::with_transport(endpoint, &Config::new(), transport)
    }

    #[test]
    fn test_preselects_last_behavior() {
        let config = Config {
            last_behavior: Some(Behavior::with_custom(OTHER_BEHAVIOR, "ネット依存")),
            ..Config::new()
        };
        let endpoint = Endpoint::resolve(None, &config);
        let app = App::with_transport(endpoint, &config, Arc::new(AlwaysFails));

        assert_eq!(app.selected_behavior_label(), Some(OTHER_BEHAVIOR));
        assert_eq!(app.custom_behavior, "ネット依存");
    }

    #[test]
    fn test_start_chat_with_custom_behavior() {
        let mut app = app_with(Arc::new(AlwaysFails));
        while !app.other_selected() {
            app.setup_nav_down();
        }
        app.toggle_setup_focus();
        assert_eq!(app.setup_focus, SetupFocus::CustomName);
        app.insert_str("深夜外出");

        app.start_chat(true);

        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.context_label(), "深夜外出");
    }

    #[test]
    fn test_start_chat_without_behavior() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.start_chat(false);
        assert!(app.conversation.behavior().is_none());
        assert_eq!(app.context_label(), "未設定");
    }

    #[test]
    fn test_custom_field_needs_other_selected() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.behavior_state.select(Some(0));
        app.toggle_setup_focus();
        assert_eq!(app.setup_focus, SetupFocus::Categories);
        app.insert_char('x');
        assert!(app.custom_behavior.is_empty());
    }

    #[test]
    fn test_editing_multibyte_text() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.start_chat(false);
        app.insert_str("お金なくて");
        app.cursor_left();
        app.cursor_left();
        app.cursor_left();
        app.insert_char('が');
        assert_eq!(app.conversation.draft.text, "お金がなくて");

        app.delete_back();
        app.cursor_home();
        app.delete_forward();
        assert_eq!(app.conversation.draft.text, "金なくて");

        app.cursor_end();
        assert_eq!(app.cursor, 4);
    }

    #[test]
    fn test_qa_fields_are_separate() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.start_chat(false);
        app.toggle_mode();
        app.insert_str("きっかけは？");
        app.switch_qa_field();
        app.insert_str("お金がなくて");

        assert_eq!(app.conversation.draft.question, "きっかけは？");
        assert_eq!(app.conversation.draft.answer, "お金がなくて");
        assert!(app.conversation.draft.text.is_empty());
    }

    #[tokio::test]
    async fn test_submit_is_single_flight() {
        let gate = Arc::new(Notify::new());
        let mut app = app_with(Arc::new(GatedEcho { gate: Arc::clone(&gate) }));
        app.start_chat(false);

        app.insert_str("first");
        app.submit();
        assert!(app.conversation.is_in_flight());
        assert_eq!(app.conversation.messages().len(), 2);

        app.insert_str("second");
        app.submit();
        assert_eq!(app.conversation.messages().len(), 2);
        assert_eq!(app.conversation.draft.text, "second");

        gate.notify_one();
        let task = app.reply_task.take().unwrap();
        let joined = task.await;
        app.complete_send(joined);

        let messages = app.conversation.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, ChatRole::Assistant);
        assert_eq!(messages[2].content, "echo: first");
        assert!(!app.conversation.is_in_flight());
    }

    #[tokio::test]
    async fn test_failed_send_shows_notice() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.start_chat(false);
        app.conversation.draft = Draft::free("hello");

        app.submit();
        let joined = app.reply_task.take().unwrap().await;
        app.complete_send(joined);

        assert_eq!(app.conversation.error(), Some(FAILURE_NOTICE));
        assert_eq!(app.conversation.messages().len(), 2);
    }

    #[test]
    fn test_empty_submit_spawns_nothing() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.start_chat(false);
        app.insert_str("   ");
        app.submit();
        assert!(app.reply_task.is_none());
        assert_eq!(app.conversation.messages().len(), 1);
    }

    #[test]
    fn test_scroll_follows_tail_until_user_scrolls() {
        let mut app = app_with(Arc::new(AlwaysFails));
        app.update_chat_metrics(50, 10);
        assert_eq!(app.chat_scroll, 40);

        app.scroll_up(5);
        assert!(!app.follow_tail);
        app.update_chat_metrics(60, 10);
        assert_eq!(app.chat_scroll, 35);

        app.scroll_down(100);
        assert_eq!(app.chat_scroll, 50);
        assert!(app.follow_tail);
    }
}
