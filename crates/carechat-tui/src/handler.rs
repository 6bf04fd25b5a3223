use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tracing::warn;
use carechat_core::{ComposeMode, Config};
use crate::app::{App, QaField, Screen, SetupFocus};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work on any screen
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.screen {
        Screen::Setup => handle_setup_key(app, key),
        Screen::Chat => handle_chat_key(app, key),
    }
}

fn handle_setup_key(app: &mut App, key: KeyEvent) {
    match (app.setup_focus, key.code) {
        (_, KeyCode::Enter) => {
            app.start_chat(true);
            remember_behavior(app);
        }
        (_, KeyCode::Esc) => {
            app.start_chat(false);
        }
        (_, KeyCode::Tab) | (_, KeyCode::BackTab) => app.toggle_setup_focus(),

        (SetupFocus::Categories, KeyCode::Char('q')) => app.should_quit = true,
        (SetupFocus::Categories, KeyCode::Char('j') | KeyCode::Down) => app.setup_nav_down(),
        (SetupFocus::Categories, KeyCode::Char('k') | KeyCode::Up) => app.setup_nav_up(),

        (SetupFocus::CustomName, _) => handle_text_key(app, key),
        _ => {}
    }
}

fn handle_chat_key(app: &mut App, key: KeyEvent) {
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    match key.code {
        KeyCode::Esc => app.back_to_setup(),
        KeyCode::Tab | KeyCode::BackTab => app.toggle_mode(),

        KeyCode::Enter if alt || shift => {
            // The question is a one-liner; newlines only make sense elsewhere
            if !(app.compose_mode() == ComposeMode::Qa && app.qa_field == QaField::Question) {
                app.insert_char('\n');
            }
        }
        KeyCode::Enter => {
            if app.compose_mode() == ComposeMode::Qa && app.qa_field == QaField::Question {
                app.switch_qa_field();
            } else {
                app.submit();
            }
        }

        KeyCode::Up | KeyCode::Down => app.switch_qa_field(),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),

        _ => handle_text_key(app, key),
    }
}

/// Cursor movement and editing shared by every text input
fn handle_text_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => app.delete_back(),
        KeyCode::Delete => app.delete_forward(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.insert_char(c),
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    let single_line = app.screen == Screen::Setup
        || (app.compose_mode() == ComposeMode::Qa && app.qa_field == QaField::Question);
    if single_line {
        let flattened: String = text
            .replace("\r\n", " ")
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        app.insert_str(&flattened);
    } else {
        app.insert_str(&text.replace("\r\n", "\n"));
    }
}

fn remember_behavior(app: &App) {
    let Some(path) = app.config_path.as_deref() else {
        return;
    };
    if let Err(err) = Config::save_last_behavior_to(path, app.conversation.behavior()) {
        warn!(error = %err, path = %path.display(), "could not save selected behavior");
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.screen != Screen::Chat {
        return;
    }
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
