use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use chrono::Local;
use carechat_core::timeline::time_label;
use carechat_core::{local_timeline, ChatRole, ComposeMode, TimelineItem, UrlSource, DEFAULT_BEHAVIORS};
use crate::app::{App, QaField, Screen, SetupFocus};

const ACCENT: Color = Color::Rgb(0x1E, 0xA3, 0x62);
const USER_BUBBLE: Color = Color::Rgb(0xC5, 0xEC, 0xBD);

/// Display width of a single character in terminal cells
fn char_width(c: char) -> usize {
    let mut buf = [0u8; 4];
    Span::raw(&*c.encode_utf8(&mut buf)).width()
}

fn str_width(s: &str) -> usize {
    Span::raw(s).width()
}

const TAB_WIDTH: usize = 4;

/// Hard-wrap text to `max_width` cells, keeping explicit line breaks.
/// Tabs expand to the next tab stop and other control characters (`\r`
/// included) are dropped.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut wrapped = Vec::new();

    for line in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;
        let mut push = |c: char, current: &mut String, current_width: &mut usize| {
            let w = char_width(c);
            if *current_width + w > max_width && !current.is_empty() {
                wrapped.push(std::mem::take(current));
                *current_width = 0;
            }
            current.push(c);
            *current_width += w;
        };
        for c in line.chars() {
            if c == '\t' {
                let spaces = TAB_WIDTH - current_width % TAB_WIDTH;
                for _ in 0..spaces {
                    push(' ', &mut current, &mut current_width);
                }
            } else if !c.is_control() {
                push(c, &mut current, &mut current_width);
            }
        }
        wrapped.push(current);
    }

    wrapped
}

/// The slice of a single-line input that fits in `width` cells with the
/// cursor visible, plus the cursor's x offset within it.
fn visible_input(text: &str, cursor: usize, width: usize) -> (String, u16) {
    // Newlines are shown as a marker so the input stays on one row
    let chars: Vec<char> = text
        .chars()
        .map(|c| if c == '\n' { '↵' } else { c })
        .collect();
    let cursor = cursor.min(chars.len());

    // Walk left from the cursor; one cell is reserved for the cursor itself
    let mut start = cursor;
    let mut used = 1;
    while start > 0 {
        let w = char_width(chars[start - 1]);
        if used + w > width {
            break;
        }
        used += w;
        start -= 1;
    }

    let cursor_x: usize = chars[start..cursor].iter().map(|c| char_width(*c)).sum();

    let mut visible = String::new();
    let mut total = 0;
    for &c in &chars[start..] {
        let w = char_width(c);
        if total + w > width {
            break;
        }
        total += w;
        visible.push(c);
    }

    (visible, cursor_x as u16)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Setup => render_setup_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let source = app.endpoint.source();
    let badge = format!(" {} ", source.badge());
    let badge_style = match source {
        UrlSource::Env => Style::default().bg(Color::Green).fg(Color::Black),
        UrlSource::Config => Style::default().bg(Color::Cyan).fg(Color::Black),
        UrlSource::Default => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let [title_area, badge_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(str_width(&badge) as u16),
    ])
    .areas(area);

    let status = match app.screen {
        Screen::Setup => " チャットを始める前に ".to_string(),
        Screen::Chat => format!(" online ・ 文脈: {} ", app.context_label()),
    };

    let title = Line::from(vec![
        Span::styled(" Chat ", Style::default().fg(Color::White).bg(ACCENT).bold()),
        Span::styled(status, Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, title_area);
    frame.render_widget(Paragraph::new(Span::styled(badge, badge_style)), badge_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_text = match app.screen {
        Screen::Setup => " SETUP ",
        Screen::Chat => match app.compose_mode() {
            ComposeMode::Free => " FREE ",
            ComposeMode::Qa => " Q&A ",
        },
    };
    let mode_style = Style::default().bg(ACCENT).fg(Color::White);

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = Vec::new();
    match app.screen {
        Screen::Setup => {
            if app.setup_focus == SetupFocus::CustomName {
                hints.extend(vec![
                    Span::styled(" Tab ", key_style),
                    Span::styled(" list ", label_style),
                ]);
            } else {
                hints.extend(vec![
                    Span::styled(" j/k ", key_style),
                    Span::styled(" select ", label_style),
                ]);
                if app.other_selected() {
                    hints.extend(vec![
                        Span::styled(" Tab ", key_style),
                        Span::styled(" name ", label_style),
                    ]);
                }
            }
            hints.extend(vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" start ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" no context ", label_style),
            ]);
        }
        Screen::Chat => {
            let enter_label = match (app.compose_mode(), app.qa_field) {
                (ComposeMode::Qa, QaField::Question) => " next ",
                _ => " send ",
            };
            hints.extend(vec![
                Span::styled(" Enter ", key_style),
                Span::styled(enter_label, label_style),
                Span::styled(" Alt+Enter ", key_style),
                Span::styled(" newline ", label_style),
                Span::styled(" Tab ", key_style),
                Span::styled(" mode ", label_style),
            ]);
            if app.compose_mode() == ComposeMode::Qa {
                hints.extend(vec![
                    Span::styled(" ↑/↓ ", key_style),
                    Span::styled(" field ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" PgUp/PgDn ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" context ", label_style),
            ]);
        }
    }
    hints.extend(vec![
        Span::styled(" C-c ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_setup_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let panel_width = 60.min(area.width);
    let [_, panel, _] = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(panel_width),
        Constraint::Fill(1),
    ])
    .areas(area);

    let custom_height = if app.other_selected() { 3 } else { 0 };
    let [intro_area, list_area, custom_area, note_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(DEFAULT_BEHAVIORS.len() as u16 + 2),
        Constraint::Length(custom_height),
        Constraint::Min(0),
    ])
    .areas(panel);

    let intro = Paragraph::new(vec![
        Line::from(Span::styled("対象の「問題行動」を選んでください", Style::default().bold())),
        Line::default(),
    ]);
    frame.render_widget(intro, intro_area);

    let list_focused = app.setup_focus == SetupFocus::Categories;
    let list_border = if list_focused { ACCENT } else { Color::DarkGray };
    let items: Vec<ListItem> = DEFAULT_BEHAVIORS
        .iter()
        .map(|label| ListItem::new(format!(" {} ", label)))
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(list_border))
                .title(" 問題行動 "),
        )
        .highlight_style(
            Style::default()
                .bg(ACCENT)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.behavior_state);

    if custom_height > 0 {
        let custom_focused = app.setup_focus == SetupFocus::CustomName;
        let border = if custom_focused { Color::Yellow } else { Color::DarkGray };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" 具体名（任意） ");
        render_input(
            frame,
            custom_area,
            block,
            &app.custom_behavior,
            "例）ネット依存、深夜外出 など",
            custom_focused.then_some(app.cursor),
        );
    }

    let note = Paragraph::new("* 選んだ内容はチャットの文脈に含めてサーバーへ送信されます。")
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    frame.render_widget(note, note_area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let composer_height = match app.compose_mode() {
        ComposeMode::Free => 3,
        ComposeMode::Qa => 6,
    };
    let [chat_area, mode_area, composer_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(composer_height),
    ])
    .areas(area);

    // Store area for mouse hit-testing
    app.chat_area = Some(chat_area);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .title(format!(" POST: {} ", app.endpoint.chat_url()));

    let inner = chat_block.inner(chat_area);
    let lines = thread_lines(app, inner.width as usize);
    let total = lines.len().min(u16::MAX as usize) as u16;
    app.update_chat_metrics(total, inner.height);

    let chat = Paragraph::new(lines)
        .block(chat_block)
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_mode_bar(app, frame, mode_area);
    render_composer(app, frame, composer_area);
}

/// The message thread as pre-wrapped lines, so the line count is exact.
fn thread_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    let conversation = &app.conversation;
    let bubble_width = (width * 3 / 4).saturating_sub(2).max(1);
    let meta_style = Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line<'static>> = Vec::new();

    for item in local_timeline(conversation.messages()) {
        match item {
            TimelineItem::DateSeparator { label, .. } => {
                lines.push(
                    Line::from(Span::styled(
                        format!(" {} ", label),
                        Style::default().fg(Color::Gray).bg(Color::DarkGray),
                    ))
                    .alignment(Alignment::Center),
                );
                lines.push(Line::default());
            }
            TimelineItem::Message(message) => {
                let is_user = message.role == ChatRole::User;
                let (name, bubble_style, alignment) = if is_user {
                    (
                        "Me",
                        Style::default().bg(USER_BUBBLE).fg(Color::Black),
                        Alignment::Right,
                    )
                } else {
                    (
                        "AI",
                        Style::default().bg(Color::White).fg(Color::Black),
                        Alignment::Left,
                    )
                };

                let name_span = Span::styled(
                    name,
                    Style::default()
                        .fg(if is_user { Color::Green } else { ACCENT })
                        .add_modifier(Modifier::BOLD),
                );
                let time_span = Span::styled(format!(" {}", time_label(message, &Local)), meta_style);
                lines.push(Line::from(vec![name_span, time_span]).alignment(alignment));

                // Pad every row to the widest one so the bubble reads as a block
                let rows = wrap_text(&message.content, bubble_width);
                let widest = rows.iter().map(|r| str_width(r)).max().unwrap_or(0);
                for row in rows {
                    let padding = " ".repeat(widest - str_width(&row));
                    lines.push(
                        Line::from(Span::styled(format!(" {}{} ", row, padding), bubble_style))
                            .alignment(alignment),
                    );
                }
                lines.push(Line::default());
            }
        }
    }

    if conversation.is_in_flight() {
        lines.push(Line::from(Span::styled(
            "AI",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("応答を生成中{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
        lines.push(Line::default());
    }

    if let Some(error) = conversation.error() {
        for row in wrap_text(error, width.saturating_sub(2)) {
            lines.push(
                Line::from(Span::styled(
                    row,
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ))
                .alignment(Alignment::Center),
            );
        }
    }

    lines
}

fn render_mode_bar(app: &App, frame: &mut Frame, area: Rect) {
    let active = Style::default().bg(Color::White).fg(Color::Black).bold();
    let inactive = Style::default().fg(Color::DarkGray);

    let mut spans = Vec::new();
    for mode in [ComposeMode::Free, ComposeMode::Qa] {
        let style = if mode == app.compose_mode() { active } else { inactive };
        spans.push(Span::styled(format!(" {} ", mode.display_name()), style));
        spans.push(Span::raw(" "));
    }

    let [modes_area, hint_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(32),
    ])
    .areas(area);

    frame.render_widget(Paragraph::new(Line::from(spans)), modes_area);
    frame.render_widget(
        Paragraph::new("Enterで送信 / Alt+Enterで改行")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Right),
        hint_area,
    );
}

fn render_composer(app: &App, frame: &mut Frame, area: Rect) {
    let conversation = &app.conversation;
    let send_span = if conversation.can_send() {
        Span::styled(" 送信 ", Style::default().bg(ACCENT).fg(Color::White).bold())
    } else {
        Span::styled(" 送信 ", Style::default().fg(Color::DarkGray))
    };

    let input_block = |title: &'static str, focused: bool, with_send: bool| {
        let border = if focused { Color::Yellow } else { Color::DarkGray };
        let mut block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(title);
        if with_send {
            block = block.title_bottom(Line::from(send_span.clone()).alignment(Alignment::Right));
        }
        block
    };

    match app.compose_mode() {
        ComposeMode::Free => {
            render_input(
                frame,
                area,
                input_block(" メッセージを入力 ", true, true),
                &conversation.draft.text,
                "例）うるさくてキレた",
                Some(app.cursor),
            );
        }
        ComposeMode::Qa => {
            let [question_area, answer_area] = Layout::vertical([
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .areas(area);

            let question_focused = app.qa_field == QaField::Question;
            render_input(
                frame,
                question_area,
                input_block(" 支援者の問い ", question_focused, false),
                &conversation.draft.question,
                "例：最近万引きしたくなったきっかけは？",
                question_focused.then_some(app.cursor),
            );
            render_input(
                frame,
                answer_area,
                input_block(" 当人の回答 ", !question_focused, true),
                &conversation.draft.answer,
                "例：お金がなくて…",
                (!question_focused).then_some(app.cursor),
            );
        }
    }
}

/// A bordered single-line input. The terminal cursor is placed when `cursor` is set.
fn render_input(
    frame: &mut Frame,
    area: Rect,
    block: Block,
    text: &str,
    placeholder: &str,
    cursor: Option<usize>,
) {
    let inner = block.inner(area);
    let (visible, cursor_x) = visible_input(text, cursor.unwrap_or(0), inner.width as usize);

    let content = if text.is_empty() {
        Paragraph::new(Span::styled(placeholder.to_string(), Style::default().fg(Color::DarkGray)))
    } else {
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(content.block(block), area);

    if cursor.is_some() && inner.width > 0 && inner.height > 0 {
        frame.set_cursor_position((inner.x + cursor_x.min(inner.width - 1), inner.y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_ascii() {
        assert_eq!(wrap_text("abcdefg", 3), vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_wrap_keeps_line_breaks_and_blank_lines() {
        assert_eq!(wrap_text("ab\n\ncd", 10), vec!["ab", "", "cd"]);
    }

    #[test]
    fn test_wrap_counts_wide_characters_double() {
        // Each kana is two cells wide
        assert_eq!(wrap_text("おかねがなくて", 6), vec!["おかね", "がなく", "て"]);
    }

    #[test]
    fn test_wrap_never_yields_empty_rows_for_narrow_width() {
        assert_eq!(wrap_text("あい", 1), vec!["あ", "い"]);
    }

    #[test]
    fn test_wrap_drops_carriage_returns_and_expands_tabs() {
        assert_eq!(wrap_text("ab\r\ncd\r", 10), vec!["ab", "cd"]);
        assert_eq!(wrap_text("a\tb", 10), vec!["a   b"]);
        assert_eq!(wrap_text("\tx", 3), vec!["   ", " x"]);
    }

    #[test]
    fn test_visible_input_short_text() {
        let (visible, x) = visible_input("hello", 5, 20);
        assert_eq!(visible, "hello");
        assert_eq!(x, 5);
    }

    #[test]
    fn test_visible_input_scrolls_to_cursor() {
        let (visible, x) = visible_input("abcdefghij", 10, 5);
        assert_eq!(visible, "ghij");
        assert_eq!(x, 4);
    }

    #[test]
    fn test_visible_input_wide_characters() {
        let (visible, x) = visible_input("あいうえお", 5, 7);
        // Three wide characters plus the cursor cell
        assert_eq!(visible, "うえお");
        assert_eq!(x, 6);
    }

    #[test]
    fn test_visible_input_marks_newlines() {
        let (visible, _) = visible_input("a\nb", 0, 10);
        assert_eq!(visible, "a↵b");
    }
}
