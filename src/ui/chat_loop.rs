//! Full-screen terminal chat loop.
//!
//! Single-threaded and event-driven: the loop interleaves keyboard
//! events, completed file reads, dictated transcript fragments, and
//! reply stream messages, re-rendering after each batch. The only
//! coordination primitive is the conversation's in-flight guard.

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::error::Error;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unicode_width::UnicodeWidthStr;

use crate::client::files::spawn_ingest;
use crate::client::voice::{SpeechRecognizer, UnavailableRecognizer, VoiceCapture};
use crate::client::{StreamMessage, TurnDispatcher, TurnParams};
use crate::commands::{self, Command};
use crate::core::config::Config;
use crate::core::conversation::Conversation;
use crate::core::message::AttachmentRef;
use crate::logging::TranscriptLog;

struct ChatApp {
    conversation: Conversation,
    input: String,
    pending: Vec<AttachmentRef>,
    current_response: String,
    notice: Option<String>,
    scroll_offset: u16,
    auto_scroll: bool,
    stream_id: u64,
    logging: TranscriptLog,
}

impl ChatApp {
    fn new(logging: TranscriptLog) -> Self {
        Self {
            conversation: Conversation::new(),
            input: String::new(),
            pending: Vec::new(),
            current_response: String::new(),
            notice: None,
            scroll_offset: 0,
            auto_scroll: true,
            stream_id: 0,
            logging,
        }
    }

    fn build_display_lines(&self) -> Vec<Line<'_>> {
        let mut lines = Vec::new();

        for msg in self.conversation.messages() {
            if msg.is_user() {
                lines.push(Line::from(vec![
                    Span::styled(
                        "You: ",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(msg.content.as_str(), Style::default().fg(Color::Cyan)),
                ]));
                lines.push(Line::from(""));
            } else {
                for content_line in msg.content.lines() {
                    lines.push(Line::from(Span::styled(
                        content_line,
                        Style::default().fg(Color::White),
                    )));
                }
                lines.push(Line::from(""));
            }
        }

        // Transient partial reply; not an addressable turn until the
        // stream closes.
        if self.conversation.is_in_flight() && !self.current_response.is_empty() {
            for content_line in self.current_response.lines() {
                lines.push(Line::from(Span::styled(
                    content_line.to_string(),
                    Style::default().fg(Color::White),
                )));
            }
            lines.push(Line::from(Span::styled(
                "▌",
                Style::default().fg(Color::DarkGray),
            )));
        }

        lines
    }

    fn max_scroll_offset(&self, available_height: u16) -> u16 {
        let total_lines = self.build_display_lines().len() as u16;
        total_lines.saturating_sub(available_height)
    }

    fn scroll_to_bottom(&mut self, available_height: u16) {
        if self.auto_scroll {
            self.scroll_offset = self.max_scroll_offset(available_height);
        }
    }

    /// Handle one reply stream message for the active turn.
    fn on_stream_message(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Chunk(fragment) => {
                self.current_response.push_str(&fragment);
            }
            StreamMessage::Error(error) => {
                self.notice = Some(error);
                if self.current_response.is_empty() {
                    // Transport failure before any output: the
                    // optimistic user turn stays, no assistant turn.
                    self.conversation.abort_turn();
                } else {
                    // Failure mid-reply: the partial output stands as
                    // the final answer.
                    self.finalize_reply();
                }
            }
            StreamMessage::End => {
                if self.conversation.is_in_flight() {
                    self.finalize_reply();
                }
            }
        }
    }

    fn finalize_reply(&mut self) {
        let content = std::mem::take(&mut self.current_response);
        if let Err(e) = self.logging.log_assistant(&content) {
            tracing::warn!(error = %e, "failed to log assistant turn");
        }
        self.conversation.commit_assistant(content);
    }

    fn status_line(&self) -> Line<'_> {
        if let Some(notice) = &self.notice {
            return Line::from(Span::styled(
                notice.as_str(),
                Style::default().fg(Color::Red),
            ));
        }
        let mut parts: Vec<String> = Vec::new();
        if self.conversation.is_in_flight() {
            parts.push("思考中...".to_string());
        }
        if !self.pending.is_empty() {
            let names: Vec<&str> = self.pending.iter().map(|a| a.name.as_str()).collect();
            parts.push(format!("attachments: {}", names.join(", ")));
        }
        Line::from(Span::styled(
            parts.join("  |  "),
            Style::default().fg(Color::DarkGray),
        ))
    }
}

fn ui(f: &mut Frame, app: &ChatApp, listening: bool) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    let lines = app.build_display_lines();
    let available_height = chunks[0].height.saturating_sub(1);
    let max_offset = (lines.len() as u16).saturating_sub(available_height);
    let scroll_offset = app.scroll_offset.min(max_offset);

    let messages = Paragraph::new(lines)
        .block(Block::default().title("Max-Win-Win 战略参谋"))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(messages, chunks[0]);

    f.render_widget(Paragraph::new(app.status_line()), chunks[1]);

    let input_title = if listening {
        "● 正在听写 (/voice 停止)"
    } else {
        "输入你的销售难题 (Enter 发送, /attach /voice /clear, Ctrl+C 退出)"
    };
    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(input_title))
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[2]);

    let cursor_x = chunks[2].x + 1 + input_cursor_offset(&app.input, chunks[2].width.saturating_sub(2));
    f.set_cursor_position((cursor_x, chunks[2].y + 1));
}

/// Cursor column for the input box: display width, not byte length,
/// clamped to the box interior.
fn input_cursor_offset(input: &str, max: u16) -> u16 {
    u16::try_from(input.width()).unwrap_or(u16::MAX).min(max)
}

pub async fn run(
    config: Config,
    endpoint_override: Option<String>,
    log_file: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let endpoint = endpoint_override.unwrap_or_else(|| config.endpoint().to_string());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs()))
        .build()?;

    let logging = TranscriptLog::new(log_file)?;
    let mut app = ChatApp::new(logging);
    let mut voice = VoiceCapture::new(UnavailableRecognizer);

    let (dispatcher, mut stream_rx) = TurnDispatcher::new();
    let (attach_tx, mut attach_rx) = mpsc::unbounded_channel::<AttachmentRef>();
    let cancel_token = CancellationToken::new();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(
        &mut terminal,
        &mut app,
        &mut voice,
        &dispatcher,
        &mut stream_rx,
        &attach_tx,
        &mut attach_rx,
        &cancel_token,
        &client,
        &endpoint,
    )
    .await;

    cancel_token.cancel();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<R: SpeechRecognizer>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut ChatApp,
    voice: &mut VoiceCapture<R>,
    dispatcher: &TurnDispatcher,
    stream_rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    attach_tx: &mpsc::UnboundedSender<AttachmentRef>,
    attach_rx: &mut mpsc::UnboundedReceiver<AttachmentRef>,
    cancel_token: &CancellationToken,
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui(f, app, voice.is_listening()))?;

        let terminal_height = terminal.size().map(|s| s.height).unwrap_or_default();
        // Input box, status line, and chat title.
        let available_height = terminal_height.saturating_sub(4).saturating_sub(1);

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Enter => {
                        handle_enter(app, voice, dispatcher, attach_tx, cancel_token, client, endpoint);
                        app.scroll_to_bottom(available_height);
                    }
                    KeyCode::Char(c) => {
                        app.input.push(c);
                    }
                    KeyCode::Backspace => {
                        app.input.pop();
                    }
                    KeyCode::Up => {
                        app.auto_scroll = false;
                        app.scroll_offset = app.scroll_offset.saturating_sub(1);
                    }
                    KeyCode::Down => {
                        let max = app.max_scroll_offset(available_height);
                        app.scroll_offset = app.scroll_offset.saturating_add(1).min(max);
                        if app.scroll_offset >= max {
                            app.auto_scroll = true;
                        }
                    }
                    _ => {}
                }
            }
        }

        // Completed file reads join the pending list as they finish.
        while let Ok(attachment) = attach_rx.try_recv() {
            app.pending.push(attachment);
        }

        // Dictated fragments fold into the compose buffer.
        voice.drain_into(&mut app.input);

        // Reply stream for the active turn; stale ids are ignored.
        let mut received_any = false;
        while let Ok((message, id)) = stream_rx.try_recv() {
            if id != app.stream_id {
                continue;
            }
            app.on_stream_message(message);
            received_any = true;
        }
        if received_any {
            app.scroll_to_bottom(available_height);
        }
    }
}

fn handle_enter<R: SpeechRecognizer>(
    app: &mut ChatApp,
    voice: &mut VoiceCapture<R>,
    dispatcher: &TurnDispatcher,
    attach_tx: &mpsc::UnboundedSender<AttachmentRef>,
    cancel_token: &CancellationToken,
    client: &reqwest::Client,
    endpoint: &str,
) {
    if let Some(parsed) = commands::parse(&app.input) {
        app.input.clear();
        match parsed {
            Ok(Command::Attach(paths)) => {
                spawn_ingest(paths, attach_tx.clone());
            }
            Ok(Command::Detach(name)) => {
                app.pending.retain(|a| a.name != name);
            }
            Ok(Command::Voice) => {
                if voice.is_listening() {
                    voice.stop();
                } else if let Err(e) = voice.start() {
                    app.notice = Some(e.to_string());
                }
            }
            Ok(Command::Clear) => {
                app.conversation.clear();
                app.notice = None;
            }
            Err(usage) => {
                app.notice = Some(usage);
            }
        }
        return;
    }

    let text = std::mem::take(&mut app.input);
    let Some(outbound) = app.conversation.submit_turn(&text, &mut app.pending) else {
        // Rejected turns put the draft back and keep the staged
        // attachments instead of losing either.
        app.input = text;
        return;
    };

    app.notice = None;
    app.current_response.clear();
    app.stream_id += 1;
    if let Some(user_turn) = app.conversation.messages().last() {
        if let Err(e) = app.logging.log_user(&user_turn.content) {
            tracing::warn!(error = %e, "failed to log user turn");
        }
    }

    dispatcher.spawn_turn(TurnParams {
        client: client.clone(),
        endpoint: endpoint.to_string(),
        request: outbound.request,
        cancel_token: cancel_token.clone(),
        stream_id: app.stream_id,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> ChatApp {
        ChatApp::new(TranscriptLog::new(None).unwrap())
    }

    #[test]
    fn fragments_accumulate_and_commit_as_one_turn() {
        let mut app = test_app();
        app.conversation.submit_turn("问题", &mut Vec::new());

        app.on_stream_message(StreamMessage::Chunk("结论：".to_string()));
        app.on_stream_message(StreamMessage::Chunk("先稳住".to_string()));
        assert_eq!(app.conversation.messages().len(), 1);

        app.on_stream_message(StreamMessage::End);
        assert_eq!(app.conversation.messages().len(), 2);
        assert_eq!(app.conversation.messages()[1].content, "结论：先稳住");
        assert!(!app.conversation.is_in_flight());
        assert!(app.current_response.is_empty());
    }

    #[test]
    fn error_before_output_leaves_history_unchanged() {
        let mut app = test_app();
        app.conversation.submit_turn("问题", &mut Vec::new());

        app.on_stream_message(StreamMessage::Error("connection refused".to_string()));
        app.on_stream_message(StreamMessage::End);

        assert_eq!(app.conversation.messages().len(), 1);
        assert!(!app.conversation.is_in_flight());
        assert_eq!(app.notice.as_deref(), Some("connection refused"));
    }

    #[test]
    fn mid_stream_error_keeps_the_partial_reply() {
        let mut app = test_app();
        app.conversation.submit_turn("问题", &mut Vec::new());

        app.on_stream_message(StreamMessage::Chunk("结论：".to_string()));
        app.on_stream_message(StreamMessage::Chunk("这不是...".to_string()));
        app.on_stream_message(StreamMessage::Error("connection reset".to_string()));
        app.on_stream_message(StreamMessage::End);

        assert_eq!(app.conversation.messages().len(), 2);
        assert_eq!(app.conversation.messages()[1].content, "结论：这不是...");
        assert!(!app.conversation.is_in_flight());
    }

    #[test]
    fn buffered_reply_commits_directly() {
        let mut app = test_app();
        app.conversation.submit_turn("问题", &mut Vec::new());

        app.on_stream_message(StreamMessage::Chunk("1 结论\n先闭嘴".to_string()));
        app.on_stream_message(StreamMessage::End);
        assert_eq!(app.conversation.messages()[1].content, "1 结论\n先闭嘴");
    }

    #[tokio::test]
    async fn rejected_enter_keeps_draft_and_staged_attachments() {
        use crate::core::message::{AttachmentPayload, MimeClass};

        let mut app = test_app();
        app.conversation.submit_turn("第一个问题", &mut Vec::new());
        app.pending.push(AttachmentRef {
            name: "a.txt".to_string(),
            mime_class: MimeClass::Text,
            payload: AttachmentPayload::Text("报价历史".to_string()),
        });
        app.input = "第二个问题".to_string();

        let mut voice = VoiceCapture::new(UnavailableRecognizer);
        let (dispatcher, _stream_rx) = TurnDispatcher::new();
        let (attach_tx, _attach_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let client = reqwest::Client::new();
        handle_enter(
            &mut app,
            &mut voice,
            &dispatcher,
            &attach_tx,
            &cancel_token,
            &client,
            "http://127.0.0.1:9/api/chat",
        );

        // The in-flight guard rejected the turn: nothing was sent and
        // nothing the user staged was lost.
        assert_eq!(app.pending.len(), 1);
        assert_eq!(app.input, "第二个问题");
        assert_eq!(app.conversation.messages().len(), 1);
    }

    #[test]
    fn cursor_offset_uses_display_width_and_clamps() {
        assert_eq!(input_cursor_offset("abc", 40), 3);
        // CJK characters occupy two columns each.
        assert_eq!(input_cursor_offset("客户压价", 40), 8);
        assert_eq!(input_cursor_offset("客户压价", 5), 5);
    }
}
