//! Rendering surface.
//!
//! [`View`] is the only place that knows how things are displayed. The
//! controllers and the round machine hand it plain values; the text for
//! transcript lines, player rows and leaderboard rows comes from the pure
//! helpers in this module so every renderer words things the same way.

use std::io::Write;

use crate::protocol::{LeaderboardEntry, LobbyPlayer, PlayerResult};

/// Styling class of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    RoundStart,
    RoundEnd,
    Info,
    Success,
    Error,
    Warning,
}

impl MessageCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundStart => "round-start",
            Self::RoundEnd => "round-end",
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buttons whose enablement the client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Login,
    Register,
    CheckUsername,
    Answer,
    Source,
    Leave,
}

impl Control {
    /// Resting label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Login => "Log in",
            Self::Register => "Create account",
            Self::CheckUsername => "Check",
            Self::Answer => "Answer",
            Self::Source => "Show source",
            Self::Leave => "Leave game",
        }
    }

    /// Label shown while a request started by this control is in flight.
    pub fn busy_label(self) -> &'static str {
        match self {
            Self::Login => "Logging in...",
            Self::Register => "Creating account...",
            Self::CheckUsername => "Checking...",
            Self::Answer | Self::Source | Self::Leave => self.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub enabled: bool,
    pub label: String,
}

impl ControlState {
    pub fn enabled(control: Control) -> Self {
        Self {
            enabled: true,
            label: control.label().to_string(),
        }
    }

    pub fn disabled(control: Control) -> Self {
        Self {
            enabled: false,
            label: control.label().to_string(),
        }
    }

    pub fn busy(control: Control) -> Self {
        Self {
            enabled: false,
            label: control.busy_label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Auth,
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTab {
    Login,
    Register,
}

/// The nickname availability line under the register form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub ok: bool,
}

impl StatusLine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: true,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: false,
        }
    }
}

/// Everything the client needs from a renderer.
pub trait View: Send {
    /// Append one line to the round transcript.
    fn append_message(&mut self, category: MessageCategory, text: &str);
    /// Replace the player list.
    fn render_players(&mut self, players: &[LobbyPlayer]);
    /// Replace the leaderboard.
    fn render_leaderboard(&mut self, entries: &[LeaderboardEntry]);
    fn render_user(&mut self, nickname: &str, points: i64);
    /// Fill the answer selector.
    fn render_parties(&mut self, parties: &[String]);
    fn set_control(&mut self, control: Control, state: ControlState);
    fn set_status(&mut self, status: StatusLine);
    fn alert(&mut self, text: &str);
    fn confirm(&mut self, text: &str) -> bool;
    fn show_page(&mut self, page: Page);
    fn switch_auth_tab(&mut self, tab: AuthTab);
    fn prefill_login(&mut self, nickname: &str);
    /// Empty the register inputs and the status line.
    fn clear_register_form(&mut self);
    fn clear_transcript(&mut self);
    fn open_external(&mut self, url: &str);
    fn set_loading(&mut self, loading: bool);

    /// Show the slogan of a new round. Defaults to a transcript banner.
    fn render_slogan(&mut self, round_number: u64, slogan: &str) {
        for (category, line) in round_start_lines(round_number, slogan) {
            self.append_message(category, &line);
        }
    }
}

// ── Text helpers ────────────────────────────────────────────────────

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Banner lines opening a round.
pub fn round_start_lines(round_number: u64, slogan: &str) -> Vec<(MessageCategory, String)> {
    vec![
        (MessageCategory::RoundStart, rule()),
        (MessageCategory::RoundStart, format!("🎮 ROUND #{round_number}")),
        (MessageCategory::RoundStart, rule()),
        (MessageCategory::Info, format!("\"{slogan}\"")),
    ]
}

/// Banner lines closing a round.
pub fn round_end_lines(correct_partei: &str) -> Vec<(MessageCategory, String)> {
    vec![
        (MessageCategory::RoundEnd, rule()),
        (MessageCategory::RoundEnd, "🏁 ROUND OVER".to_string()),
        (MessageCategory::RoundEnd, rule()),
        (
            MessageCategory::Success,
            format!("Correct answer: {correct_partei}"),
        ),
    ]
}

/// One transcript line of the result table.
pub fn result_line(result: &PlayerResult) -> (MessageCategory, String) {
    let nick = &result.nickname;
    let party = result.answered.as_deref().unwrap_or("?");
    if !result.could_answer {
        return (MessageCategory::Info, format!("{nick}: (joined during round)"));
    }
    match result.correct {
        None => (MessageCategory::Info, format!("{nick}: No answer")),
        Some(true) => (
            MessageCategory::Success,
            format!(
                "✓ {nick}: {party} [+{} point] (total: {})",
                result.points_earned, result.total_points
            ),
        ),
        Some(false) => (
            MessageCategory::Error,
            format!("✗ {nick}: {party} (total: {})", result.total_points),
        ),
    }
}

/// Status glyph for a lobby player.
pub fn player_glyph(player: &LobbyPlayer) -> &'static str {
    if player.answered {
        "✓"
    } else if !player.can_answer {
        "⊘"
    } else {
        "⏳"
    }
}

/// Player list rows, or a single placeholder row when empty.
pub fn player_rows(players: &[LobbyPlayer]) -> Vec<String> {
    if players.is_empty() {
        return vec!["No players".to_string()];
    }
    players
        .iter()
        .map(|p| format!("{} {} ({})", player_glyph(p), p.nickname, p.points))
        .collect()
}

pub fn rank_marker(rank: u32) -> String {
    match rank {
        1 => "🥇".to_string(),
        2 => "🥈".to_string(),
        3 => "🥉".to_string(),
        n => format!("{n}."),
    }
}

/// Leaderboard rows, or a single placeholder row when empty.
pub fn leaderboard_rows(entries: &[LeaderboardEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No entries".to_string()];
    }
    entries
        .iter()
        .map(|e| format!("{} {}: {}", rank_marker(e.rank), e.nickname, e.points))
        .collect()
}

// ── Console view ────────────────────────────────────────────────────

/// Line-oriented renderer for terminals.
///
/// `confirm` answers with a fixed value so the demo can run unattended.
#[derive(Debug)]
pub struct ConsoleView<W = std::io::Stdout> {
    out: W,
    auto_confirm: bool,
}

impl ConsoleView {
    pub fn stdout(auto_confirm: bool) -> Self {
        Self::new(std::io::stdout(), auto_confirm)
    }
}

impl<W: Write + Send> ConsoleView<W> {
    pub fn new(out: W, auto_confirm: bool) -> Self {
        Self { out, auto_confirm }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}") {
            tracing::debug!("console write failed: {e}");
        }
    }
}

impl<W: Write + Send> View for ConsoleView<W> {
    fn append_message(&mut self, category: MessageCategory, text: &str) {
        self.line(&format!("[{category}] {text}"));
    }

    fn render_players(&mut self, players: &[LobbyPlayer]) {
        self.line("── Players ──");
        for row in player_rows(players) {
            self.line(&format!("  {row}"));
        }
    }

    fn render_leaderboard(&mut self, entries: &[LeaderboardEntry]) {
        self.line("── Leaderboard ──");
        for row in leaderboard_rows(entries) {
            self.line(&format!("  {row}"));
        }
    }

    fn render_user(&mut self, nickname: &str, points: i64) {
        self.line(&format!("{nickname} · Points: {points}"));
    }

    fn render_parties(&mut self, parties: &[String]) {
        self.line(&format!("Parties: {}", parties.join(", ")));
    }

    fn set_control(&mut self, control: Control, state: ControlState) {
        tracing::trace!(?control, enabled = state.enabled, label = %state.label, "control");
    }

    fn set_status(&mut self, status: StatusLine) {
        self.line(&status.text);
    }

    fn alert(&mut self, text: &str) {
        self.line(&format!("! {text}"));
    }

    fn confirm(&mut self, text: &str) -> bool {
        self.line(&format!("? {text} [{}]", if self.auto_confirm { "yes" } else { "no" }));
        self.auto_confirm
    }

    fn show_page(&mut self, page: Page) {
        tracing::debug!(?page, "page");
    }

    fn switch_auth_tab(&mut self, tab: AuthTab) {
        tracing::debug!(?tab, "auth tab");
    }

    fn prefill_login(&mut self, nickname: &str) {
        tracing::debug!(nickname, "login prefilled");
    }

    fn clear_register_form(&mut self) {}

    fn clear_transcript(&mut self) {}

    fn open_external(&mut self, url: &str) {
        self.line(&format!("→ {url}"));
    }

    fn set_loading(&mut self, _loading: bool) {}
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn result(could_answer: bool, correct: Option<bool>) -> PlayerResult {
        PlayerResult {
            nickname: "ana".into(),
            could_answer,
            answered: correct.map(|_| "SPD".to_string()),
            correct,
            points_earned: i64::from(correct == Some(true)),
            total_points: 4,
        }
    }

    #[test]
    fn result_lines_follow_the_four_branches() {
        assert_eq!(
            result_line(&result(false, None)),
            (MessageCategory::Info, "ana: (joined during round)".into())
        );
        assert_eq!(
            result_line(&result(true, None)),
            (MessageCategory::Info, "ana: No answer".into())
        );
        assert_eq!(
            result_line(&result(true, Some(true))),
            (
                MessageCategory::Success,
                "✓ ana: SPD [+1 point] (total: 4)".into()
            )
        );
        assert_eq!(
            result_line(&result(true, Some(false))),
            (MessageCategory::Error, "✗ ana: SPD (total: 4)".into())
        );
    }

    #[test]
    fn could_answer_false_wins_over_correct() {
        let (_, text) = result_line(&result(false, Some(true)));
        assert_eq!(text, "ana: (joined during round)");
    }

    #[test]
    fn player_rows_use_status_glyphs() {
        let players = vec![
            LobbyPlayer {
                nickname: "a".into(),
                points: 1,
                answered: true,
                can_answer: true,
            },
            LobbyPlayer {
                nickname: "b".into(),
                points: 0,
                answered: false,
                can_answer: false,
            },
            LobbyPlayer {
                nickname: "c".into(),
                points: 2,
                answered: false,
                can_answer: true,
            },
        ];
        assert_eq!(player_rows(&players), vec!["✓ a (1)", "⊘ b (0)", "⏳ c (2)"]);
        assert_eq!(player_rows(&[]), vec!["No players"]);
    }

    #[test]
    fn leaderboard_rows_use_medals_for_podium() {
        let entries: Vec<_> = (1..=4)
            .map(|rank| LeaderboardEntry {
                rank,
                nickname: format!("p{rank}"),
                points: i64::from(10 - rank),
            })
            .collect();
        assert_eq!(
            leaderboard_rows(&entries),
            vec!["🥇 p1: 9", "🥈 p2: 8", "🥉 p3: 7", "4. p4: 6"]
        );
        assert_eq!(leaderboard_rows(&[]), vec!["No entries"]);
    }

    #[test]
    fn category_names_match_transcript_classes() {
        assert_eq!(MessageCategory::RoundStart.as_str(), "round-start");
        assert_eq!(MessageCategory::RoundEnd.as_str(), "round-end");
        assert_eq!(MessageCategory::Warning.to_string(), "warning");
    }

    #[test]
    fn console_view_writes_categorized_lines() {
        let mut view = ConsoleView::new(Vec::new(), true);
        view.append_message(MessageCategory::Info, "hello");
        view.render_slogan(2, "Mehr Mut");
        assert!(view.confirm("leave?"));
        let out = String::from_utf8(view.into_inner()).unwrap();
        assert!(out.contains("[info] hello"));
        assert!(out.contains("🎮 ROUND #2"));
        assert!(out.contains("\"Mehr Mut\""));
    }
}
