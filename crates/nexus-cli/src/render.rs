use nexus_core::session::ChatSession;
use nexus_core::turn::{ChatTurn, Role, Source};

const EXCERPT_CHARS: usize = 60;

/// Turns successive snapshots of the in-flight answer into terminal output.
///
/// Streaming only appends, so normally just the new suffix is printed. If
/// the text was replaced (the error message after a failed stream), the
/// whole text is printed again on a fresh line.
#[derive(Debug, Default)]
pub struct AnswerPrinter {
    printed: String,
}

impl AnswerPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// What to write for the latest `text`, or `None` if nothing changed.
    pub fn update(&mut self, text: &str) -> Option<String> {
        if text == self.printed {
            return None;
        }
        let out = match text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{text}"),
        };
        self.printed = text.to_string();
        Some(out)
    }
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "nexus",
    }
}

/// Source badges under an answer, one per line.
pub fn sources_block(turn: &ChatTurn) -> Option<String> {
    if turn.sources.is_empty() {
        return None;
    }
    let lines: Vec<String> = turn.sources.iter().map(source_line).collect();
    Some(format!("sources:\n{}", lines.join("\n")))
}

fn source_line(source: &Source) -> String {
    let mut line = match source.score {
        Some(score) => format!("  [{}] {:.0}%", source.label(), score * 100.0),
        None => format!("  [{}]", source.label()),
    };
    if source.has_content() {
        let excerpt: String = source.content.chars().take(EXCERPT_CHARS).collect();
        let ellipsis = if source.content.chars().count() > EXCERPT_CHARS { "..." } else { "" };
        line.push_str(&format!(" {}{ellipsis}", excerpt.replace('\n', " ")));
    }
    line
}

pub fn transcript(session: &ChatSession) -> String {
    let mut out = Vec::new();
    for turn in session.turns() {
        out.push(format!("{}> {}", role_label(turn.role), turn.text));
        if let Some(block) = sources_block(turn) {
            out.push(block);
        }
    }
    out.join("\n")
}
