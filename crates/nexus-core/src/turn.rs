use serde::{Deserialize, Serialize};

/// Content a source carries when the backend sent only a file name.
pub const NO_CONTENT: &str = "no content available";

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A retrieved reference snippet backing an assistant answer.
///
/// Deserializes from either a bare file name (`"a.pdf"`) or a record
/// (`{"source_file": "a.pdf", "score": 0.9, "content": "..."}`); both end
/// up in this normalized shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SourceRepr")]
pub struct Source {
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceRepr {
    Name(String),
    Record {
        source_file: String,
        #[serde(default)]
        score: Option<f64>,
        #[serde(default)]
        content: Option<String>,
    },
}

impl From<SourceRepr> for Source {
    fn from(repr: SourceRepr) -> Self {
        match repr {
            SourceRepr::Name(name) => Source::named(name),
            SourceRepr::Record {
                source_file,
                score,
                content,
            } => Source {
                source_file,
                score: score.filter(|s| s.is_finite() && (0.0..=1.0).contains(s)),
                content: content.unwrap_or_else(|| NO_CONTENT.into()),
            },
        }
    }
}

impl Source {
    /// A source known only by file name.
    pub fn named(source_file: impl Into<String>) -> Self {
        Source {
            source_file: source_file.into(),
            score: None,
            content: NO_CONTENT.into(),
        }
    }

    pub fn new(source_file: impl Into<String>, score: Option<f64>, content: impl Into<String>) -> Self {
        Source {
            source_file: source_file.into(),
            score,
            content: content.into(),
        }
    }

    /// Name shown on the source badge.
    pub fn label(&self) -> &str {
        &self.source_file
    }

    pub fn has_content(&self) -> bool {
        self.content != NO_CONTENT
    }
}

/// One message in a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::User,
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::Assistant,
            text: text.into(),
            sources: Vec::new(),
        }
    }

    /// Empty assistant turn appended when a submission starts.
    pub fn placeholder() -> Self {
        Self::assistant("")
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
