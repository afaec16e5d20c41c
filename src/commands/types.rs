//! Command types and definitions.

use std::fmt;

use crate::diagnosis::Severity;

/// Arguments of `/diagnose`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnoseArgs {
    /// Requested level; the handler falls back to the default level.
    pub level: Option<Severity>,

    /// Handle from an `@handle` argument, without the `@`.
    pub mention: Option<String>,
}

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Diagnose a mentioned, replied-to or random member.
    Diagnose(DiagnoseArgs),

    /// Re-read the chat's member list right away.
    Refresh,

    /// Show what the bot currently knows about the chat's members.
    Members,

    /// Show help information.
    Help,

    /// Greeting sent when a user starts the bot.
    Start,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Accepts `/cmd` and `/cmd@BotName`. When `bot_username` is known, a
    /// command addressed to a different bot is ignored. Returns `None` if
    /// the message is not a command for this bot.
    #[must_use]
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (head, args) = match after_slash.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (after_slash, ""),
        };

        let cmd = match head.split_once('@') {
            Some((cmd, target)) => {
                if let Some(own) = bot_username
                    && !target.eq_ignore_ascii_case(own.trim_start_matches('@'))
                {
                    return None;
                }
                cmd
            }
            None => head,
        };

        match cmd.to_lowercase().as_str() {
            "diagnose" | "diagnosis" | "diag" | "диагноз" => Some(Self::Diagnose(Self::parse_diagnose(args))),
            "refresh" | "update" => Some(Self::Refresh),
            "members" | "who" => Some(Self::Members),
            "help" | "h" => Some(Self::Help),
            "start" => Some(Self::Start),
            _ => None,
        }
    }

    /// Parses `[level] [@handle]` in any order. The first level and the
    /// first mention win; anything else is ignored.
    fn parse_diagnose(args: &str) -> DiagnoseArgs {
        let mut parsed = DiagnoseArgs::default();

        for token in args.split_whitespace() {
            if let Some(handle) = token.strip_prefix('@') {
                let handle = handle.trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '_'));
                if parsed.mention.is_none() && !handle.is_empty() {
                    parsed.mention = Some(handle.to_owned());
                }
            } else if parsed.level.is_none()
                && let Ok(level) = token.parse::<Severity>()
            {
                parsed.level = Some(level);
            }
        }

        parsed
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Diagnose(_) => "diagnose",
            Self::Refresh => "refresh",
            Self::Members => "members",
            Self::Help => "help",
            Self::Start => "start",
        }
    }

    /// Returns all available commands with their descriptions.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/diagnose [1-3] [@user]", "Поставить диагноз (случайному участнику, если никто не указан)"),
            ("/refresh", "Обновить список участников чата"),
            ("/members", "Сколько участников известно боту"),
            ("/help", "Показать эту справку"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diagnose(args) => {
                write!(f, "diagnose")?;
                if let Some(level) = args.level {
                    write!(f, " {level}")?;
                }
                if let Some(handle) = &args.mention {
                    write!(f, " @{handle}")?;
                }
                Ok(())
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Reply text for the chat.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
