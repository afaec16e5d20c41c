//! Command handler implementation.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{BotCommand, CommandResult, DiagnoseArgs};
use crate::diagnosis::{DiagnosisComposer, DiagnosisStyle, Severity};
use crate::directory::{Member, MemberDirectory, RetrievalError, Snapshot};
use crate::platform::{ChatPlatform, IncomingMessage, with_timeout};

/// How the diagnosed member was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectSource {
    Mention,
    Reply,
    Random,
    Issuer,
}

/// The member a diagnosis is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub member: Member,
    pub source: SubjectSource,
}

impl Subject {
    const fn new(member: Member, source: SubjectSource) -> Self {
        Self { member, source }
    }
}

/// Handles bot commands for all chats.
pub struct CommandHandler {
    /// Shared member directory.
    directory: Arc<MemberDirectory>,

    composer: DiagnosisComposer,

    style: DiagnosisStyle,

    /// Random source for member and word selection.
    rng: Mutex<StdRng>,

    /// Own username, used to ignore `/cmd@OtherBot`.
    bot_username: Option<String>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(directory: Arc<MemberDirectory>, composer: DiagnosisComposer, style: DiagnosisStyle) -> Self {
        Self {
            directory,
            composer,
            style,
            rng: Mutex::new(StdRng::from_entropy()),
            bot_username: None,
        }
    }

    /// Replaces the random source, e.g. with a seeded one.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    #[must_use]
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command for this bot.
    /// Failures come back as an error result carrying a short apology;
    /// details only go to the log.
    pub async fn try_handle<P: ChatPlatform>(&self, platform: &P, message: &IncomingMessage) -> Option<CommandResult> {
        let command = BotCommand::parse(&message.text, self.bot_username.as_deref())?;

        debug!(chat_id = %message.chat_id, command = %command, "Handling command");
        let result = self.execute(platform, message, &command).await;
        info!(
            chat_id = %message.chat_id,
            command = command.name(),
            success = result.success,
            "Command handled"
        );

        Some(result)
    }

    /// Executes a parsed command.
    async fn execute<P: ChatPlatform>(
        &self,
        platform: &P,
        message: &IncomingMessage,
        command: &BotCommand,
    ) -> CommandResult {
        let outcome = match command {
            BotCommand::Diagnose(args) => self.handle_diagnose(platform, message, args).await,
            BotCommand::Refresh => self.handle_refresh(platform, message).await,
            BotCommand::Members => Ok(self.handle_members(message).await),
            BotCommand::Help => Ok(Self::handle_help()),
            BotCommand::Start => Ok(Self::handle_start()),
        };

        outcome.unwrap_or_else(|e| {
            warn!(
                chat_id = %message.chat_id,
                command = %command,
                error = %e,
                "Command failed"
            );
            CommandResult::error(apology(&e))
        })
    }

    async fn handle_diagnose<P: ChatPlatform>(
        &self,
        platform: &P,
        message: &IncomingMessage,
        args: &DiagnoseArgs,
    ) -> Result<CommandResult, RetrievalError> {
        let subject = self.resolve_subject(platform, message, args).await?;
        let level = args.level.unwrap_or_default();

        let text = {
            let mut rng = self.rng.lock().await;
            let diagnosis = self.composer.compose_severity(level, &mut *rng);
            diagnosis.render(self.style, &mut *rng)
        };

        debug!(
            chat_id = %message.chat_id,
            subject = %subject.member.id,
            source = ?subject.source,
            level = %level,
            "Diagnosis composed"
        );

        Ok(CommandResult::success(format_diagnosis(&subject.member, level, &text)))
    }

    /// Picks the diagnosis subject: mention, then reply target, then a
    /// random member, then the issuer.
    ///
    /// The replied-to message is looked up at most once and the directory
    /// is refreshed at most once per command. A refresh that finds nobody
    /// falls back to the issuer; other refresh failures are returned.
    pub async fn resolve_subject<P: ChatPlatform>(
        &self,
        platform: &P,
        message: &IncomingMessage,
        args: &DiagnoseArgs,
    ) -> Result<Subject, RetrievalError> {
        let chat = message.chat_id;
        let mut refreshed: Option<Result<Arc<Snapshot>, RetrievalError>> = None;

        if let Some(handle) = &args.mention
            && message.sender.handle_matches(handle)
        {
            return Ok(Subject::new(message.sender.clone(), SubjectSource::Mention));
        }

        let reply_target = self.reply_target(platform, message).await;

        if let Some(handle) = &args.mention {
            // A mentioned reply target needs no directory lookup.
            if let Some(member) = reply_target.as_ref().filter(|m| m.handle_matches(handle)) {
                return Ok(Subject::new(member.clone(), SubjectSource::Mention));
            }

            let result = self.directory.ensure_fresh(chat, platform, false).await;
            if result.is_ok()
                && let Some(member) = self.directory.find_by_handle(chat, handle).await
            {
                return Ok(Subject::new(member, SubjectSource::Mention));
            }

            debug!(chat_id = %chat, handle = %handle, "Mention not resolved");
            refreshed = Some(result);
        }

        if let Some(target) = reply_target.filter(|m| !m.is_automated) {
            return Ok(Subject::new(target, SubjectSource::Reply));
        }

        let result = match refreshed {
            Some(result) => result,
            None => self.directory.ensure_fresh(chat, platform, false).await,
        };

        match result {
            Ok(_) => {
                let mut rng = self.rng.lock().await;
                let picked = self.directory.pick_random(chat, &mut *rng).await;
                Ok(picked.map_or_else(
                    || Subject::new(message.sender.clone(), SubjectSource::Issuer),
                    |member| Subject::new(member, SubjectSource::Random),
                ))
            }
            Err(RetrievalError::EmptyResult) => {
                debug!(chat_id = %chat, "No members known, diagnosing the issuer");
                Ok(Subject::new(message.sender.clone(), SubjectSource::Issuer))
            }
            Err(e) => Err(e),
        }
    }

    /// Author of the replied-to message. Lookup failures are logged and
    /// treated as no reply.
    async fn reply_target<P: ChatPlatform>(&self, platform: &P, message: &IncomingMessage) -> Option<Member> {
        let reply_to = message.reply_to?;
        let lookup = platform.message_author(message.chat_id, reply_to);

        match with_timeout(self.directory.call_timeout(), lookup).await {
            Ok(author) => author,
            Err(e) => {
                warn!(chat_id = %message.chat_id, message_id = reply_to, "Failed to look up replied-to message: {}", e);
                None
            }
        }
    }

    async fn handle_refresh<P: ChatPlatform>(
        &self,
        platform: &P,
        message: &IncomingMessage,
    ) -> Result<CommandResult, RetrievalError> {
        let snapshot = self.directory.ensure_fresh(message.chat_id, platform, true).await?;
        Ok(CommandResult::success(format!(
            "✓ Список участников обновлён: {} (источник: {})",
            snapshot.len(),
            snapshot.source()
        )))
    }

    async fn handle_members(&self, message: &IncomingMessage) -> CommandResult {
        let Some(snapshot) = self.directory.get_snapshot(message.chat_id).await else {
            return CommandResult::success("Список участников ещё не загружен. Используйте /refresh.");
        };

        let age_mins = snapshot.age().as_secs() / 60;
        let ttl_mins = self.directory.ttl().as_secs() / 60;
        let freshness = if snapshot.is_stale(self.directory.ttl()) {
            "устарел"
        } else {
            "актуален"
        };

        CommandResult::success(format!(
            "Известно участников: {}\n\
             Источник: {}\n\
             Обновлено: {} UTC ({} мин назад, {}, срок {} мин)",
            snapshot.len(),
            snapshot.source(),
            snapshot.captured_wall().format("%H:%M"),
            age_mins,
            freshness,
            ttl_mins,
        ))
    }

    fn handle_help() -> CommandResult {
        let mut lines = vec!["Команды:".to_owned()];
        for (usage, description) in BotCommand::all_commands() {
            lines.push(format!("  {usage} - {description}"));
        }
        lines.push(String::new());
        lines.push(format!(
            "Уровни: 1 - {}, 2 - {}, 3 - {}",
            Severity::clamp(1).label(),
            Severity::clamp(2).label(),
            Severity::clamp(3).label()
        ));
        CommandResult::success(lines.join("\n"))
    }

    fn handle_start() -> CommandResult {
        let help = Self::handle_help();
        CommandResult::success(format!(
            "👨‍⚕️ Привет! Я ставлю диагнозы участникам чата.\n\n{}",
            help.message
        ))
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("style", &self.style)
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

/// Reply text for a diagnosis.
fn format_diagnosis(member: &Member, level: Severity, diagnosis: &str) -> String {
    format!(
        "🔍 Результат обследования для {} (уровень: {}):\n{diagnosis}",
        member.mention(),
        level.label()
    )
}

/// User-facing text for a failed member lookup.
fn apology(err: &RetrievalError) -> String {
    match err {
        RetrievalError::PermissionDenied(_) => {
            "😢 Не могу получить список участников. Сделайте меня администратором чата.".to_owned()
        }
        RetrievalError::RateLimited { retry_after } => format!(
            "⏳ Telegram просит подождать {} сек. Попробуйте позже.",
            retry_after.as_secs().max(1)
        ),
        RetrievalError::EmptyResult => "В чате нет пользователей 😢".to_owned(),
        RetrievalError::Transport(_) => "😢 Не удалось связаться с Telegram. Попробуйте позже.".to_owned(),
    }
}
