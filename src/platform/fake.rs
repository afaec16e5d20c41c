//! Scripted in-memory platform for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{ChatPlatform, MessageId, PlatformError};
use crate::directory::{ChatId, Member};

type Listing = Result<Vec<Member>, PlatformError>;

/// Answers from a queue first, then from a fallback that repeats forever.
#[derive(Debug)]
struct Script {
    queued: VecDeque<Listing>,
    fallback: Listing,
    calls: usize,
}

impl Script {
    fn new(fallback: Listing) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback,
            calls: 0,
        }
    }

    fn next(&mut self) -> Listing {
        self.calls += 1;
        self.queued.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Debug)]
pub(crate) struct FakePlatform {
    members: Mutex<Script>,
    admins: Mutex<Script>,
    history: Mutex<Script>,
    history_limits: Mutex<Vec<usize>>,
    authors: HashMap<MessageId, Member>,
    author_calls: Mutex<usize>,
    sent: Mutex<Vec<(ChatId, String)>>,
    bot: Member,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    /// Every capability succeeds with an empty list until scripted.
    pub(crate) fn new() -> Self {
        Self {
            members: Mutex::new(Script::new(Ok(Vec::new()))),
            admins: Mutex::new(Script::new(Ok(Vec::new()))),
            history: Mutex::new(Script::new(Ok(Vec::new()))),
            history_limits: Mutex::new(Vec::new()),
            authors: HashMap::new(),
            author_calls: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
            bot: Member::new(999, "Diagnosis Bot").with_handle("diagnosis_bot").automated(),
        }
    }

    pub(crate) fn with_members(self, result: Listing) -> Self {
        self.members.lock().unwrap().fallback = result;
        self
    }

    pub(crate) fn with_admins(self, result: Listing) -> Self {
        self.admins.lock().unwrap().fallback = result;
        self
    }

    pub(crate) fn with_history(self, result: Listing) -> Self {
        self.history.lock().unwrap().fallback = result;
        self
    }

    pub(crate) fn with_author(mut self, message: MessageId, author: Member) -> Self {
        self.authors.insert(message, author);
        self
    }

    /// Queues a one-off answer for the next member listing.
    pub(crate) fn push_members(&self, result: Listing) {
        self.members.lock().unwrap().queued.push_back(result);
    }

    pub(crate) fn set_members(&self, result: Listing) {
        self.members.lock().unwrap().fallback = result;
    }

    pub(crate) fn member_calls(&self) -> usize {
        self.members.lock().unwrap().calls
    }

    pub(crate) fn admin_calls(&self) -> usize {
        self.admins.lock().unwrap().calls
    }

    pub(crate) fn history_calls(&self) -> usize {
        self.history.lock().unwrap().calls
    }

    pub(crate) fn history_limits(&self) -> Vec<usize> {
        self.history_limits.lock().unwrap().clone()
    }

    pub(crate) fn author_calls(&self) -> usize {
        *self.author_calls.lock().unwrap()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.member_calls() + self.admin_calls() + self.history_calls() + self.author_calls()
    }

    pub(crate) fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChatPlatform for FakePlatform {
    async fn list_members(&self, _chat: ChatId) -> Result<Vec<Member>, PlatformError> {
        self.members.lock().unwrap().next()
    }

    async fn list_administrators(&self, _chat: ChatId) -> Result<Vec<Member>, PlatformError> {
        self.admins.lock().unwrap().next()
    }

    async fn recent_senders(&self, _chat: ChatId, limit: usize) -> Result<Vec<Member>, PlatformError> {
        self.history_limits.lock().unwrap().push(limit);
        self.history.lock().unwrap().next()
    }

    async fn message_author(&self, _chat: ChatId, message: MessageId) -> Result<Option<Member>, PlatformError> {
        *self.author_calls.lock().unwrap() += 1;
        Ok(self.authors.get(&message).cloned())
    }

    async fn bot_identity(&self) -> Result<Member, PlatformError> {
        Ok(self.bot.clone())
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((chat, text.to_owned()));
        Ok(())
    }
}
