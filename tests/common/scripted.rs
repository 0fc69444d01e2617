//! Engine that replays queued replies per role

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::info;

use wayfarer::{
    AgentProfile, AgentRole, CompletionEngine, FragmentStream, Result, ThreadId, WayfarerError,
};

/// One canned reply
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Stream these fragments, then end
    Fragments(Vec<String>),
    /// Stream these fragments, then fail
    FailMidStream { fragments: Vec<String>, error: String },
    /// Stream these fragments, then never yield again
    Stall(Vec<String>),
    /// Refuse the call outright
    Fail(String),
}

#[derive(Default)]
struct ScriptState {
    replies: HashMap<AgentRole, VecDeque<ScriptedReply>>,
    threads: HashMap<ThreadId, AgentRole>,
    prompts: Vec<(AgentRole, String)>,
    closed: HashMap<ThreadId, usize>,
    opened: usize,
    refuse_open: Option<AgentRole>,
}

#[derive(Default)]
pub struct ScriptedEngine {
    state: Mutex<ScriptState>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `text` for `role`, streamed one line at a time
    pub fn reply(&self, role: AgentRole, text: &str) -> &Self {
        let fragments = text.split_inclusive('\n').map(str::to_string).collect();
        self.push(role, ScriptedReply::Fragments(fragments))
    }

    pub fn fail(&self, role: AgentRole, error: &str) -> &Self {
        self.push(role, ScriptedReply::Fail(error.to_string()))
    }

    pub fn fail_mid_stream(&self, role: AgentRole, partial: &str, error: &str) -> &Self {
        self.push(
            role,
            ScriptedReply::FailMidStream {
                fragments: vec![partial.to_string()],
                error: error.to_string(),
            },
        )
    }

    /// Stream `partial`, then hang until the consumer gives up
    pub fn stall_after(&self, role: AgentRole, partial: &str) -> &Self {
        self.push(role, ScriptedReply::Stall(vec![partial.to_string()]))
    }

    pub fn push(&self, role: AgentRole, reply: ScriptedReply) -> &Self {
        self.state
            .lock()
            .replies
            .entry(role)
            .or_default()
            .push_back(reply);
        self
    }

    /// Make `open_thread` fail for `role`
    pub fn refuse_open(&self, role: AgentRole) -> &Self {
        self.state.lock().refuse_open = Some(role);
        self
    }

    /// Every prompt submitted for `role`, oldest first
    pub fn prompts_for(&self, role: AgentRole) -> Vec<String> {
        self.state
            .lock()
            .prompts
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Roles in the order they were called
    pub fn call_order(&self) -> Vec<AgentRole> {
        self.state.lock().prompts.iter().map(|(r, _)| *r).collect()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    /// How many times each closed thread was closed
    pub fn close_counts(&self) -> Vec<usize> {
        self.state.lock().closed.values().copied().collect()
    }

    /// Threads opened but not yet closed
    pub fn live_threads(&self) -> usize {
        let state = self.state.lock();
        state
            .threads
            .keys()
            .filter(|id| !state.closed.contains_key(id))
            .count()
    }

    pub fn pending_replies(&self, role: AgentRole) -> usize {
        self.state.lock().replies.get(&role).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl CompletionEngine for ScriptedEngine {
    async fn open_thread(&self, profile: &AgentProfile) -> Result<ThreadId> {
        let mut state = self.state.lock();
        if state.refuse_open == Some(profile.role) {
            return Err(WayfarerError::Configuration(format!(
                "engine refused to open a thread for {}",
                profile.role
            )));
        }
        let id = ThreadId::new();
        state.threads.insert(id, profile.role);
        state.opened += 1;
        Ok(id)
    }

    async fn stream_turn(&self, thread: ThreadId, prompt: String) -> Result<FragmentStream> {
        let mut state = self.state.lock();
        let role = *state.threads.get(&thread).ok_or_else(|| {
            WayfarerError::Configuration(format!("unknown thread {}", thread))
        })?;
        state.prompts.push((role, prompt));

        let reply = state
            .replies
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| WayfarerError::dispatch(role, "no scripted reply left"))?;

        let items: Vec<Result<String>> = match reply {
            ScriptedReply::Fragments(fragments) => fragments.into_iter().map(Ok).collect(),
            ScriptedReply::FailMidStream { fragments, error } => fragments
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(WayfarerError::dispatch(role, error))))
                .collect(),
            ScriptedReply::Stall(fragments) => {
                let head = futures::stream::iter(fragments.into_iter().map(Ok));
                return Ok(Box::pin(head.chain(futures::stream::pending())));
            }
            ScriptedReply::Fail(error) => return Err(WayfarerError::dispatch(role, error)),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn close_thread(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.state.lock();
        *state.closed.entry(thread).or_insert(0) += 1;
        info!(thread = %thread, "Scripted thread closed");
        Ok(())
    }
}
