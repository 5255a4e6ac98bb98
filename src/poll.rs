//! Anonymous single-choice polls.
//!
//! Counts are always derived from the stored `votes` mapping; there is no
//! separate counter. Each vote is its own key, so concurrent voters never
//! overwrite one another.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};
use crate::logging::log_vote;
use crate::model::PollRecord;
use crate::store::{PathStore, Paths};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const POLL_ID_LEN: usize = 8;
const BAR_CELLS: u64 = 10;
const ID_ATTEMPTS: usize = 5;

/// Split a comma-separated option list, dropping blank entries.
pub fn parse_options(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn new_poll_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(POLL_ID_LEN)
        .map(char::from)
        .collect()
}

/// Ten-cell bar plus percentage, both rounded down.
///
/// The fill and the label are floored independently, so 95% shows nine cells.
pub fn build_bar(count: u64, total: u64) -> String {
    if total == 0 {
        return "---------- 0%".to_string();
    }
    let count = count.min(total);
    let filled = (count * BAR_CELLS / total) as usize;
    let percent = count * 100 / total;
    format!(
        "{}{} {}%",
        "#".repeat(filled),
        "-".repeat(BAR_CELLS as usize - filled),
        percent
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub counts: Vec<u64>,
    pub total: u64,
}

impl Tally {
    /// Votes pointing outside the option list count toward nothing.
    pub fn from_poll(poll: &PollRecord) -> Self {
        let mut counts = vec![0u64; poll.options.len()];
        for choice in poll.votes.values() {
            if let Some(slot) = counts.get_mut(*choice as usize) {
                *slot += 1;
            }
        }
        let total = counts.iter().sum();
        Self { counts, total }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPoll {
    pub title: String,
    pub body: String,
    pub footer: String,
}

pub fn render_poll(poll_id: &str, poll: &PollRecord) -> RenderedPoll {
    let tally = Tally::from_poll(poll);
    let body = poll
        .options
        .iter()
        .zip(&tally.counts)
        .enumerate()
        .map(|(i, (option, count))| {
            format!("{}. {}: `{}`\n", i + 1, option, build_bar(*count, tally.total))
        })
        .collect::<String>();
    RenderedPoll {
        title: format!("Anonymous Poll: {}", poll.question),
        body,
        footer: format!("Votes: {} | {}", tally.total, poll_id),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoteRemoval {
    /// The vote was deleted; carries the poll as it now stands.
    Removed(PollRecord),
    NotVoted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MyVote {
    /// Index and label of the member's current choice.
    pub choice: Option<(usize, String)>,
    pub rendered: RenderedPoll,
}

#[derive(Clone)]
pub struct PollEngine {
    store: PathStore,
    paths: Paths,
}

impl PollEngine {
    pub fn new(store: PathStore, paths: Paths) -> Self {
        Self { store, paths }
    }

    pub async fn create(&self, community_id: &str, question: &str, options: Vec<String>) -> CoreResult<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CoreError::invalid("The poll question must not be empty."));
        }
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(CoreError::invalid(format!(
                "You must provide between {} and {} options, separated by commas.",
                MIN_OPTIONS, MAX_OPTIONS
            )));
        }

        self.create_with_ids(community_id, PollRecord::new(question, options), new_poll_id)
            .await
    }

    async fn create_with_ids(
        &self,
        community_id: &str,
        poll: PollRecord,
        mut next_id: impl FnMut() -> String,
    ) -> CoreResult<String> {
        let record = poll.to_value();
        for _ in 0..ID_ATTEMPTS {
            let poll_id = next_id();
            let path = self.paths.poll(community_id, &poll_id)?;
            if self.store.exists(&path).await? {
                continue;
            }
            self.store.set(&path, record.clone()).await?;
            log_vote(community_id, &poll_id, "poll_created", None);
            return Ok(poll_id);
        }
        Err(CoreError::invalid(
            "Could not allocate a poll id. Please try creating the poll again.",
        ))
    }

    pub async fn get(&self, community_id: &str, poll_id: &str) -> CoreResult<PollRecord> {
        let path = self.paths.poll(community_id, poll_id)?;
        match self.store.get(&path).await? {
            Some(value) => Ok(PollRecord::from_value(&value)),
            None => Err(CoreError::NotFound("poll".to_string())),
        }
    }

    /// Record or replace the member's vote. Re-voting the same choice writes nothing.
    pub async fn vote(&self, community_id: &str, poll_id: &str, member_id: &str, choice: usize) -> CoreResult<PollRecord> {
        let mut poll = self.get(community_id, poll_id).await?;
        if choice >= poll.options.len() {
            return Err(CoreError::invalid(format!(
                "Choice {} is not an option of this poll.",
                choice + 1
            )));
        }
        if poll.votes.get(member_id) == Some(&(choice as u64)) {
            return Ok(poll);
        }
        let path = self.paths.vote(community_id, poll_id, member_id)?;
        self.store.set(&path, json!(choice)).await?;
        poll.votes.insert(member_id.to_string(), choice as u64);
        log_vote(community_id, poll_id, "vote_recorded", Some(choice));
        Ok(poll)
    }

    pub async fn remove_vote(&self, community_id: &str, poll_id: &str, member_id: &str) -> CoreResult<VoteRemoval> {
        let mut poll = self.get(community_id, poll_id).await?;
        // The stored key decides, so a value that no longer decodes can still be cleared.
        let path = self.paths.vote(community_id, poll_id, member_id)?;
        if !self.store.exists(&path).await? {
            return Ok(VoteRemoval::NotVoted);
        }
        self.store.delete(&path).await?;
        poll.votes.remove(member_id);
        log_vote(community_id, poll_id, "vote_removed", None);
        Ok(VoteRemoval::Removed(poll))
    }

    pub async fn tally(&self, community_id: &str, poll_id: &str) -> CoreResult<Tally> {
        Ok(Tally::from_poll(&self.get(community_id, poll_id).await?))
    }

    pub async fn render(&self, community_id: &str, poll_id: &str) -> CoreResult<RenderedPoll> {
        Ok(render_poll(poll_id, &self.get(community_id, poll_id).await?))
    }

    pub async fn my_vote(&self, community_id: &str, poll_id: &str, member_id: &str) -> CoreResult<MyVote> {
        let poll = self.get(community_id, poll_id).await?;
        let choice = poll.votes.get(member_id).and_then(|c| {
            let idx = *c as usize;
            poll.options.get(idx).map(|label| (idx, label.clone()))
        });
        Ok(MyVote {
            choice,
            rendered: render_poll(poll_id, &poll),
        })
    }

    /// `(poll id, options)` for every stored poll, for restoring poll views.
    pub async fn list(&self, community_id: &str) -> CoreResult<Vec<(String, Vec<String>)>> {
        let path = self.paths.polls(community_id)?;
        let polls = match self.store.get(&path).await? {
            Some(Value::Object(map)) => map,
            _ => return Ok(Vec::new()),
        };
        Ok(polls
            .into_iter()
            .filter(|(_, v)| v.is_object())
            .map(|(id, v)| (id, PollRecord::from_value(&v).options))
            .collect())
    }
}
