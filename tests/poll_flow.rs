use std::sync::Arc;

use guildkeep::poll::{build_bar, PollEngine, VoteRemoval};
use guildkeep::store::{MemoryBackend, PathStore, Paths, StorePath};

fn engine() -> (Arc<MemoryBackend>, PathStore, PollEngine) {
    let backend = Arc::new(MemoryBackend::new());
    let store = PathStore::new(backend.clone());
    (backend, store.clone(), PollEngine::new(store, Paths::default()))
}

fn opts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn revote_moves_the_single_vote() {
    let (_, _, polls) = engine();
    let pid = polls.create("g1", "Lunch?", opts(&["pizza", "sushi"])).await.unwrap();

    polls.vote("g1", &pid, "u1", 0).await.unwrap();
    polls.vote("g1", &pid, "u1", 1).await.unwrap();

    let tally = polls.tally("g1", &pid).await.unwrap();
    assert_eq!(tally.counts, vec![0, 1]);
    assert_eq!(tally.total, 1);
}

#[tokio::test]
async fn same_choice_twice_writes_once() {
    let (backend, _, polls) = engine();
    let pid = polls.create("g1", "Q", opts(&["a", "b"])).await.unwrap();
    polls.vote("g1", &pid, "u1", 0).await.unwrap();
    let writes = backend.writes();
    polls.vote("g1", &pid, "u1", 0).await.unwrap();
    assert_eq!(backend.writes(), writes);
}

#[tokio::test]
async fn removing_absent_vote_reports_not_voted() {
    let (_, _, polls) = engine();
    let pid = polls.create("g1", "Q", opts(&["a", "b"])).await.unwrap();
    assert_eq!(polls.remove_vote("g1", &pid, "u1").await.unwrap(), VoteRemoval::NotVoted);

    polls.vote("g1", &pid, "u1", 1).await.unwrap();
    match polls.remove_vote("g1", &pid, "u1").await.unwrap() {
        VoteRemoval::Removed(poll) => assert!(poll.votes.is_empty()),
        VoteRemoval::NotVoted => panic!("vote should have been removed"),
    }
    assert_eq!(polls.tally("g1", &pid).await.unwrap().total, 0);
}

#[tokio::test]
async fn last_vote_removed_keeps_the_poll() {
    let (_, store, polls) = engine();
    let pid = polls.create("g1", "Q", opts(&["a", "b"])).await.unwrap();
    polls.vote("g1", &pid, "u1", 0).await.unwrap();
    polls.remove_vote("g1", &pid, "u1").await.unwrap();

    let path = StorePath::parse(&format!("communities/g1/polls/{}", pid)).unwrap();
    assert!(store.exists(&path).await.unwrap());
    assert_eq!(polls.get("g1", &pid).await.unwrap().options, opts(&["a", "b"]));
}

#[tokio::test]
async fn rendering_reflects_votes() {
    let (_, _, polls) = engine();
    let pid = polls.create("g1", "Best?", opts(&["x", "y", "z"])).await.unwrap();
    polls.vote("g1", &pid, "u1", 0).await.unwrap();
    polls.vote("g1", &pid, "u2", 1).await.unwrap();
    polls.vote("g1", &pid, "u3", 1).await.unwrap();

    let r = polls.render("g1", &pid).await.unwrap();
    assert_eq!(r.title, "Anonymous Poll: Best?");
    assert_eq!(
        r.body,
        format!("1. x: `{}`\n2. y: `{}`\n3. z: `{}`\n", build_bar(1, 3), build_bar(2, 3), build_bar(0, 3))
    );
    assert_eq!(r.footer, format!("Votes: 3 | {}", pid));
    assert_eq!(build_bar(1, 3), "###------- 33%");
}

#[tokio::test]
async fn create_validates_options_and_vote_range() {
    let (_, _, polls) = engine();
    assert!(polls.create("g1", "Q", opts(&["only"])).await.is_err());
    let eleven: Vec<String> = (0..11).map(|i| i.to_string()).collect();
    assert!(polls.create("g1", "Q", eleven).await.is_err());

    let pid = polls.create("g1", "Q", opts(&["a", "b"])).await.unwrap();
    let err = polls.vote("g1", &pid, "u1", 2).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_input");
}

#[tokio::test]
async fn list_returns_every_poll() {
    let (_, _, polls) = engine();
    let a = polls.create("g1", "A", opts(&["1", "2"])).await.unwrap();
    let b = polls.create("g1", "B", opts(&["3", "4"])).await.unwrap();
    let mut ids: Vec<String> = polls.list("g1").await.unwrap().into_iter().map(|(id, _)| id).collect();
    ids.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(ids, expected);
}
