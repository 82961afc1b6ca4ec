use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chime::audio::NullBackend;
use chime::core::{Action, PlaybackController, QueuePicker};
use chime::model::Track;
use chime::store::{FAVORITES_KEY, FavoritesStore, FileStorage, HistoryStore, MemoryStorage};
use tempfile::tempdir;

fn track(id: u64, title: &str) -> Track {
    Track {
        id,
        title: title.to_string(),
        artist_name: String::from("Band"),
        artwork_url: format!("https://art.example/{id}/100x100bb.jpg"),
        preview_url: format!("https://audio.example/{id}.m4a"),
        duration_ms: 210_000,
        album: None,
        genre: None,
    }
}

fn abc() -> Vec<Track> {
    vec![track(1, "A"), track(2, "B"), track(3, "C")]
}

fn controller() -> PlaybackController<NullBackend> {
    let history = HistoryStore::load(Box::new(MemoryStorage::new()));
    PlaybackController::new(NullBackend::new(), history, 70)
}

struct Always(usize);

impl QueuePicker for Always {
    fn pick(&mut self, _len: usize) -> usize {
        self.0
    }
}

#[test]
fn next_and_previous_walk_the_queue_in_order() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[1].clone()), &queue);

    player.dispatch(Action::Next, &queue);
    assert_eq!(player.state().current.as_ref(), Some(&queue[2]));

    player.dispatch(Action::Previous, &queue);
    assert_eq!(player.state().current.as_ref(), Some(&queue[1]));
    assert_eq!(player.backend().current(), Some("https://audio.example/2.m4a"));
}

#[test]
fn navigation_wraps_at_both_ends() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[2].clone()), &queue);
    player.dispatch(Action::Next, &queue);
    assert_eq!(player.state().current.as_ref(), Some(&queue[0]));

    player.dispatch(Action::Previous, &queue);
    assert_eq!(player.state().current.as_ref(), Some(&queue[2]));
}

#[test]
fn shuffle_uses_the_picker_in_both_directions() {
    let queue = abc();
    let history = HistoryStore::load(Box::new(MemoryStorage::new()));
    let mut player = PlaybackController::new(NullBackend::new(), history, 70).with_picker(Always(0));
    player.dispatch(Action::ToggleShuffle, &queue);
    player.dispatch(Action::Play(queue[1].clone()), &queue);

    player.dispatch(Action::Next, &queue);
    assert_eq!(player.state().current.as_ref(), Some(&queue[0]));
    player.dispatch(Action::Previous, &queue);
    assert_eq!(player.state().current.as_ref(), Some(&queue[0]));
}

#[test]
fn playing_the_current_track_again_pauses_in_place() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[0].clone()), &queue);
    player.dispatch(Action::MetadataLoaded(30.0), &queue);
    player.dispatch(Action::TimeUpdate(12.5), &queue);

    let state = player.dispatch(Action::Play(queue[0].clone()), &queue).clone();

    assert!(!state.playing);
    assert_eq!(state.position, 12.5);
    assert_eq!(state.current.as_ref(), Some(&queue[0]));
    assert!(player.backend().is_paused());
}

#[test]
fn media_end_with_repeat_restarts_the_same_track() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::ToggleRepeat, &queue);
    player.dispatch(Action::Play(queue[1].clone()), &queue);
    player.dispatch(Action::MetadataLoaded(30.0), &queue);
    player.dispatch(Action::TimeUpdate(30.0), &queue);

    player.dispatch(Action::MediaEnded, &queue);

    let state = player.state();
    assert_eq!(state.position, 0.0);
    assert!(state.playing);
    assert_eq!(state.current.as_ref(), Some(&queue[1]));
}

#[test]
fn seek_is_clamped_to_the_reported_duration() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[0].clone()), &queue);

    player.dispatch(Action::Seek(5.0), &queue);
    assert_eq!(player.state().position, 0.0, "duration not known yet");

    player.dispatch(Action::MetadataLoaded(30.0), &queue);
    assert_eq!(player.dispatch(Action::Seek(90.0), &queue).position, 30.0);
    assert_eq!(player.dispatch(Action::Seek(-4.0), &queue).position, 0.0);
    assert_eq!(player.dispatch(Action::SeekPercent(50.0), &queue).position, 15.0);
}

#[test]
fn simulated_backend_drives_progress_and_auto_advance() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[0].clone()), &queue);

    player.poll_media(&queue);
    assert_eq!(player.state().duration, 30.0);

    player.backend_mut().advance(Duration::from_secs(31));
    player.poll_media(&queue);

    assert_eq!(player.state().current.as_ref(), Some(&queue[1]));
    assert_eq!(player.backend().current(), Some("https://audio.example/2.m4a"));
}

#[test]
fn finished_track_without_queue_can_be_played_again() {
    let mut player = controller();
    let a = track(1, "A");
    player.dispatch(Action::Play(a.clone()), &[]);
    player.backend_mut().advance(Duration::from_secs(31));
    player.poll_media(&[]);

    let ended = player.state().clone();
    assert_eq!(ended.current.as_ref(), Some(&a));
    assert!(ended.playing);
    assert_eq!(ended.position, 30.0);

    player.dispatch(Action::TogglePlay, &[]);
    let resumed = player.dispatch(Action::TogglePlay, &[]).clone();
    assert!(resumed.playing);
    assert_eq!(resumed.position, 0.0);

    player.poll_media(&[]);
    assert!(player.state().position < 30.0);
    player.backend_mut().advance(Duration::from_secs(31));
    player.poll_media(&[]);
    assert_eq!(player.state().position, 30.0);
    assert!(!player.backend().is_paused());
}

#[test]
fn subscribers_see_each_state_change_until_unsubscribed() {
    let queue = abc();
    let mut player = controller();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = player.subscribe(move |state| sink.borrow_mut().push(state.playing));

    player.dispatch(Action::Play(queue[0].clone()), &queue);
    player.dispatch(Action::TogglePlay, &queue);
    player.dispatch(Action::Next, &[]);
    assert_eq!(*seen.borrow(), vec![true, false]);

    assert!(player.unsubscribe(id));
    player.dispatch(Action::TogglePlay, &queue);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn direct_plays_are_recorded_latest_first() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[0].clone()), &queue);
    player.dispatch(Action::Play(queue[1].clone()), &queue);
    player.dispatch(Action::Next, &queue);
    player.dispatch(Action::Play(queue[0].clone()), &queue);

    let ids: Vec<u64> = player.history().tracks().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn favorites_toggle_persists_to_storage() {
    let storage = MemoryStorage::new();
    let mut favorites = FavoritesStore::load(Box::new(storage.clone()));
    let a = track(1, "A");

    assert!(favorites.toggle(&a));
    assert_eq!(favorites.tracks(), &[a.clone()]);

    let stored = storage.get(FAVORITES_KEY).unwrap();
    let persisted: Vec<Track> = serde_json::from_str(&stored).unwrap();
    assert_eq!(persisted, vec![a]);
}

#[test]
fn favorites_and_history_survive_a_restart_on_disk() {
    let temp = tempdir().unwrap();
    let queue = abc();
    {
        let storage = FileStorage::new(temp.path());
        let mut favorites = FavoritesStore::load(Box::new(storage.clone()));
        favorites.toggle(&queue[2]);
        let mut player = PlaybackController::new(
            NullBackend::new(),
            HistoryStore::load(Box::new(storage)),
            70,
        );
        player.dispatch(Action::Play(queue[0].clone()), &queue);
    }

    let storage = FileStorage::new(temp.path());
    let favorites = FavoritesStore::load(Box::new(storage.clone()));
    let history = HistoryStore::load(Box::new(storage));
    assert!(favorites.is_favorite(3));
    assert_eq!(history.tracks(), &[queue[0].clone()]);
}

#[test]
fn close_stops_the_backend() {
    let queue = abc();
    let mut player = controller();
    player.dispatch(Action::Play(queue[0].clone()), &queue);

    let state = player.dispatch(Action::Close, &queue).clone();

    assert!(state.is_idle());
    assert_eq!(player.backend().current(), None);
}
