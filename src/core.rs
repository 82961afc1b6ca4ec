use crate::audio::{MediaBackend, MediaEvent};
use crate::model::{PlaybackState, Track};
use crate::store::HistoryStore;
use rand::rngs::SmallRng;
use rand::{RngExt, SeedableRng};
use std::time::Duration;

pub const SKIP_SECONDS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Play(Track),
    TogglePlay,
    Seek(f64),
    SeekPercent(f64),
    SkipForward,
    SkipBackward,
    SetVolume(i32),
    Next,
    Previous,
    MediaEnded,
    TimeUpdate(f64),
    MetadataLoaded(f64),
    Close,
    ToggleShuffle,
    ToggleRepeat,
}

/// Side effects a transition asks for. The reducer only describes them;
/// [`PlaybackController`] carries them out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Load(String),
    Resume,
    Pause,
    Seek(f64),
    SetVolume(f32),
    Stop,
    RecordHistory(Track),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: PlaybackState,
    pub effects: Vec<Effect>,
}

/// Chooses the queue index for shuffled navigation.
pub trait QueuePicker {
    fn pick(&mut self, len: usize) -> usize;
}

#[derive(Debug)]
pub struct RandomPicker {
    rng: SmallRng,
}

impl RandomPicker {
    pub fn new() -> Self {
        Self {
            rng: rand::make_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuePicker for RandomPicker {
    fn pick(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.random_range(0..len)
    }
}

/// Pure transition function over playback snapshots.
pub fn reduce(
    state: &PlaybackState,
    action: Action,
    queue: &[Track],
    picker: &mut dyn QueuePicker,
) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match action {
        Action::Play(track) => {
            if state.is_current(&track) {
                if state.playing {
                    next.playing = false;
                    effects.push(Effect::Pause);
                } else {
                    resume(&mut next, &mut effects);
                    effects.push(Effect::RecordHistory(track));
                }
            } else {
                select_track(&mut next, &track, &mut effects);
                effects.push(Effect::RecordHistory(track));
            }
        }
        Action::TogglePlay => {
            if state.playing {
                next.playing = false;
                effects.push(Effect::Pause);
            } else if !state.is_idle() {
                resume(&mut next, &mut effects);
            }
        }
        Action::Seek(target) => seek_to(&mut next, target, &mut effects),
        Action::SeekPercent(percent) => {
            if next.duration_known() {
                let percent = finite_or_zero(percent).clamp(0.0, 100.0);
                let target = percent / 100.0 * next.duration;
                seek_to(&mut next, target, &mut effects);
            }
        }
        Action::SkipForward => {
            let target = next.position + SKIP_SECONDS;
            seek_to(&mut next, target, &mut effects);
        }
        Action::SkipBackward => {
            let target = next.position - SKIP_SECONDS;
            seek_to(&mut next, target, &mut effects);
        }
        Action::SetVolume(volume) => {
            next.volume = volume.clamp(0, 100) as u8;
            effects.push(Effect::SetVolume(f32::from(next.volume) / 100.0));
        }
        Action::Next => navigate(&mut next, queue, picker, Direction::Forward, &mut effects),
        Action::Previous => navigate(&mut next, queue, picker, Direction::Backward, &mut effects),
        Action::MediaEnded if state.is_idle() => {}
        Action::MediaEnded if state.repeat => {
            next.position = 0.0;
            next.playing = true;
            effects.push(Effect::Seek(0.0));
            effects.push(Effect::Resume);
        }
        Action::MediaEnded => navigate(&mut next, queue, picker, Direction::Forward, &mut effects),
        Action::TimeUpdate(seconds) => {
            if !state.is_idle() {
                let mut position = finite_or_zero(seconds).max(0.0);
                if next.duration_known() {
                    position = position.min(next.duration);
                }
                next.position = position;
            }
        }
        Action::MetadataLoaded(seconds) => {
            if !state.is_idle() && seconds.is_finite() && seconds >= 0.0 {
                next.duration = seconds;
                if next.duration_known() {
                    next.position = next.position.clamp(0.0, next.duration);
                }
            }
        }
        Action::Close => {
            next.current = None;
            next.playing = false;
            next.position = 0.0;
            next.duration = 0.0;
            effects.push(Effect::Stop);
        }
        Action::ToggleShuffle => next.shuffle = !state.shuffle,
        Action::ToggleRepeat => next.repeat = !state.repeat,
    }

    Transition {
        state: next,
        effects,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

fn navigate(
    state: &mut PlaybackState,
    queue: &[Track],
    picker: &mut dyn QueuePicker,
    direction: Direction,
    effects: &mut Vec<Effect>,
) {
    if queue.is_empty() {
        return;
    }

    let len = queue.len();
    // Shuffle has no separate notion of "previous".
    let index = if state.shuffle {
        picker.pick(len).min(len - 1)
    } else {
        let current = state
            .current
            .as_ref()
            .and_then(|current| queue.iter().position(|track| track == current));
        match (direction, current) {
            (Direction::Forward, Some(idx)) => (idx + 1) % len,
            (Direction::Forward, None) => 0,
            (Direction::Backward, Some(idx)) if idx > 0 => idx - 1,
            (Direction::Backward, _) => len - 1,
        }
    };

    select_track(state, &queue[index], effects);
}

fn select_track(state: &mut PlaybackState, track: &Track, effects: &mut Vec<Effect>) {
    state.current = Some(track.clone());
    state.playing = true;
    state.position = 0.0;
    state.duration = 0.0;
    effects.push(Effect::Load(track.preview_url.clone()));
}

/// Resuming a finished track starts it over.
fn resume(state: &mut PlaybackState, effects: &mut Vec<Effect>) {
    if state.duration_known() && state.position >= state.duration {
        state.position = 0.0;
        effects.push(Effect::Seek(0.0));
    }
    state.playing = true;
    effects.push(Effect::Resume);
}

fn seek_to(state: &mut PlaybackState, target: f64, effects: &mut Vec<Effect>) {
    if state.is_idle() || !state.duration_known() {
        return;
    }

    let position = finite_or_zero(target).clamp(0.0, state.duration);
    state.position = position;
    effects.push(Effect::Seek(position));
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

pub type SubscriptionId = u64;

type Subscriber = Box<dyn FnMut(&PlaybackState)>;

/// Owns the playback snapshot and drives the media backend from it.
pub struct PlaybackController<B: MediaBackend> {
    state: PlaybackState,
    backend: B,
    history: HistoryStore,
    picker: Box<dyn QueuePicker>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
}

impl<B: MediaBackend> PlaybackController<B> {
    pub fn new(mut backend: B, history: HistoryStore, volume: u8) -> Self {
        let state = PlaybackState::with_volume(volume);
        backend.set_volume(f32::from(state.volume) / 100.0);
        Self {
            state,
            backend,
            history,
            picker: Box::new(RandomPicker::new()),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn with_picker(mut self, picker: impl QueuePicker + 'static) -> Self {
        self.picker = Box::new(picker);
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&PlaybackState) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        before != self.subscribers.len()
    }

    pub fn dispatch(&mut self, action: Action, queue: &[Track]) -> &PlaybackState {
        tracing::debug!(?action, "playback action");
        let Transition { state, effects } = reduce(&self.state, action, queue, self.picker.as_mut());
        for effect in effects {
            self.apply(effect);
        }

        let changed = state != self.state;
        self.state = state;
        if changed {
            self.notify();
        }
        &self.state
    }

    /// Drains backend notifications and feeds them through the reducer.
    pub fn poll_media(&mut self, queue: &[Track]) {
        for event in self.backend.poll_events() {
            let action = match event {
                MediaEvent::LoadedMetadata(duration) => Action::MetadataLoaded(duration.as_secs_f64()),
                MediaEvent::TimeUpdate(position) => Action::TimeUpdate(position.as_secs_f64()),
                MediaEvent::Ended => Action::MediaEnded,
            };
            self.dispatch(action, queue);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Load(url) => {
                if let Err(err) = self.backend.load(&url) {
                    tracing::warn!(%url, error = %format!("{err:#}"), "failed to load preview");
                }
            }
            Effect::Resume => self.backend.resume(),
            Effect::Pause => self.backend.pause(),
            Effect::Seek(seconds) => {
                let position = match Duration::try_from_secs_f64(seconds) {
                    Ok(position) => position,
                    Err(err) => {
                        tracing::warn!(seconds, error = %err, "seek target out of range");
                        return;
                    }
                };
                if let Err(err) = self.backend.seek(position) {
                    tracing::warn!(seconds, error = %format!("{err:#}"), "seek failed");
                }
            }
            Effect::SetVolume(volume) => self.backend.set_volume(volume),
            Effect::Stop => self.backend.stop(),
            Effect::RecordHistory(track) => self.history.record(&track),
        }
    }

    fn notify(&mut self) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&self.state);
        }
    }
}
