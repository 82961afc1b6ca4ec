#![no_main]

use chime::core::{Action, RandomPicker, reduce};
use chime::model::{PlaybackState, Track};
use libfuzzer_sys::fuzz_target;

fn track(id: u64) -> Track {
    Track {
        id,
        title: format!("track {id}"),
        artist_name: String::from("artist"),
        artwork_url: String::new(),
        preview_url: format!("https://audio.example/{id}.m4a"),
        duration_ms: 30_000,
        album: None,
        genre: None,
    }
}

fuzz_target!(|data: &[u8]| {
    let len = data.first().map_or(0, |byte| usize::from(*byte % 8));
    let queue: Vec<Track> = (0..len as u64).map(track).collect();
    let mut picker = RandomPicker::seeded(u64::from(data.len() as u32));
    let mut state = PlaybackState::default();

    for pair in data.chunks(2) {
        let op = pair[0];
        let arg = pair.get(1).copied().unwrap_or(0);
        let value = f64::from(arg) - 64.0;
        let action = match op % 15 {
            0 => Action::Play(track(u64::from(arg % 10))),
            1 => Action::TogglePlay,
            2 => Action::Seek(value),
            3 => Action::SeekPercent(value * 2.0),
            4 => Action::SkipForward,
            5 => Action::SkipBackward,
            6 => Action::SetVolume(i32::from(arg) - 80),
            7 => Action::Next,
            8 => Action::Previous,
            9 => Action::MediaEnded,
            10 => Action::TimeUpdate(if arg == 255 { f64::NAN } else { value }),
            11 => Action::MetadataLoaded(value),
            12 => Action::Close,
            13 => Action::ToggleShuffle,
            _ => Action::ToggleRepeat,
        };
        state = reduce(&state, action, &queue, &mut picker).state;

        assert!(state.volume <= 100);
        assert!(state.position.is_finite() && state.position >= 0.0);
        if state.duration_known() {
            assert!(state.position <= state.duration);
        }
        if state.current.is_none() {
            assert!(!state.playing);
        }
    }
});
