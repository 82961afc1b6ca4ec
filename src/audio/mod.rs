use anyhow::{Context, Result};
use rodio::{
    Decoder, DeviceSinkBuilder as OutputStreamBuilder, MixerDeviceSink as OutputStream,
    Player as Sink, Source,
};
use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

/// Catalog previews are 30-second clips.
pub const PREVIEW_LENGTH: Duration = Duration::from_secs(30);

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata(Duration),
    TimeUpdate(Duration),
    Ended,
}

/// Plays one audio source at a time and reports progress as events.
pub trait MediaBackend {
    fn load(&mut self, url: &str) -> Result<()>;
    fn resume(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration) -> Result<()>;
    /// `volume` is in `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32);
    fn poll_events(&mut self) -> Vec<MediaEvent>;
    fn name(&self) -> &str;
}

impl<T: MediaBackend + ?Sized> MediaBackend for Box<T> {
    fn load(&mut self, url: &str) -> Result<()> {
        (**self).load(url)
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        (**self).seek(position)
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume)
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        (**self).poll_events()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

struct FetchedPreview {
    generation: u64,
    url: String,
    bytes: Result<Vec<u8>>,
}

pub struct RodioBackend {
    stream: OutputStream,
    sink: Sink,
    http: reqwest::blocking::Client,
    fetched_tx: Sender<FetchedPreview>,
    fetched_rx: Receiver<FetchedPreview>,
    generation: u64,
    current: Option<String>,
    bytes: Option<Vec<u8>>,
    paused: bool,
    volume: f32,
    ended_reported: bool,
}

impl RodioBackend {
    pub fn new() -> Result<Self> {
        let mut stream = OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")?
            .with_error_callback(|err| tracing::warn!(error = %err, "audio stream error"))
            .open_sink_or_fallback()
            .context("failed to start default output stream")?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());
        let http = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("chime/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build preview HTTP client")?;
        let (fetched_tx, fetched_rx) = mpsc::channel();

        Ok(Self {
            stream,
            sink,
            http,
            fetched_tx,
            fetched_rx,
            generation: 0,
            current: None,
            bytes: None,
            paused: false,
            volume: 1.0,
            ended_reported: false,
        })
    }

    fn fresh_sink(&mut self) {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.set_volume(self.volume);
        if self.paused {
            self.sink.pause();
        }
    }

    fn append_current(&mut self) -> Result<Option<Duration>> {
        let (Some(url), Some(bytes)) = (self.current.as_deref(), self.bytes.as_ref()) else {
            return Ok(None);
        };
        let hint = extension_hint(url);
        let decoder = Decoder::builder()
            .with_data(Cursor::new(bytes.clone()))
            .with_byte_len(bytes.len() as u64)
            .with_seekable(true)
            .with_hint(hint)
            .build()
            .with_context(|| format!("failed to decode preview {url}"))?;
        let duration = probe_duration(bytes, hint).or_else(|| decoder.total_duration());
        self.sink.append(decoder);
        Ok(duration)
    }

    fn accept_fetched(&mut self, fetched: FetchedPreview, events: &mut Vec<MediaEvent>) {
        if fetched.generation != self.generation {
            tracing::debug!(url = %fetched.url, "dropping superseded preview");
            return;
        }

        match fetched.bytes {
            Ok(bytes) => {
                self.bytes = Some(bytes);
                self.fresh_sink();
                match self.append_current() {
                    Ok(duration) => {
                        events.push(MediaEvent::LoadedMetadata(duration.unwrap_or(PREVIEW_LENGTH)));
                    }
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "preview could not be played");
                        self.bytes = None;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(url = %fetched.url, error = %format!("{err:#}"), "preview fetch failed");
            }
        }
    }
}

impl MediaBackend for RodioBackend {
    fn load(&mut self, url: &str) -> Result<()> {
        if url.is_empty() {
            anyhow::bail!("track has no preview");
        }

        self.generation += 1;
        self.current = Some(url.to_string());
        self.bytes = None;
        self.paused = false;
        self.ended_reported = false;
        self.fresh_sink();

        let generation = self.generation;
        let http = self.http.clone();
        let tx = self.fetched_tx.clone();
        let url = url.to_string();
        thread::Builder::new()
            .name(String::from("preview-fetch"))
            .spawn(move || {
                let bytes = fetch_preview(&http, &url);
                let _ = tx.send(FetchedPreview {
                    generation,
                    url,
                    bytes,
                });
            })
            .context("failed to spawn preview fetch thread")?;
        Ok(())
    }

    fn resume(&mut self) {
        self.paused = false;
        if self.bytes.is_some() && self.sink.empty() {
            // The finished source was dropped by the sink; start it over.
            self.fresh_sink();
            if let Err(err) = self.append_current() {
                tracing::warn!(error = %format!("{err:#}"), "preview could not be restarted");
            }
            self.ended_reported = false;
        }
        self.sink.play();
    }

    fn pause(&mut self) {
        self.paused = true;
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.generation += 1;
        self.sink.stop();
        self.current = None;
        self.bytes = None;
        self.paused = false;
        self.ended_reported = false;
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.bytes.is_none() {
            return Err(anyhow::anyhow!("no preview loaded"));
        }

        if self.sink.empty() {
            // Finished sources are dropped by the sink; decode again to restart.
            self.fresh_sink();
            self.append_current()?;
        }
        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek preview: {err:?}"))?;
        self.ended_reported = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        while let Ok(fetched) = self.fetched_rx.try_recv() {
            self.accept_fetched(fetched, &mut events);
        }

        if self.bytes.is_some() {
            events.push(MediaEvent::TimeUpdate(self.sink.get_pos()));
            if !self.paused && self.sink.empty() && !self.ended_reported {
                self.ended_reported = true;
                events.push(MediaEvent::Ended);
            }
        }
        events
    }

    fn name(&self) -> &str {
        "System default output"
    }
}

fn fetch_preview(http: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let response = http
        .get(url)
        .send()
        .with_context(|| format!("failed to request {url}"))?
        .error_for_status()
        .with_context(|| format!("preview request rejected for {url}"))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read preview body from {url}"))?;
    Ok(bytes.to_vec())
}

fn extension_hint(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 4 && !ext.contains('/'))
        .unwrap_or("m4a")
}

/// Reads the container's declared length; rodio often cannot for MP4.
pub fn probe_duration(bytes: &[u8], extension: &str) -> Option<Duration> {
    let source = MediaSourceStream::new(
        Box::new(Cursor::new(bytes.to_vec())),
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let params = &probed.format.default_track()?.codec_params;
    if let (Some(time_base), Some(frames)) = (params.time_base, params.n_frames) {
        let time = time_base.calc_time(frames);
        return Some(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac));
    }

    params
        .n_frames
        .zip(params.sample_rate)
        .filter(|(_, rate)| *rate > 0)
        .map(|(frames, rate)| Duration::from_secs_f64(frames as f64 / f64::from(rate)))
}

/// Backend without an audio device. Keeps a simulated clock so the rest of
/// the player behaves as if previews were playing.
pub struct NullBackend {
    current: Option<String>,
    paused: bool,
    volume: f32,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Duration,
    metadata_reported: bool,
    ended_reported: bool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_track_duration(PREVIEW_LENGTH)
    }

    pub fn with_track_duration(track_duration: Duration) -> Self {
        Self {
            current: None,
            paused: false,
            volume: 1.0,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration,
            metadata_reported: false,
            ended_reported: false,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Moves the simulated clock forward.
    pub fn advance(&mut self, by: Duration) {
        if self.current.is_some() {
            self.position_offset = self.position_offset.saturating_add(by);
        }
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        position.min(self.track_duration)
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for NullBackend {
    fn load(&mut self, url: &str) -> Result<()> {
        if url.is_empty() {
            anyhow::bail!("track has no preview");
        }
        self.current = Some(url.to_string());
        self.paused = false;
        self.started_at = Some(Instant::now());
        self.position_offset = Duration::ZERO;
        self.metadata_reported = false;
        self.ended_reported = false;
        Ok(())
    }

    fn resume(&mut self) {
        if self.current.is_none() {
            return;
        }
        if self.ended_reported {
            self.position_offset = Duration::ZERO;
            self.ended_reported = false;
            self.started_at = Some(Instant::now());
        } else if self.paused {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn stop(&mut self) {
        self.current = None;
        self.paused = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.metadata_reported = false;
        self.ended_reported = false;
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.position_offset = position.min(self.track_duration);
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        self.ended_reported = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        if self.current.is_none() {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.metadata_reported {
            self.metadata_reported = true;
            events.push(MediaEvent::LoadedMetadata(self.track_duration));
        }
        let position = self.current_position();
        events.push(MediaEvent::TimeUpdate(position));
        if !self.paused && position >= self.track_duration && !self.ended_reported {
            self.ended_reported = true;
            events.push(MediaEvent::Ended);
        }
        events
    }

    fn name(&self) -> &str {
        "Null audio backend"
    }
}
