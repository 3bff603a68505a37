use super::{Layer, Timeline};
use crate::error::{Result, StorycutError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Length bounds for output parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    max: Duration,
    min: Duration,
}

impl PartLimits {
    pub fn new(max: Duration, min: Duration) -> Result<Self> {
        if max.is_zero() {
            return Err(StorycutError::InvalidConfig(
                "Max part duration must be greater than 0".to_string(),
            ));
        }
        if max < min {
            return Err(StorycutError::InvalidConfig(format!(
                "Max part duration ({:.1}s) is shorter than min part duration ({:.1}s)",
                max.as_secs_f64(),
                min.as_secs_f64()
            )));
        }
        Ok(Self { max, min })
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn min(&self) -> Duration {
        self.min
    }
}

/// A `[start, end)` range of the source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub start: Duration,
    pub end: Duration,
}

impl PartRange {
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Forward sweep over a range, cutting windows of at most `max`.
///
/// Windows shorter than `min` are dropped. Only the last window can be
/// short, so at most one remainder is ever dropped; it is kept in
/// [`PartWindows::dropped`] and logged.
#[derive(Debug, Clone)]
pub struct PartWindows {
    cursor: Duration,
    end: Duration,
    limits: PartLimits,
    dropped: Option<PartRange>,
}

impl PartWindows {
    pub fn new(range: PartRange, limits: PartLimits) -> Self {
        Self {
            cursor: range.start,
            end: range.end,
            limits,
            dropped: None,
        }
    }

    /// The trailing remainder discarded for being too short, once reached.
    pub fn dropped(&self) -> Option<PartRange> {
        self.dropped
    }
}

impl Iterator for PartWindows {
    type Item = PartRange;

    fn next(&mut self) -> Option<PartRange> {
        while self.cursor < self.end {
            let length = self.limits.max.min(self.end - self.cursor);
            let window = PartRange::new(self.cursor, self.cursor + length);
            self.cursor = window.end;

            if length >= self.limits.min {
                return Some(window);
            }

            info!(
                "Dropping trailing {:.3}s ({:.3}s to {:.3}s): shorter than the {:.3}s minimum",
                length.as_secs_f64(),
                window.start.as_secs_f64(),
                window.end.as_secs_f64(),
                self.limits.min.as_secs_f64()
            );
            self.dropped = Some(window);
        }
        None
    }
}

/// Split `[0, timeline_duration)` into part ranges.
pub fn partition(
    timeline_duration: Duration,
    max_duration: Duration,
    min_duration: Duration,
) -> Result<Vec<PartRange>> {
    let limits = PartLimits::new(max_duration, min_duration)?;
    Ok(PartWindows::new(PartRange::new(Duration::ZERO, timeline_duration), limits).collect())
}

/// A music track laid under every part.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTrack {
    pub path: PathBuf,
    pub duration: Duration,
    pub volume: f32,
}

/// The `[0, length]` slice of a background track used under one part.
///
/// Every part starts the music from its beginning.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundAudioWindow {
    track: Arc<BackgroundTrack>,
    length: Duration,
}

impl BackgroundAudioWindow {
    pub fn for_part(track: &Arc<BackgroundTrack>, part_duration: Duration) -> Self {
        Self {
            track: Arc::clone(track),
            length: part_duration.min(track.duration),
        }
    }

    pub fn offset(&self) -> Duration {
        Duration::ZERO
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn track(&self) -> &BackgroundTrack {
        &self.track
    }

    pub fn to_layer(&self) -> Layer {
        Layer::audio(&self.track.path, self.offset(), Duration::ZERO, self.length)
            .with_volume(self.track.volume)
    }
}

/// One output part: a slice of the composed timeline plus its music.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePart {
    /// 1-based position.
    pub index: usize,
    pub range: PartRange,
    pub timeline: Timeline,
    pub music: Option<BackgroundAudioWindow>,
}

impl TimelinePart {
    pub fn start_offset(&self) -> Duration {
        self.range.start
    }

    pub fn end_offset(&self) -> Duration {
        self.range.end
    }

    pub fn duration(&self) -> Duration {
        self.range.duration()
    }

    /// Layers to render: the sliced timeline with the music mixed underneath.
    pub fn render_layers(&self) -> Vec<Layer> {
        let mut layers = self.timeline.layers().to_vec();
        if let Some(music) = &self.music {
            layers.push(music.to_layer());
        }
        layers
    }

    /// `{id}_part_{n}.mp4`
    pub fn file_name(&self, job_id: &str) -> String {
        format!("{}_part_{}.mp4", job_id, self.index)
    }
}

/// Parts of a composed timeline, plus what was left out.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub parts: Vec<TimelinePart>,
    pub dropped: Option<PartRange>,
    pub timeline_duration: Duration,
}

impl PartitionPlan {
    /// Total duration covered by kept parts.
    pub fn covered(&self) -> Duration {
        self.parts.iter().map(|p| p.duration()).sum()
    }
}

/// Partition `timeline` and attach a music window to every kept part.
pub fn split_timeline(
    timeline: &Timeline,
    limits: PartLimits,
    music: Option<&Arc<BackgroundTrack>>,
) -> PartitionPlan {
    let mut windows = PartWindows::new(
        PartRange::new(Duration::ZERO, timeline.duration()),
        limits,
    );

    let parts: Vec<TimelinePart> = windows
        .by_ref()
        .enumerate()
        .map(|(i, range)| TimelinePart {
            index: i + 1,
            range,
            timeline: timeline.slice(range.start, range.end),
            music: music.map(|track| BackgroundAudioWindow::for_part(track, range.duration())),
        })
        .collect();

    PartitionPlan {
        parts,
        dropped: windows.dropped(),
        timeline_duration: timeline.duration(),
    }
}
