//! Layered timeline model shared by composition, partitioning and rendering.
//!
//! A [`Timeline`] is an ordered list of [`Layer`]s over `[0, duration)`.
//! Visual layers later in the list are drawn on top of earlier ones; audible
//! layers are mixed.

pub mod compose;
pub mod partition;

pub use compose::{compose, compose_body, compose_title, Background, BodyAssets, TitleAssets};
pub use partition::{
    partition, split_timeline, BackgroundAudioWindow, BackgroundTrack, PartLimits, PartRange,
    PartWindows, PartitionPlan, TimelinePart,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where a visual layer is placed on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Fill the whole frame (background footage).
    Fill,
    #[default]
    Center,
    /// Horizontally centred, vertical centre at this fraction of the height.
    Row(f32),
    /// Top-left corner in pixels.
    At { x: i32, y: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerSource {
    /// Footage played from `in_point`, repeated from the top when `looped`.
    Video {
        path: PathBuf,
        in_point: Duration,
        looped: bool,
    },
    Image {
        path: PathBuf,
    },
    Caption {
        text: String,
    },
    Audio {
        path: PathBuf,
        in_point: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub source: LayerSource,
    /// Offset on the timeline.
    pub start: Duration,
    pub duration: Duration,
    pub position: Position,
    pub volume: f32,
}

impl Layer {
    fn new(source: LayerSource, start: Duration, duration: Duration) -> Self {
        Self {
            source,
            start,
            duration,
            position: Position::default(),
            volume: 1.0,
        }
    }

    pub fn video(
        path: impl Into<PathBuf>,
        in_point: Duration,
        start: Duration,
        duration: Duration,
    ) -> Self {
        Self::new(
            LayerSource::Video {
                path: path.into(),
                in_point,
                looped: false,
            },
            start,
            duration,
        )
        .with_position(Position::Fill)
    }

    pub fn image(path: impl Into<PathBuf>, start: Duration, duration: Duration) -> Self {
        Self::new(LayerSource::Image { path: path.into() }, start, duration)
    }

    pub fn caption(text: impl Into<String>, start: Duration, duration: Duration) -> Self {
        Self::new(LayerSource::Caption { text: text.into() }, start, duration)
    }

    pub fn audio(
        path: impl Into<PathBuf>,
        in_point: Duration,
        start: Duration,
        duration: Duration,
    ) -> Self {
        Self::new(
            LayerSource::Audio {
                path: path.into(),
                in_point,
            },
            start,
            duration,
        )
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Repeat video footage when it runs out before the layer ends.
    pub fn looped(mut self) -> Self {
        if let LayerSource::Video { looped, .. } = &mut self.source {
            *looped = true;
        }
        self
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    pub fn is_visual(&self) -> bool {
        !matches!(self.source, LayerSource::Audio { .. })
    }

    /// Whether the layer contributes to the audio mix.
    pub fn is_audible(&self) -> bool {
        matches!(
            self.source,
            LayerSource::Video { .. } | LayerSource::Audio { .. }
        ) && self.volume > 0.0
    }

    fn shifted(mut self, offset: Duration) -> Self {
        self.start += offset;
        self
    }

    /// The part of this layer inside `[from, to)`, re-based so that `from`
    /// becomes zero. Media sources advance their in-point by the amount cut
    /// from the front.
    pub fn clipped(&self, from: Duration, to: Duration) -> Option<Layer> {
        let start = self.start.max(from);
        let end = self.end().min(to);
        if end <= start {
            return None;
        }

        let cut = start - self.start;
        let mut layer = self.clone();
        layer.start = start - from;
        layer.duration = end - start;
        match &mut layer.source {
            LayerSource::Video { in_point, .. } | LayerSource::Audio { in_point, .. } => {
                *in_point += cut;
            }
            LayerSource::Image { .. } | LayerSource::Caption { .. } => {}
        }
        Some(layer)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    layers: Vec<Layer>,
    duration: Duration,
}

impl Timeline {
    pub fn new(duration: Duration) -> Self {
        Self {
            layers: Vec::new(),
            duration,
        }
    }

    /// Add a layer on top. Anything past the timeline's end is cut off.
    pub fn push(&mut self, layer: Layer) {
        if let Some(layer) = layer.clipped(Duration::ZERO, self.duration) {
            self.layers.push(layer);
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn visual_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_visual())
    }

    pub fn audible_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_audible())
    }

    /// Append `next` after this timeline. Its layers are shifted by this
    /// timeline's duration and stack above the existing ones.
    pub fn concat(mut self, next: Timeline) -> Timeline {
        let offset = self.duration;
        self.layers
            .extend(next.layers.into_iter().map(|l| l.shifted(offset)));
        self.duration += next.duration;
        self
    }

    /// The sub-timeline covering `[start, end)`, re-based to zero.
    pub fn slice(&self, start: Duration, end: Duration) -> Timeline {
        let end = end.min(self.duration);
        let start = start.min(end);
        Timeline {
            layers: self
                .layers
                .iter()
                .filter_map(|l| l.clipped(start, end))
                .collect(),
            duration: end - start,
        }
    }
}
