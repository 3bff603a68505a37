use super::{Layer, Position, Timeline};
use crate::caption::CaptionUnit;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Vertical placement of the title caption.
const TITLE_CAPTION_ROW: f32 = 0.2;

/// Vertical placement of body captions.
const BODY_CAPTION_ROW: f32 = 0.5;

/// Footage playing behind both segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub video: PathBuf,
    /// Where in the footage the title segment starts.
    pub in_point: Duration,
    pub looped: bool,
    /// Volume of the footage's own sound; 0 mutes it.
    pub volume: f32,
}

impl Background {
    fn layer(&self, in_point: Duration, duration: Duration) -> Layer {
        let layer = Layer::video(&self.video, in_point, Duration::ZERO, duration)
            .with_volume(self.volume);
        if self.looped {
            layer.looped()
        } else {
            layer
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleAssets {
    pub audio: PathBuf,
    pub audio_duration: Duration,
    pub image: Option<PathBuf>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyAssets {
    pub audio: PathBuf,
    pub audio_duration: Duration,
    pub captions: Vec<CaptionUnit>,
}

/// Title segment: background, centred image, optional caption and the title
/// narration, all spanning the narration's length.
pub fn compose_title(background: &Background, title: &TitleAssets) -> Timeline {
    let duration = title.audio_duration;
    let mut timeline = Timeline::new(duration);

    timeline.push(background.layer(background.in_point, duration));
    if let Some(image) = &title.image {
        timeline.push(Layer::image(image, Duration::ZERO, duration).with_position(Position::Center));
    }
    if let Some(caption) = &title.caption {
        timeline.push(
            Layer::caption(caption, Duration::ZERO, duration)
                .with_position(Position::Row(TITLE_CAPTION_ROW)),
        );
    }
    timeline.push(Layer::audio(&title.audio, Duration::ZERO, Duration::ZERO, duration));

    timeline
}

/// Body segment: background continuing `footage_offset` past its in-point,
/// one caption layer per unit during its window, and the body narration.
///
/// Captions reaching past the narration are cut at its end.
pub fn compose_body(background: &Background, body: &BodyAssets, footage_offset: Duration) -> Timeline {
    let duration = body.audio_duration;
    let mut timeline = Timeline::new(duration);

    timeline.push(background.layer(background.in_point + footage_offset, duration));
    for unit in &body.captions {
        if unit.start() >= duration {
            debug!(
                "Caption '{}' starts at {:.3}s, after the narration ends",
                unit.text(),
                unit.start().as_secs_f64()
            );
            continue;
        }
        timeline.push(
            Layer::caption(unit.text(), unit.start(), unit.duration())
                .with_position(Position::Row(BODY_CAPTION_ROW)),
        );
    }
    timeline.push(Layer::audio(&body.audio, Duration::ZERO, Duration::ZERO, duration));

    timeline
}

/// The full timeline: title followed by body.
///
/// The background footage runs continuously across the join.
pub fn compose(background: &Background, title: &TitleAssets, body: &BodyAssets) -> Timeline {
    let title_timeline = compose_title(background, title);
    let body_timeline = compose_body(background, body, title_timeline.duration());
    debug!(
        "Composed title ({:.3}s, {} layers) and body ({:.3}s, {} layers)",
        title_timeline.duration().as_secs_f64(),
        title_timeline.layers().len(),
        body_timeline.duration().as_secs_f64(),
        body_timeline.layers().len()
    );
    title_timeline.concat(body_timeline)
}
