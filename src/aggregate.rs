//! Fixed-schema emotion rows.
//!
//! The endpoint may return any subset of labels, in any order, with repeats.
//! [`to_row`] folds that into an [`EmotionRow`] with exactly seven scores in
//! [`Emotion::ALL`] order; labels outside the vocabulary are ignored and a
//! failed frame becomes the zero row.

use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{client::InferenceResult, error::InferenceFailure};

/// The seven emotion classes, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Sad,
    Disgust,
    Angry,
    Neutral,
    Fear,
    Surprise,
    Happy,
}

impl Emotion {
    /// Column order of the output table.
    pub const ALL: [Emotion; 7] = [
        Emotion::Sad,
        Emotion::Disgust,
        Emotion::Angry,
        Emotion::Neutral,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Happy,
    ];

    /// Label as the endpoint spells it and as the table header shows it.
    pub fn label(self) -> &'static str {
        match self {
            Emotion::Sad => "sad",
            Emotion::Disgust => "disgust",
            Emotion::Angry => "angry",
            Emotion::Neutral => "neutral",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Happy => "happy",
        }
    }

    fn column(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Emotion {
    type Err = ();

    /// Exact, case-sensitive match against [`Emotion::label`].
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .into_iter()
            .find(|emotion| emotion.label() == label)
            .ok_or(())
    }
}

/// Whether a row's scores came from the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowStatus {
    /// The endpoint answered with scores.
    #[default]
    Ok,
    /// Classification failed; every score is zero.
    Failed(InferenceFailure),
}

impl RowStatus {
    /// `"ok"` or the failure kind tag.
    pub fn tag(&self) -> &'static str {
        match self {
            RowStatus::Ok => "ok",
            RowStatus::Failed(failure) => failure.kind(),
        }
    }
}

/// One output row: a frame index and seven scores.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionRow {
    /// Position of the sampled frame in the source video.
    pub frame: u64,
    scores: [f64; 7],
    status: RowStatus,
}

impl EmotionRow {
    /// The zero row for `frame`.
    pub fn zeroed(frame: u64) -> Self {
        Self {
            frame,
            scores: [0.0; 7],
            status: RowStatus::Ok,
        }
    }

    /// Score of one emotion.
    pub fn score(&self, emotion: Emotion) -> f64 {
        self.scores[emotion.column()]
    }

    /// All seven scores in [`Emotion::ALL`] order.
    pub fn scores(&self) -> &[f64; 7] {
        &self.scores
    }

    /// How the row was produced.
    pub fn status(&self) -> &RowStatus {
        &self.status
    }

    /// Highest-scoring emotion, or `None` for an all-zero row.
    pub fn dominant(&self) -> Option<Emotion> {
        Emotion::ALL
            .into_iter()
            .filter(|emotion| self.score(*emotion) > 0.0)
            .fold(None, |best: Option<Emotion>, emotion| match best {
                Some(current) if self.score(current) >= self.score(emotion) => Some(current),
                _ => Some(emotion),
            })
    }

    fn set(&mut self, emotion: Emotion, score: f64) {
        self.scores[emotion.column()] = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

impl Serialize for EmotionRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + Emotion::ALL.len()))?;
        map.serialize_entry("Frame", &self.frame)?;
        for emotion in Emotion::ALL {
            map.serialize_entry(emotion.label(), &self.score(emotion))?;
        }
        map.end()
    }
}

/// Reduce one classification result into the fixed seven-column row.
///
/// Repeated labels keep the last score. Scores are clamped into `[0, 1]` and
/// non-finite values read as zero.
pub fn to_row(frame: u64, result: &InferenceResult) -> EmotionRow {
    let mut row = EmotionRow::zeroed(frame);
    match result {
        InferenceResult::Success(scores) => {
            for pair in scores {
                if let Ok(emotion) = pair.label.parse::<Emotion>() {
                    row.set(emotion, pair.score);
                }
            }
        }
        InferenceResult::Failure(failure) => row.status = RowStatus::Failed(failure.clone()),
    }
    row
}
