//! Seeded entertainment reading built on top of a finished analysis.
//!
//! Nothing here feeds back into the measurement. The same analysis and seed
//! always give the same reading.

use crate::pipeline::PalmAnalysis;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const SHOOTING_SUGGESTION: &str =
    "Photograph the open palm in bright, even light so the whole hand is in frame.";

const EXCELLENT_MESSAGES: &[&str] = &[
    "Remarkable vitality. You will stay lively well into old age.",
    "Your life energy runs deep. Big challenges will not knock you down.",
    "A very strong life line. You bounce back from any hardship.",
];

const GREAT_MESSAGES: &[&str] = &[
    "Excellent vitality. A long and healthy life is in the cards.",
    "A steady, strong life line. Body and mind are both well supplied.",
    "Dependable energy shows here. Expect busy, energetic days.",
];

const GOOD_MESSAGES: &[&str] = &[
    "A solid life line with well balanced health.",
    "Above-average vitality. Small daily habits will lift it further.",
    "A calm, stable life line. A quiet and full life awaits.",
];

const AVERAGE_MESSAGES: &[&str] = &[
    "An average life line. Regular routines will raise your fortune.",
    "A balanced life line. Keep to your own pace and avoid overdoing it.",
    "Standard vitality, with plenty of room to grow.",
];

const DEVELOPING_MESSAGES: &[&str] = &[
    "Your life line is still growing. Effort now pays off later.",
    "A delicate life line often marks a sensitive soul. Look after yourself.",
    "Palms change over time. Healthy living strengthens the line.",
];

const ADVICE: &[&str] = &[
    "Morning sunlight recharges your vitality.",
    "Walks through green places lift your luck.",
    "Drink water often and your palm will follow.",
    "Make deep breathing a habit.",
    "A ready smile improves every kind of fortune.",
    "Gratitude wakes up your life energy.",
    "Early to bed and early to rise strengthens the life line.",
    "Stretching is good for the hands, and the lines on them.",
];

const LUCKY_ITEMS: &[&str] = &[
    "green accessory",
    "gemstone bracelet",
    "leather notebook",
    "small wooden keepsake",
    "blue flowers",
    "silver ring",
    "house plant",
    "favourite mug",
];

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Excellent,
    Great,
    Good,
    Average,
    Developing,
}

impl Rank {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Great
        } else if score >= 45.0 {
            Self::Good
        } else if score >= 30.0 {
            Self::Average
        } else {
            Self::Developing
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "★★★★★ Exceptional",
            Self::Great => "★★★★☆ Great fortune",
            Self::Good => "★★★☆☆ Good fortune",
            Self::Average => "★★☆☆☆ Fair fortune",
            Self::Developing => "★☆☆☆☆ Growing",
        }
    }

    fn messages(&self) -> &'static [&'static str] {
        match self {
            Self::Excellent => EXCELLENT_MESSAGES,
            Self::Great => GREAT_MESSAGES,
            Self::Good => GOOD_MESSAGES,
            Self::Average => AVERAGE_MESSAGES,
            Self::Developing => DEVELOPING_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FortuneDetails {
    pub vitality: u32,
    pub health: u32,
    pub longevity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fortune {
    pub score: u32,
    pub rank: Rank,
    pub rank_label: String,
    pub message: String,
    pub advice: String,
    pub lucky_item: String,
    pub details: FortuneDetails,
    pub life_line_ratio: f64,
    pub reference_width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FortuneReading {
    pub success: bool,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fortune: Option<Fortune>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

pub fn generate(analysis: &PalmAnalysis, seed: u64) -> FortuneReading {
    let measurement = match (&analysis.ratio.measurement, analysis.ratio.valid) {
        (Some(measurement), true) => measurement,
        _ => {
            return FortuneReading {
                success: false,
                seed,
                fortune: None,
                error: Some(
                    analysis
                        .ratio
                        .message
                        .clone()
                        .unwrap_or_else(|| "Analysis failed.".to_string()),
                ),
                suggestion: Some(SHOOTING_SUGGESTION.to_string()),
            };
        }
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let density_bonus = (measurement.confidence * 0.05).clamp(0.0, 5.0);
    let modifier: f64 = rng.random_range(0.97..=1.03);
    let score = ((measurement.score + density_bonus) * modifier).clamp(25.0, 100.0);
    let rank = Rank::from_score(score);

    let pick = |rng: &mut StdRng, options: &[&str]| -> String {
        options.choose(rng).copied().unwrap_or_default().to_string()
    };
    let message = pick(&mut rng, rank.messages());
    let advice = pick(&mut rng, ADVICE);
    let lucky_item = pick(&mut rng, LUCKY_ITEMS);

    let jitter = |rng: &mut StdRng, factor: f64, lo: i32, hi: i32| -> u32 {
        let value = score * factor + rng.random_range(lo..=hi) as f64;
        value.clamp(0.0, 100.0) as u32
    };
    let details = FortuneDetails {
        vitality: jitter(&mut rng, 1.1, -5, 10),
        health: jitter(&mut rng, 0.95, -3, 8),
        longevity: jitter(&mut rng, 1.05, -7, 12),
    };

    FortuneReading {
        success: true,
        seed,
        fortune: Some(Fortune {
            score: score as u32,
            rank,
            rank_label: rank.label().to_string(),
            message,
            advice,
            lucky_item,
            details,
            life_line_ratio: measurement.length_ratio,
            reference_width: measurement.reference_width,
        }),
        error: None,
        suggestion: None,
    }
}
