//! Emotion tags and the fixed tables keyed by them.
//!
//! Emotion is never detected here; it arrives as a free-form tag and is
//! normalized onto seven known keys. Anything unrecognized is `Neutral`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    #[default]
    Neutral,
}

/// ElevenLabs-style voice modulation for an emotion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Neutral,
    ];

    /// Normalize a tag. Case and surrounding whitespace are ignored.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "angry" => Emotion::Angry,
            "surprised" => Emotion::Surprised,
            "fearful" => Emotion::Fearful,
            "disgusted" => Emotion::Disgusted,
            _ => Emotion::Neutral,
        }
    }

    /// Like [`Emotion::parse`] but treats a missing tag as neutral.
    pub fn from_tag(tag: Option<&str>) -> Self {
        tag.map(Self::parse).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Neutral => "neutral",
        }
    }

    /// Prompt annotation appended to the persona.
    pub fn guidance(&self) -> &'static str {
        match self {
            Emotion::Happy => "The user seems happy and upbeat. Match their positive energy while being genuinely enthusiastic.",
            Emotion::Sad => "The user appears sad or down. Be extra compassionate, gentle, and supportive. Offer comfort and understanding.",
            Emotion::Angry => "The user seems frustrated or angry. Be calm, understanding, and help them process their feelings without judgment.",
            Emotion::Surprised => "The user appears surprised. Be curious and engaged, helping them process whatever has caught them off guard.",
            Emotion::Fearful => "The user seems anxious or fearful. Be reassuring, calm, and supportive. Help them feel safe and understood.",
            Emotion::Disgusted => "The user appears disgusted or upset about something. Be understanding and help them work through their feelings.",
            Emotion::Neutral => "The user seems calm and neutral. Be warm and engaging while matching their balanced emotional state.",
        }
    }

    /// Static reply used when the language model is unavailable.
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            Emotion::Sad => "I'm here for you. Sometimes it helps just to know someone is listening.",
            Emotion::Angry => "I can sense you're frustrated. Take a deep breath - I'm here to help.",
            Emotion::Happy => "I love seeing your positive energy! Tell me more about what's making you happy.",
            Emotion::Fearful => "It's okay to feel anxious. You're safe here, and we can work through this together.",
            Emotion::Surprised => "That sounds unexpected! I'd love to hear more about what happened.",
            Emotion::Disgusted => "I can tell something is bothering you. Want to talk about it?",
            Emotion::Neutral => "I'm here and ready to listen. What's on your mind?",
        }
    }

    /// Voice settings for speech synthesis. Disgusted shares neutral's.
    pub fn voice_settings(&self) -> VoiceSettings {
        let (stability, similarity_boost, style, use_speaker_boost) = match self {
            Emotion::Happy => (0.7, 0.8, 0.3, true),
            Emotion::Sad => (0.9, 0.6, 0.1, false),
            Emotion::Angry => (0.6, 0.9, 0.4, true),
            Emotion::Surprised => (0.5, 0.8, 0.5, true),
            Emotion::Fearful => (0.8, 0.7, 0.2, false),
            Emotion::Disgusted | Emotion::Neutral => (0.75, 0.75, 0.25, true),
        };
        VoiceSettings {
            stability,
            similarity_boost,
            style,
            use_speaker_boost,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
