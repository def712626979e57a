//! Narration prompt rendering.
//!
//! The template is fixed; only the metadata values and the fallback clause
//! vary. Values are spliced in once with `format!`, never re-scanned, so
//! placeholder-looking text inside a value stays literal.

use std::fmt;
use std::str::FromStr;

/// Code the model is told to answer with under [`FallbackPolicy::Sentinel`].
pub const SENTINEL_CODE: &str = "404";

/// Upper bound on the narration length requested from the model.
pub const MAX_RESPONSE_CHARS: usize = 500;

/// What the model should do when it cannot describe the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Answer with [`SENTINEL_CODE`] and nothing else.
    #[default]
    Sentinel,
    /// Briefly explain why no description can be given.
    Refusal,
    /// Reinterpret the scene within content policy and describe what is allowed.
    Reinterpret,
}

impl FallbackPolicy {
    fn instruction(self) -> String {
        match self {
            FallbackPolicy::Sentinel => format!(
                "If you really cannot describe it in any other way, respond only with the code \"{}\" and nothing else.",
                SENTINEL_CODE
            ),
            FallbackPolicy::Refusal => "If you really cannot describe it, explain briefly and politely, in the same language, why no description can be given.".to_string(),
            FallbackPolicy::Reinterpret => "If some part of the scene cannot be described as it is, reinterpret it in a way that respects your content policy and describe what can be described, without mentioning the reinterpretation.".to_string(),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sentinel" => Ok(FallbackPolicy::Sentinel),
            "refusal" => Ok(FallbackPolicy::Refusal),
            "reinterpret" => Ok(FallbackPolicy::Reinterpret),
            other => Err(format!(
                "unknown fallback policy '{}', expected sentinel, refusal or reinterpret",
                other
            )),
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FallbackPolicy::Sentinel => "sentinel",
            FallbackPolicy::Refusal => "refusal",
            FallbackPolicy::Reinterpret => "reinterpret",
        };
        f.write_str(name)
    }
}

/// Where the instruction text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptMode {
    /// Built server-side from the picture metadata.
    #[default]
    Template,
    /// Supplied pre-rendered by the caller in a `prompt` field.
    Caller,
}

impl FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "template" => Ok(PromptMode::Template),
            "caller" => Ok(PromptMode::Caller),
            other => Err(format!(
                "unknown prompt mode '{}', expected template or caller",
                other
            )),
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptMode::Template => "template",
            PromptMode::Caller => "caller",
        })
    }
}

/// Context about when, where and by whom the picture was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMetadata {
    pub date: String,
    pub time: String,
    pub location: String,
    pub person: String,
    pub language: String,
}

pub fn render(meta: &PromptMetadata, fallback: FallbackPolicy) -> String {
    format!(
        "Describe this scene as it was seen by {person}, with the sensory details and emotions it carries: \
its layout, colors, shapes, actions, details and atmosphere. Do not add anything that is not visible. \
Be precise while keeping an organic, human tone, so that someone who has never seen it can picture it vividly. \
If there are people, describe them physically and give your impression of whether they seem more feminine or masculine, \
older or younger, without claiming certainty. \
Weave the date \"{date}\", the time \"{time}\" and the location \"{location}\" into the narrative in a fluid way; \
they do not have to appear as exact values and must not be listed upfront. \
Avoid negations: if something cannot be described, leave it out or convey its essence another way. \
Never say that this is a picture, an image or a photo. \
Vary sentence structure and phrasing so that each description feels unique. \
Limit your response to {max_chars} characters. \
Respond in {language}. \
{fallback}",
        person = meta.person,
        date = meta.date,
        time = meta.time,
        location = meta.location,
        language = meta.language,
        max_chars = MAX_RESPONSE_CHARS,
        fallback = fallback.instruction(),
    )
}

/// Caller-supplied instructions, pinned to the requested output language.
pub fn render_caller_prompt(prompt: &str, language: &str) -> String {
    format!("{}\n\nRespond in {}.", prompt.trim_end(), language)
}
