//! The describe-an-upload request flow.
//!
//! Received → Validated → ImagePrepared → ExternalCallInFlight →
//! Completed | Failed. The request owns its [`TempUpload`] guard for the
//! whole flow, so the file goes away on every return.

use std::time::Instant;

use crate::error::ApiError;
use crate::normalize::normalize;
use crate::prompt::{self, PromptMetadata, PromptMode};
use crate::routes::AppState;
use crate::upload::{TempUpload, UploadForm};

pub const FIELD_DATE: &str = "pictureDate";
pub const FIELD_TIME: &str = "pictureTime";
pub const FIELD_LOCATION: &str = "pictureLocation";
pub const FIELD_LANGUAGE: &str = "language";
pub const FIELD_PERSON: &str = "person";
pub const FIELD_PROMPT: &str = "prompt";

/// A request that passed validation.
#[derive(Debug)]
pub struct ValidatedRequest {
    pub image: TempUpload,
    pub instruction: Instruction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Template(PromptMetadata),
    Caller { prompt: String, language: String },
}

impl Instruction {
    pub fn render(&self, state: &AppState) -> String {
        match self {
            Instruction::Template(meta) => prompt::render(meta, state.config.fallback),
            Instruction::Caller { prompt, language } => {
                prompt::render_caller_prompt(prompt, language)
            }
        }
    }
}

pub fn validate(mut form: UploadForm, mode: PromptMode) -> Result<ValidatedRequest, ApiError> {
    let instruction = match mode {
        PromptMode::Template => template_metadata(&form).map(Instruction::Template),
        PromptMode::Caller => caller_instruction(&form),
    };

    let image = form.image.take().ok_or(ApiError::MissingFile)?;
    let instruction = instruction.ok_or(match mode {
        PromptMode::Template => ApiError::MissingMetadata,
        PromptMode::Caller => ApiError::MissingPrompt,
    })?;

    Ok(ValidatedRequest { image, instruction })
}

fn template_metadata(form: &UploadForm) -> Option<PromptMetadata> {
    Some(PromptMetadata {
        date: form.field(FIELD_DATE)?.to_string(),
        time: form.field(FIELD_TIME)?.to_string(),
        location: form.field(FIELD_LOCATION)?.to_string(),
        person: form.field(FIELD_PERSON)?.to_string(),
        language: form.field(FIELD_LANGUAGE)?.to_string(),
    })
}

fn caller_instruction(form: &UploadForm) -> Option<Instruction> {
    Some(Instruction::Caller {
        prompt: form.field(FIELD_PROMPT)?.to_string(),
        language: form.field(FIELD_LANGUAGE)?.to_string(),
    })
}

pub async fn describe(state: &AppState, form: UploadForm) -> Result<String, ApiError> {
    let started = Instant::now();
    let request = validate(form, state.config.prompt_mode)?;

    let image = normalize(
        request.image.path(),
        request.image.content_type(),
        &state.config.image,
    )
    .await?;
    tracing::debug!(
        original_bytes = request.image.len(),
        normalized_bytes = image.bytes.len(),
        media_type = %image.media_type,
        "image prepared"
    );

    let prompt = request.instruction.render(state);
    let description = state.vision.describe(&prompt, &image).await?;

    tracing::info!(
        model = state.vision.model_name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        chars = description.chars().count(),
        "description generated"
    );

    Ok(description)
}
