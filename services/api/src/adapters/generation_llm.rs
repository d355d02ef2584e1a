//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the study-material LLM.
//! It implements the `ContentGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use study_assistant_core::{
    domain::{GeneratedContent, SourceDocument},
    ports::{ContentGenerationService, GenerationError},
    status::TaskKind,
};
use tracing::{debug, info, warn};

/// Documents longer than this are cut before being sent to the model.
const MAX_INPUT_CHARS: usize = 48_000;

const SUMMARY_INSTRUCTIONS: &str = "You are a study assistant. Summarize the document for a student preparing for an exam. \
Use Markdown with short sections and bullet points. Cover every major concept, keep definitions precise, and do not invent facts that are not in the document. \
Respond with the summary only.";

const QUIZ_INSTRUCTIONS: &str = r#"You are a study assistant that writes exam practice quizzes.
Create between 5 and 10 questions that test understanding of the document.
Respond with a JSON object of the form:
{"questions": [{"type": "mcq" | "short_answer" | "true_false", "question": "...", "correct_answer": "...", "points": 1, "options": ["..."]}]}
"options" is required for "mcq" questions and must contain the correct answer; omit it otherwise.
Respond with the JSON object only."#;

const FLASHCARD_INSTRUCTIONS: &str = r#"You are a study assistant that writes flashcards.
Create between 5 and 15 flashcards covering the key facts and definitions of the document. Do not repeat cards.
Respond with a JSON object of the form:
{"flashcards": [{"question": "...", "answer": "...", "difficulty": "easy" | "medium" | "hard"}]}
Respond with the JSON object only."#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ContentGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn remote(e: OpenAIError) -> GenerationError {
    GenerationError::Remote(e.to_string())
}

//=========================================================================================
// `ContentGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentGenerationService for OpenAiGenerationAdapter {
    async fn generate(
        &self,
        kind: TaskKind,
        document: &SourceDocument,
    ) -> Result<GeneratedContent, GenerationError> {
        let text = document_text(document).await?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instructions_for(kind))
                .build()
                .map_err(remote)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("DOCUMENT: {}\n\n{}", document.name, text))
                .build()
                .map_err(remote)?
                .into(),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages).n(1);
        if kind != TaskKind::Summary {
            request.response_format(ResponseFormat::JsonObject);
        }
        let request = request.build().map_err(remote)?;

        info!("Requesting {} for document {}", kind, document.document_id);
        let response = self.client.chat().create(request).await.map_err(remote)?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::Remote(format!("The {} response contained no text content.", kind))
            })?;

        parse_reply(kind, &reply)
    }
}

fn instructions_for(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Summary => SUMMARY_INSTRUCTIONS,
        TaskKind::Quiz => QUIZ_INSTRUCTIONS,
        TaskKind::Flashcards => FLASHCARD_INSTRUCTIONS,
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracts the document's text and bounds its length.
///
/// PDFs are recognized by their magic bytes and parsed on the blocking pool;
/// anything else must be UTF-8 text.
async fn document_text(document: &SourceDocument) -> Result<String, GenerationError> {
    let text = if document.bytes.starts_with(PDF_MAGIC) {
        let bytes = document.bytes.clone();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| GenerationError::InvalidInput(format!("PDF extraction aborted: {}", e)))?;
        let text = extracted.map_err(|e| {
            warn!("PDF text extraction failed for {}: {}", document.name, e);
            GenerationError::InvalidInput(format!("{} could not be read as a PDF: {}", document.name, e))
        })?;
        debug!("Extracted {} bytes of text from PDF {}", text.len(), document.name);
        text
    } else {
        std::str::from_utf8(&document.bytes)
            .map_err(|_| {
                GenerationError::InvalidInput(format!(
                    "{} ({}) is an unsupported binary format",
                    document.name, document.file_type
                ))
            })?
            .to_string()
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::InvalidInput(format!(
            "{} contains no text",
            document.name
        )));
    }
    Ok(text.chars().take(MAX_INPUT_CHARS).collect())
}

/// Turns the model's reply into task content, checking the JSON shape for
/// structured kinds.
fn parse_reply(kind: TaskKind, reply: &str) -> Result<GeneratedContent, GenerationError> {
    let reply = strip_code_fence(reply.trim());

    let list_key = match kind {
        TaskKind::Summary => {
            if reply.is_empty() {
                return Err(GenerationError::Remote("The summary was empty.".to_string()));
            }
            return Ok(GeneratedContent::Text(reply.to_string()));
        }
        TaskKind::Quiz => "questions",
        TaskKind::Flashcards => "flashcards",
    };

    let value: serde_json::Value = serde_json::from_str(reply).map_err(|e| {
        GenerationError::Remote(format!("The {} response was not valid JSON: {}", kind, e))
    })?;
    match value.get(list_key) {
        Some(serde_json::Value::Array(items)) if !items.is_empty() => {
            Ok(GeneratedContent::Structured(value))
        }
        _ => Err(GenerationError::Remote(format!(
            "The {} response had no '{}' entries.",
            kind, list_key
        ))),
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let Some(body) = reply.strip_prefix("```") else {
        return reply;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use uuid::Uuid;

    fn source(bytes: &'static [u8]) -> SourceDocument {
        SourceDocument {
            document_id: Uuid::new_v4(),
            name: "bio.txt".to_string(),
            file_type: "text/plain".to_string(),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn summary_reply_is_kept_as_text() {
        let content = parse_reply(TaskKind::Summary, "  # Cells\n- divide  ").unwrap();
        assert_eq!(content, GeneratedContent::Text("# Cells\n- divide".to_string()));
    }

    #[test]
    fn quiz_reply_must_be_json_with_questions() {
        let reply = r#"```json
{"questions": [{"type": "true_false", "question": "Cells divide?", "correct_answer": "true", "points": 1}]}
```"#;
        let content = parse_reply(TaskKind::Quiz, reply).unwrap();
        let GeneratedContent::Structured(value) = content else {
            panic!("expected structured content");
        };
        assert_eq!(value["questions"][0]["correct_answer"], "true");

        let err = parse_reply(TaskKind::Quiz, "Here is your quiz!").unwrap_err();
        assert!(matches!(err, GenerationError::Remote(_)));

        let err = parse_reply(TaskKind::Quiz, r#"{"questions": []}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Remote(_)));
    }

    #[test]
    fn flashcards_need_the_flashcards_key() {
        assert!(parse_reply(
            TaskKind::Flashcards,
            r#"{"flashcards": [{"question": "q", "answer": "a", "difficulty": "easy"}]}"#
        )
        .is_ok());
        assert!(parse_reply(TaskKind::Flashcards, r#"{"cards": [1]}"#).is_err());
    }

    #[tokio::test]
    async fn binary_or_empty_documents_are_invalid_input() {
        let err = document_text(&source(&[0xff, 0xfe, 0x00])).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));

        let err = document_text(&source(b"   \n")).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));

        assert_eq!(document_text(&source(b" Mitosis. ")).await.unwrap(), "Mitosis.");
    }

    #[tokio::test]
    async fn pdf_text_is_extracted() {
        let pdf = include_bytes!("../../tests/fixtures/photosynthesis.pdf");
        let mut document = source(pdf);
        document.name = "photosynthesis.pdf".to_string();
        document.file_type = "application/pdf".to_string();

        let text = document_text(&document).await.unwrap();
        assert!(text.contains("Photosynthesis"), "extracted: {:?}", text);
        assert!(text.contains("sunlight"), "extracted: {:?}", text);
    }

    #[tokio::test]
    async fn corrupt_pdf_is_invalid_input() {
        let err = document_text(&source(b"%PDF-1.4\nnot really a pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
    }
}
