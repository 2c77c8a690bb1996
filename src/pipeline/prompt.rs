//! Prompt building: chunks → ordered multimodal request.
//!
//! ## Message Layout
//!
//! 1. **Instruction** (system role): the tamper-detection task and the JSON
//!    schema from [`crate::prompts`].
//! 2. **One image per chunk** (user role), in chunk order, with empty text.
//!
//! No chunk number is written next to the images. The model numbers the
//! strips by their position in the conversation, which is why the messages
//! must follow [`Chunk::index`] order exactly: a reordered request makes the
//! returned indices point at the wrong bounding boxes.

use crate::error::TamperError;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::encode::encode_chunk;
use crate::prompts::TAMPER_DETECTION_PROMPT;
use edgequake_llm::{ChatMessage, ImageData};

/// One entry of an [`AnalysisRequest`].
#[derive(Debug, Clone)]
pub enum RequestMessage {
    /// The system instruction.
    Instruction(String),
    /// A chunk image, transported as base64 PNG.
    ChunkImage(ImageData),
}

impl RequestMessage {
    /// Convert to the provider-neutral chat message type.
    pub fn to_chat_message(&self) -> ChatMessage {
        match self {
            RequestMessage::Instruction(text) => ChatMessage::system(text.as_str()),
            RequestMessage::ChunkImage(image) => {
                ChatMessage::user_with_images("", vec![image.clone()])
            }
        }
    }
}

/// The complete, ordered request for one page.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub messages: Vec<RequestMessage>,
}

impl AnalysisRequest {
    /// Number of chunk images carried by the request.
    pub fn chunk_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, RequestMessage::ChunkImage(_)))
            .count()
    }

    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(RequestMessage::to_chat_message).collect()
    }
}

/// Build the request with the default instruction.
pub fn build_request(chunks: &[Chunk]) -> Result<AnalysisRequest, TamperError> {
    build_request_with_prompt(chunks, TAMPER_DETECTION_PROMPT)
}

/// Build the request with a caller-supplied instruction.
///
/// `chunks` must already be in index order, as produced by
/// [`crate::pipeline::chunk::chunk`].
pub fn build_request_with_prompt(
    chunks: &[Chunk],
    instruction: &str,
) -> Result<AnalysisRequest, TamperError> {
    debug_assert!(chunks.windows(2).all(|w| w[0].index < w[1].index));

    let mut messages = Vec::with_capacity(chunks.len() + 1);
    messages.push(RequestMessage::Instruction(instruction.to_string()));
    for chunk in chunks {
        messages.push(RequestMessage::ChunkImage(encode_chunk(&chunk.pixels)?));
    }
    Ok(AnalysisRequest { messages })
}
