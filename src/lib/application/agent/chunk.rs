use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// One unit of a run's progress, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressChunk {
    /// Marks the start of a cycle. Informational only.
    Cycle { number: usize, limit: usize },
    Reasoning { text: String },
    AnswerToken { text: String },
    InvocationStarted {
        request_id: String,
        name: String,
        #[schema(value_type = Object)]
        arguments: Value,
    },
    Observation {
        name: String,
        text: String,
        is_error: bool,
    },
    InvocationResult {
        request_id: String,
        name: String,
        text: String,
        is_error: bool,
    },
    /// Terminal answer. `forced` is set when the cycle cap was hit.
    Final { answer: String, forced: bool },
    Error { message: String },
}

impl ProgressChunk {
    /// Wire event name, equal to the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressChunk::Cycle { .. } => "cycle",
            ProgressChunk::Reasoning { .. } => "reasoning",
            ProgressChunk::AnswerToken { .. } => "answer_token",
            ProgressChunk::InvocationStarted { .. } => "invocation_started",
            ProgressChunk::Observation { .. } => "observation",
            ProgressChunk::InvocationResult { .. } => "invocation_result",
            ProgressChunk::Final { .. } => "final",
            ProgressChunk::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressChunk::Final { .. } | ProgressChunk::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TranscriptStep {
    pub request_id: String,
    pub name: String,
    #[schema(value_type = Object)]
    pub arguments: Value,
    pub output: String,
    pub is_error: bool,
}

/// A run folded into a single value for callers that do not stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct RunTranscript {
    pub answer: Option<String>,
    pub forced: bool,
    pub cycles: usize,
    pub reasoning: String,
    pub steps: Vec<TranscriptStep>,
    pub error: Option<String>,
}

impl RunTranscript {
    pub fn push(&mut self, chunk: &ProgressChunk) {
        match chunk {
            ProgressChunk::Cycle { number, .. } => self.cycles = *number,
            ProgressChunk::Reasoning { text } => self.reasoning.push_str(text),
            ProgressChunk::AnswerToken { .. } | ProgressChunk::Observation { .. } => {}
            ProgressChunk::InvocationStarted {
                request_id,
                name,
                arguments,
            } => self.steps.push(TranscriptStep {
                request_id: request_id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
                output: String::new(),
                is_error: false,
            }),
            ProgressChunk::InvocationResult {
                request_id,
                text,
                is_error,
                ..
            } => {
                if let Some(step) = self
                    .steps
                    .iter_mut()
                    .rev()
                    .find(|step| &step.request_id == request_id)
                {
                    step.output = text.clone();
                    step.is_error = *is_error;
                }
            }
            ProgressChunk::Final { answer, forced } => {
                self.answer = Some(answer.clone());
                self.forced = *forced;
            }
            ProgressChunk::Error { message } => self.error = Some(message.clone()),
        }
    }

    pub fn from_chunks<'a, I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'a ProgressChunk>,
    {
        let mut transcript = Self::default();
        for chunk in chunks {
            transcript.push(chunk);
        }
        transcript
    }
}
