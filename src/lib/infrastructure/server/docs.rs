use super::dto::{
    AddOwnerRequest, AddOwnerResponse, ErrorResponse, OperationsResponse, OwnersResponse,
    PromptsResponse, ReconnectResponse, ResolvePromptRequest, ResourceContentsResponse,
    ResourcesResponse, RestChatRequest,
};
use super::routes;
use crate::application::agent::{ProgressChunk, RunTranscript, TranscriptStep};
use crate::application::capability::{
    ConnectionState, ContentBlock, Operation, Prompt, PromptArgument, PromptMessage,
    ResolvedPrompt, Resource, ResourceTemplate, ServerIdentity,
};
use crate::application::router::OwnerStatus;
use crate::domain::{ChatMessage, InvocationRequest, MessageRole};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::chat::chat_handler,
        routes::chat::chat_stream_handler,
        routes::operations::operations_handler,
        routes::owners::owners_handler,
        routes::owners::add_owner_handler,
        routes::owners::reconnect_handler,
        routes::capabilities::resources_handler,
        routes::capabilities::read_resource_handler,
        routes::capabilities::prompts_handler,
        routes::capabilities::resolve_prompt_handler
    ),
    components(
        schemas(
            RestChatRequest,
            ErrorResponse,
            OperationsResponse,
            OwnersResponse,
            AddOwnerRequest,
            AddOwnerResponse,
            ReconnectResponse,
            ResourcesResponse,
            ResourceContentsResponse,
            PromptsResponse,
            ResolvePromptRequest,
            Resource,
            ResourceTemplate,
            ContentBlock,
            Prompt,
            PromptArgument,
            PromptMessage,
            ResolvedPrompt,
            ProgressChunk,
            RunTranscript,
            TranscriptStep,
            Operation,
            OwnerStatus,
            ConnectionState,
            ServerIdentity,
            ChatMessage,
            InvocationRequest,
            MessageRole
        )
    ),
    tags(
        (name = "chat", description = "Run the agent over a conversation"),
        (name = "operations", description = "Aggregated operations across capability servers"),
        (name = "owners", description = "Capability server registration, status, resources and prompts")
    )
)]
pub(super) struct ApiDoc;
