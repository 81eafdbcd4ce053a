use super::agent::{ProgressChunk, RunTranscript, TranscriptStep};
use super::service::ChatService;
use crate::domain::Conversation;
use futures::StreamExt;
use serde_json::to_string_pretty;
use thiserror::Error;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
}

struct SessionState {
    conversation: Conversation,
    show_reasoning: bool,
    last_steps: Vec<TranscriptStep>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            show_reasoning: false,
            last_steps: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.conversation = Conversation::new();
        self.last_steps.clear();
    }
}

enum LoopControl {
    Continue,
    Exit,
}

/// Interactive session on the process's stdin/stdout.
pub async fn run(service: ChatService) -> Result<(), StdioError> {
    let mut stdout = io::stdout();
    let stdin = BufReader::new(io::stdin());
    run_with(&service, stdin, &mut stdout).await
}

pub async fn run_with<R, W>(service: &ChatService, input: R, output: &mut W) -> Result<(), StdioError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut state = SessionState::new();

    print_banner(output).await?;
    print_help(output).await?;

    loop {
        prompt(output).await?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => {
                write_line(output, "\nInput closed. Leaving stdio mode.").await?;
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if matches!(input.chars().next(), Some('/') | Some(':')) {
            match handle_command(input, &mut state, service, output).await? {
                LoopControl::Continue => continue,
                LoopControl::Exit => break,
            }
        } else {
            handle_prompt(service, &mut state, input, output).await?;
        }
    }

    output.flush().await?;
    Ok(())
}

async fn handle_command<W: AsyncWrite + Unpin>(
    input: &str,
    state: &mut SessionState,
    service: &ChatService,
    output: &mut W,
) -> Result<LoopControl, StdioError> {
    let command = input.trim_start_matches(['/', ':']);
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    debug!(command = %name, "Processing stdio command");

    match name.as_str() {
        "" => {}
        "help" | "?" => print_help(output).await?,
        "exit" | "quit" | "q" => {
            write_line(output, "Closing stdio mode.").await?;
            return Ok(LoopControl::Exit);
        }
        "reset" | "clear" => {
            state.reset();
            write_line(output, "Conversation cleared.").await?;
        }
        "reasoning" => {
            state.show_reasoning = match args.first().copied() {
                Some("on") => true,
                Some("off") => false,
                _ => !state.show_reasoning,
            };
            let status = if state.show_reasoning { "shown" } else { "hidden" };
            write_line(output, &format!("Reasoning is now {status}.")).await?;
        }
        "tools" | "operations" => {
            let operations = service.router().list_all_operations().await;
            if operations.is_empty() {
                write_line(output, "No operations available.").await?;
            }
            for operation in operations {
                let mut line = format!("  - {} [{}]", operation.name, operation.owner_id);
                if !operation.description.is_empty() {
                    line.push_str(&format!(" - {}", operation.description));
                }
                write_line(output, &line).await?;
            }
        }
        "owners" | "servers" => {
            let statuses = service.router().owner_statuses().await;
            if statuses.is_empty() {
                write_line(output, "No capability servers registered.").await?;
            }
            for status in statuses {
                write_line(
                    output,
                    &format!(
                        "  - {} ({:?}) {} operations -> {}",
                        status.id, status.state, status.operations, status.endpoint
                    ),
                )
                .await?;
            }
        }
        "reconnect" => match args.first() {
            Some(id) => match service.router().reconnect(id).await {
                Ok(_) => write_line(output, &format!("Reconnected '{id}'.")).await?,
                Err(err) => write_line(output, &format!("Reconnect failed: {err}")).await?,
            },
            None => write_line(output, "Usage: /reconnect <server-id>").await?,
        },
        "resources" => match args.first() {
            Some(id) => print_resources(output, service, id).await?,
            None => write_line(output, "Usage: /resources <server-id>").await?,
        },
        "read" => match (args.first(), args.get(1)) {
            (Some(id), Some(uri)) => match service.router().client(id).await {
                Some(client) => match client.read_resource(uri).await {
                    Ok(blocks) => {
                        for block in blocks {
                            write_line(output, &block.render()).await?;
                        }
                    }
                    Err(err) => write_line(output, &format!("Read failed: {err}")).await?,
                },
                None => write_line(output, &format!("Unknown server '{id}'.")).await?,
            },
            _ => write_line(output, "Usage: /read <server-id> <uri>").await?,
        },
        "prompts" => match args.first() {
            Some(id) => print_prompts(output, service, id).await?,
            None => write_line(output, "Usage: /prompts <server-id>").await?,
        },
        "steps" => {
            if state.last_steps.is_empty() {
                write_line(output, "No tool calls in the last exchange.").await?;
            } else {
                print_tool_steps(output, &state.last_steps).await?;
            }
        }
        other => {
            write_line(
                output,
                &format!("Unknown command '{other}'. Use /help for help."),
            )
            .await?;
        }
    }
    Ok(LoopControl::Continue)
}

async fn handle_prompt<W: AsyncWrite + Unpin>(
    service: &ChatService,
    state: &mut SessionState,
    message: &str,
    output: &mut W,
) -> Result<(), StdioError> {
    info!("Processing interactive stdio request");
    state.conversation.push_user(message);

    let mut chunks = service
        .start(state.conversation.clone(), None, None)
        .await;
    let mut transcript = RunTranscript::default();
    write_line(output, "").await?;
    while let Some(chunk) = chunks.next().await {
        transcript.push(&chunk);
        render_chunk(output, &chunk, state.show_reasoning).await?;
    }

    match (&transcript.answer, &transcript.error) {
        (Some(answer), _) => state.conversation.push_assistant(answer.clone(), Vec::new()),
        (None, Some(error)) => warn!(%error, "Run ended with an error"),
        (None, None) => warn!("Run ended without an answer"),
    }
    state.last_steps = transcript.steps;
    output.flush().await?;
    Ok(())
}

async fn render_chunk<W: AsyncWrite + Unpin>(
    output: &mut W,
    chunk: &ProgressChunk,
    show_reasoning: bool,
) -> io::Result<()> {
    match chunk {
        ProgressChunk::Cycle { number, limit } => {
            write_line(output, &format!("[cycle {number}/{limit}]")).await
        }
        ProgressChunk::Reasoning { text } if show_reasoning => {
            write_line(output, &format!("(thinking) {text}")).await
        }
        ProgressChunk::Reasoning { .. } | ProgressChunk::InvocationResult { .. } => Ok(()),
        ProgressChunk::AnswerToken { text } => {
            output.write_all(text.as_bytes()).await?;
            output.flush().await
        }
        ProgressChunk::InvocationStarted { name, arguments, .. } => {
            write_line(output, &format!("-> {name} {arguments}")).await
        }
        ProgressChunk::Observation { text, is_error, .. } => {
            let marker = if *is_error { "!!" } else { "<-" };
            write_line(output, &format!("{marker} {}", preview(text))).await
        }
        ProgressChunk::Final { forced, .. } => {
            write_line(output, "").await?;
            if *forced {
                write_line(output, "(answer forced after reaching the tool call limit)").await?;
            }
            Ok(())
        }
        ProgressChunk::Error { message } => {
            write_line(output, &format!("\nRequest failed: {message}")).await
        }
    }
}

async fn print_resources<W: AsyncWrite + Unpin>(
    output: &mut W,
    service: &ChatService,
    id: &str,
) -> io::Result<()> {
    let Some(client) = service.router().client(id).await else {
        return write_line(output, &format!("Unknown server '{id}'.")).await;
    };
    let listed = match client.list_resources().await {
        Ok(resources) => client
            .list_resource_templates()
            .await
            .map(|templates| (resources, templates)),
        Err(err) => Err(err),
    };
    let (resources, templates) = match listed {
        Ok(listed) => listed,
        Err(err) => return write_line(output, &format!("Listing failed: {err}")).await,
    };
    if resources.is_empty() && templates.is_empty() {
        return write_line(output, "No resources offered.").await;
    }
    for resource in resources {
        write_line(output, &format!("  - {} ({})", resource.uri, resource.name)).await?;
    }
    for template in templates {
        write_line(
            output,
            &format!("  - {} ({}, template)", template.uri_template, template.name),
        )
        .await?;
    }
    Ok(())
}

async fn print_prompts<W: AsyncWrite + Unpin>(
    output: &mut W,
    service: &ChatService,
    id: &str,
) -> io::Result<()> {
    let Some(client) = service.router().client(id).await else {
        return write_line(output, &format!("Unknown server '{id}'.")).await;
    };
    let prompts = match client.list_prompts().await {
        Ok(prompts) => prompts,
        Err(err) => return write_line(output, &format!("Listing failed: {err}")).await,
    };
    if prompts.is_empty() {
        return write_line(output, "No prompts offered.").await;
    }
    for prompt in prompts {
        let arguments: Vec<String> = prompt
            .arguments
            .iter()
            .map(|arg| {
                if arg.required {
                    arg.name.clone()
                } else {
                    format!("{}?", arg.name)
                }
            })
            .collect();
        let mut line = format!("  - {}({})", prompt.name, arguments.join(", "));
        if let Some(description) = &prompt.description {
            line.push_str(&format!(" - {description}"));
        }
        write_line(output, &line).await?;
    }
    Ok(())
}

async fn print_tool_steps<W: AsyncWrite + Unpin>(
    output: &mut W,
    steps: &[TranscriptStep],
) -> io::Result<()> {
    write_line(output, "\nTool steps:").await?;
    for (index, step) in steps.iter().enumerate() {
        let status = if step.is_error { "failed" } else { "ok" };
        write_line(output, &format!("  {}. {} [{}]", index + 1, step.name, status)).await?;
        let input = to_string_pretty(&step.arguments).unwrap_or_else(|_| step.arguments.to_string());
        for line in input.lines() {
            write_line(output, &format!("     in : {line}")).await?;
        }
        for line in step.output.lines() {
            write_line(output, &format!("     out: {line}")).await?;
        }
    }
    Ok(())
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 160;
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= LIMIT {
        single_line
    } else {
        let cut: String = single_line.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

async fn print_banner<W: AsyncWrite + Unpin>(output: &mut W) -> io::Result<()> {
    write_line(output, "toolrelay interactive mode").await
}

async fn print_help<W: AsyncWrite + Unpin>(output: &mut W) -> io::Result<()> {
    write_line(output, "Type a message to chat. Commands:").await?;
    write_line(output, "  /tools              list available operations").await?;
    write_line(output, "  /owners             show capability server status").await?;
    write_line(output, "  /reconnect <id>     retry a disconnected server").await?;
    write_line(output, "  /resources <id>     resources offered by a server").await?;
    write_line(output, "  /read <id> <uri>    print one resource").await?;
    write_line(output, "  /prompts <id>       prompts offered by a server").await?;
    write_line(output, "  /steps              tool calls from the last answer").await?;
    write_line(output, "  /reasoning on|off   show model reasoning").await?;
    write_line(output, "  /reset              start a new conversation").await?;
    write_line(output, "  /exit               quit").await
}

async fn prompt<W: AsyncWrite + Unpin>(output: &mut W) -> io::Result<()> {
    output.write_all(b"\n> ").await?;
    output.flush().await
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent::{AgentLoop, RunConfig};
    use crate::application::capability::testing::FakeServer;
    use crate::application::router::testing::{owner, router_over};
    use crate::infrastructure::model::{ModelBackend, ModelChunk, ModelError, ModelRequest, ModelStream};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Arc;

    struct Greeter;

    #[async_trait]
    impl ModelBackend for Greeter {
        async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
            let turns = request.messages.len();
            Ok(stream::iter(vec![Ok(ModelChunk::text(format!("hello ({turns} turns)")))]).boxed())
        }
    }

    async fn session(script: &str) -> String {
        let inventory = Arc::new(FakeServer::new("inventory").with_tool("check_stock"));
        let router = Arc::new(router_over(&[("inventory", inventory)]));
        router.add_owner(owner("inventory")).await;
        let service = ChatService::new(
            AgentLoop::new(Arc::new(Greeter), router),
            RunConfig::new("local", "test"),
        );

        let mut output = Vec::new();
        run_with(&service, script.as_bytes(), &mut output)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn prompts_stream_answers_and_keep_history() {
        let output = session("hi\nagain\n/exit\n").await;

        assert!(output.contains("hello (2 turns)"));
        assert!(output.contains("hello (4 turns)"));
        assert!(output.contains("Closing stdio mode."));
    }

    #[tokio::test]
    async fn commands_report_operations_and_owners() {
        let output = session("/tools\n/owners\n/bogus\n").await;

        assert!(output.contains("check_stock [inventory]"));
        assert!(output.contains("inventory (Connected) 1 operations"));
        assert!(output.contains("Unknown command 'bogus'"));
        assert!(output.contains("Input closed."));
    }

    #[tokio::test]
    async fn commands_browse_resources_and_prompts() {
        let output = session(
            "/resources inventory\n/read inventory memo://stock\n/prompts inventory\n/prompts nowhere\n/resources\n",
        )
        .await;

        assert!(output.contains("memo://stock (stock)"));
        assert!(output.contains("memo://items/{id} (item, template)"));
        assert!(output.contains("12 in stock"));
        assert!(output.contains("summarise(category) - Summarise stock"));
        assert!(output.contains("Unknown server 'nowhere'."));
        assert!(output.contains("Usage: /resources <server-id>"));
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let output = session("hi\n/reset\nhi\n").await;

        assert_eq!(output.matches("hello (2 turns)").count(), 2);
    }
}
