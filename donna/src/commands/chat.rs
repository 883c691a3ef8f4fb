use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use super::{Command, CommandContext};
use crate::chat::ChatSession;
use crate::error_recovery::ErrorRecovery;
use crate::formatters::format_transcript;

/// Interactive streaming chat on stdin/stdout
pub struct ChatCommand;

#[async_trait]
impl Command for ChatCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let chat = &context.config.chat;
        let client = context.completion_client()?;
        let mut session = ChatSession::new(client, chat.model.clone());

        let input = BufReader::new(tokio::io::stdin());
        let mut output = std::io::stdout();
        run_repl(&mut session, &chat.title, &chat.input_prompt, input, &mut output).await?;

        let transcript = session.close();
        info!("Chat ended after {} turns", transcript.turns());
        Ok(())
    }
}

/// Read prompts line by line until `/exit` or end of input.
///
/// Streamed chunks are written to `output` as they arrive. A failed turn is
/// reported and the loop continues, so the prompt can simply be re-sent.
pub async fn run_repl<R, W>(
    session: &mut ChatSession,
    title: &str,
    prompt: &str,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    writeln!(output, "💬 {}", title)?;
    writeln!(output, "Type /history to replay the conversation, /exit to leave.")?;

    let mut lines = input.lines();
    loop {
        write!(output, "{} > ", prompt)?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            break;
        };

        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/history" => {
                writeln!(output, "{}", format_transcript(session.transcript()))?;
                continue;
            }
            _ => {}
        }

        let result = session
            .send(line, |chunk| {
                // A closed stdout only loses display, the transcript still records the reply
                let _ = write!(output, "{}", chunk);
                let _ = output.flush();
            })
            .await;
        writeln!(output)?;

        if let Err(e) = result {
            writeln!(output, "❌ {}", e)?;
            if let Some(hint) = ErrorRecovery::auth_hint(&e, "openai") {
                writeln!(output, "💡 {}", hint)?;
            }
        }
    }

    Ok(())
}
