use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use tracing::{info, warn};

use crate::providers::ApiError;
use crate::resources::assistants::{AssistantApi, PollPolicy, send_thread_turn};

/// Interactive thread with an assistant. Reads one message per line until
/// `exit`/`quit` or end of input. A run that ends in a failed state is
/// reported and the loop goes on; other errors end the session.
pub async fn run_assistant_repl<A, R, W>(
    api: &A,
    assistant_id: &str,
    policy: PollPolicy,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    A: AssistantApi + ?Sized,
    R: BufRead,
    W: Write,
{
    let thread = api
        .create_thread()
        .await
        .context("failed to create thread")?;
    info!(thread_id = %thread.id, assistant_id, "created thread");

    writeln!(out, "chatting with assistant {assistant_id}")?;
    writeln!(out, "type a message, or 'exit' to quit")?;

    loop {
        write!(out, "you: ")?;
        out.flush().context("failed to flush stdout")?;

        let mut line = String::new();
        let read = input.read_line(&mut line).context("failed to read stdin")?;
        if read == 0 {
            break;
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
            writeln!(out, "ending chat")?;
            break;
        }

        match send_thread_turn(api, &thread.id, assistant_id, text, policy).await {
            Ok(Some(reply)) => writeln!(out, "assistant: {}\n", reply.trim())?,
            Ok(None) => writeln!(out, "(no reply from assistant)\n")?,
            Err(err)
                if matches!(
                    err.downcast_ref::<ApiError>(),
                    Some(ApiError::RunFailed { .. })
                ) =>
            {
                warn!(error = %err, "assistant run failed");
                writeln!(out, "run ended without a reply: {err}\n")?;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::run_assistant_repl;
    use crate::resources::assistants::{PollPolicy, RunStatus};
    use crate::resources::testing::StubApi;

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            deadline: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn posts_each_line_until_exit() {
        let api = StubApi::default();
        api.queue_run_statuses(&[RunStatus::Completed]);
        let mut input = Cursor::new("first\n\nsecond\nexit\nignored\n");
        let mut out = Vec::new();

        run_assistant_repl(&api, "asst_1", policy(), &mut input, &mut out)
            .await
            .expect("repl should finish");

        assert_eq!(
            *api.thread_messages.borrow(),
            vec!["first".to_string(), "second".to_string()]
        );
        let printed = String::from_utf8(out).expect("utf8");
        assert_eq!(printed.matches("assistant: thread reply").count(), 2);
        assert!(printed.contains("ending chat"));
    }

    #[tokio::test]
    async fn stops_at_end_of_input() {
        let api = StubApi::default();
        let mut input = Cursor::new("only\n");
        let mut out = Vec::new();

        run_assistant_repl(&api, "asst_1", policy(), &mut input, &mut out)
            .await
            .expect("repl should finish");
        assert_eq!(api.thread_messages.borrow().len(), 1);
    }

    #[tokio::test]
    async fn failed_run_is_reported_and_the_loop_continues() {
        let api = StubApi::default();
        api.queue_run_statuses(&[RunStatus::Expired, RunStatus::Completed]);
        let mut input = Cursor::new("question\nagain\nexit\n");
        let mut out = Vec::new();

        run_assistant_repl(&api, "asst_1", policy(), &mut input, &mut out)
            .await
            .expect("failed run should not end the session");

        assert_eq!(
            *api.thread_messages.borrow(),
            vec!["question".to_string(), "again".to_string()]
        );
        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("run ended without a reply"), "got {printed}");
        assert!(printed.contains("expired"), "got {printed}");
        assert_eq!(printed.matches("assistant: thread reply").count(), 1);
    }

    #[tokio::test]
    async fn timed_out_run_still_ends_the_session() {
        let api = StubApi::default();
        api.queue_run_statuses(&[RunStatus::InProgress]);
        let mut input = Cursor::new("question\nagain\n");
        let mut out = Vec::new();
        let short = PollPolicy {
            interval: Duration::from_millis(1),
            deadline: Duration::from_millis(20),
        };

        let err = run_assistant_repl(&api, "asst_1", short, &mut input, &mut out)
            .await
            .expect_err("timed out run should fail");
        assert!(format!("{err:#}").contains("did not finish"), "got {err:#}");
        assert_eq!(api.thread_messages.borrow().len(), 1);
    }
}
