//! Session semantics: write-append invariant, read purity, request modes,
//! close behavior, structured output.

mod support;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde::Deserialize;

use jasmine::error::{AgentError, Result};
use jasmine::session::{ReadSession, WriteSession};
use jasmine::types::{ChatMessage, Prompt, Role, ToolCall, ToolChoice};

use support::{text_turn, tool_turn, ScriptedClient};

fn base_prompt() -> Prompt {
    Prompt::new("scripted-model").with_message(ChatMessage::system("You are helpful."))
}

#[tokio::test]
async fn write_session_appends_assistant_turn_after_every_request() -> Result<()> {
    let client = ScriptedClient::new(vec![
        Ok(text_turn("first")),
        Ok(tool_turn(vec![ToolCall::new("c1", "search", "{}")])),
    ]);
    let mut session = WriteSession::new(client.clone(), base_prompt(), Vec::new());

    session.append_prompt(vec![ChatMessage::user("hello")]);
    session.request_llm().await?;
    assert_eq!(session.prompt().messages().len(), 3);
    assert_eq!(session.prompt().messages()[2].content, "first");

    // Tool-call turns land in the prompt too, markers included.
    session.request_llm().await?;
    let last = &session.prompt().messages()[3];
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.tool_calls.len(), 1);
    assert_eq!(last.tool_calls[0].name, "search");
    Ok(())
}

#[tokio::test]
async fn read_session_never_mutates_the_prompt() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("answer"));
    let prompt = base_prompt().with_message(ChatMessage::user("question"));
    let session = ReadSession::new(client.clone(), prompt.clone(), Vec::new());

    for _ in 0..4 {
        session.request_llm().await?;
    }
    session.request_llm_multiple(3).await?;

    assert_eq!(session.prompt(), &prompt);
    assert_eq!(client.call_count(), 7);
    Ok(())
}

#[tokio::test]
async fn failed_request_leaves_write_session_unchanged() {
    let client = ScriptedClient::new(vec![Err("connection reset".to_string())]);
    let mut session = WriteSession::new(client, base_prompt(), Vec::new());
    session.append_prompt(vec![ChatMessage::user("hello")]);
    let before = session.prompt().clone();

    let err = session.request_llm().await.unwrap_err();
    assert!(matches!(err, AgentError::Client(_)));
    assert_eq!(session.prompt(), &before);
}

#[tokio::test]
async fn closed_write_session_rejects_requests() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("late"));
    let mut session = WriteSession::new(client.clone(), base_prompt(), Vec::new());

    session.close().await?;
    assert!(client.is_closed());
    let err = session.request_llm().await.unwrap_err();
    assert!(matches!(err, AgentError::SessionClosed));

    // Closing again is a no-op.
    session.close().await?;
    assert_eq!(client.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn request_modes_shape_the_outgoing_request() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("ok"));
    let tools = vec![jasmine::tools::ToolDescriptor::new(
        "search",
        "find things",
        serde_json::json!({"type": "object"}),
    )];
    let mut session = WriteSession::new(client.clone(), base_prompt(), tools);

    session.request_llm().await?;
    session.request_llm_without_tools().await?;
    session.request_llm_only_calling_tools().await?;
    session.request_llm_force_one_tool("search").await?;

    let requests = client.recorded_requests();
    assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[1].tool_choice, ToolChoice::None);
    assert!(requests[1].tools.is_empty());
    assert_eq!(requests[2].tool_choice, ToolChoice::Required);
    assert_eq!(
        requests[3].tool_choice,
        ToolChoice::Specific { name: "search".to_string() }
    );
    Ok(())
}

#[tokio::test]
async fn agent_log_messages_are_not_sent_to_the_model() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("ok"));
    let mut session = WriteSession::new(client.clone(), base_prompt(), Vec::new());
    session.append_prompt(vec![
        ChatMessage::user("hello"),
        ChatMessage::agent_log("ui: spinner shown"),
    ]);

    session.request_llm().await?;

    let request = &client.recorded_requests()[0];
    assert_eq!(request.messages.len(), 2);
    assert!(request.messages.iter().all(|m| m.role != Role::AgentLog));
    // The annotation stays in the session history.
    assert!(session
        .prompt()
        .messages()
        .iter()
        .any(|m| m.role == Role::AgentLog));
    Ok(())
}

#[tokio::test]
async fn fork_read_sees_writes_up_to_the_fork_only() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("ok"));
    let mut session = WriteSession::new(client.clone(), base_prompt(), Vec::new());
    session.append_prompt(vec![ChatMessage::user("hello")]);

    let read = session.fork_read();
    session.request_llm().await?;

    assert_eq!(read.prompt().messages().len(), 2);
    assert_eq!(session.prompt().messages().len(), 3);
    Ok(())
}

#[tokio::test]
async fn streaming_request_forwards_text_and_thinking_frames() -> Result<()> {
    let mut turn = text_turn("final text");
    turn.thinking = Some("thinking aloud".to_string());
    let client = ScriptedClient::repeating(turn);
    let mut session = WriteSession::new(client, base_prompt(), Vec::new());
    session.append_prompt(vec![ChatMessage::user("go")]);

    let text = Arc::new(Mutex::new(String::new()));
    let thinking = Arc::new(Mutex::new(String::new()));
    let text_sink = text.clone();
    let thinking_sink = thinking.clone();
    let result = session
        .request_llm_stream(
            move |chunk| text_sink.lock().expect("lock").push_str(chunk),
            move |chunk| thinking_sink.lock().expect("lock").push_str(chunk),
        )
        .await?;

    assert_eq!(result.content, "final text");
    assert_eq!(*text.lock().expect("lock"), "final text");
    assert_eq!(*thinking.lock().expect("lock"), "thinking aloud");
    // The streamed turn is appended like any other.
    assert_eq!(session.prompt().messages().last().map(|m| m.content.as_str()), Some("final text"));
    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
struct Verdict {
    answer: String,
    confidence: f64,
}

#[tokio::test]
async fn structured_request_parses_fenced_json() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn(
        "```json\n{\"answer\": \"yes\", \"confidence\": 0.9}\n```",
    ));
    let mut session = WriteSession::new(client, base_prompt(), Vec::new());
    session.append_prompt(vec![ChatMessage::user("is it?")]);

    let response = session
        .request_llm_structured::<Verdict>(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "answer": { "type": "string" },
                    "confidence": { "type": "number" }
                }
            }),
            vec![serde_json::json!({"answer": "no", "confidence": 0.5})],
        )
        .await?;

    assert_eq!(
        response.parsed,
        Ok(Verdict { answer: "yes".to_string(), confidence: 0.9 })
    );
    Ok(())
}

#[tokio::test]
async fn structured_parse_failure_is_a_value_not_an_error() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("I cannot answer in JSON, sorry."));
    let prompt = base_prompt().with_message(ChatMessage::user("is it?"));
    let session = ReadSession::new(client, prompt, Vec::new());

    let response = session
        .request_llm_structured::<Verdict>(serde_json::json!({"type": "object"}), Vec::new())
        .await?;

    assert!(response.parsed.is_err());
    assert_eq!(response.raw.content, "I cannot answer in JSON, sorry.");
    Ok(())
}

#[tokio::test]
async fn history_editing_primitives() {
    let client = ScriptedClient::repeating(text_turn("ok"));
    let mut session = WriteSession::new(client, base_prompt(), Vec::new());
    session.append_prompt(vec![
        ChatMessage::user("one"),
        ChatMessage::assistant("two"),
        ChatMessage::user("three"),
        ChatMessage::assistant("four"),
    ]);

    session.leave_last_n_messages(2, true);
    let contents: Vec<&str> = session
        .prompt()
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["You are helpful.", "three", "four"]);

    session.drop_last_n_messages(1);
    assert_eq!(session.prompt().messages().last().map(|m| m.content.as_str()), Some("three"));

    session.clear_history();
    assert!(session.prompt().messages().is_empty());
}

#[tokio::test]
async fn leave_messages_from_timestamp_keeps_system_and_recent_turns() {
    let client = ScriptedClient::repeating(text_turn("ok"));
    let mut system = ChatMessage::system("You are helpful.");
    system.timestamp = Some(chrono::Utc::now() - chrono::Duration::seconds(120));
    let prompt = Prompt::new("scripted-model").with_message(system);
    let mut session = WriteSession::new(client, prompt, Vec::new());
    let mut old = ChatMessage::user("old question");
    old.timestamp = Some(chrono::Utc::now() - chrono::Duration::seconds(60));
    session.append_prompt(vec![old]);
    let cutoff = chrono::Utc::now() - chrono::Duration::seconds(30);
    session.append_prompt(vec![ChatMessage::user("new question")]);

    session.leave_messages_from_timestamp(cutoff, true);

    let contents: Vec<&str> = session
        .prompt()
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    // The system message predates the cutoff but survives; the old turn does
    // not.
    assert_eq!(contents, vec!["You are helpful.", "new question"]);
}

#[tokio::test]
async fn closed_read_session_rejects_requests() -> Result<()> {
    let client = ScriptedClient::repeating(text_turn("late"));
    let prompt = base_prompt().with_message(ChatMessage::user("question"));
    let session = ReadSession::new(client.clone(), prompt, Vec::new());

    session.close().await?;
    assert!(client.is_closed());
    let err = session.request_llm().await.unwrap_err();
    assert!(matches!(err, AgentError::SessionClosed));

    // Closing again is a no-op.
    session.close().await?;
    assert_eq!(client.call_count(), 0);
    Ok(())
}
