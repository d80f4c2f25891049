//! Outgoing request shapes for the agent endpoint.
//!
//! The agent expects messages in its own schema, with a couple of
//! always-present envelope fields the local `Message` type does not carry.

use serde_json::{Value, json};

use crate::session::thread::{Message, Role};

pub(crate) fn to_agent_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut value = json!({
                "content": message.content,
                "type": message.role,
                "additional_kwargs": {},
                "response_metadata": {},
                "name": message.name,
                "id": message.id,
            });
            if message.role == Role::Tool {
                if let Some(tool_call_id) = &message.tool_call_id {
                    value["tool_call_id"] = json!(tool_call_id);
                    value["status"] = json!("success");
                }
            }
            value
        })
        .collect()
}

pub(crate) fn stream_request_body(thread_id: &str, messages: &[Message]) -> Value {
    json!({
        "input": { "messages": to_agent_messages(messages) },
        "configurable": { "thread_id": thread_id },
    })
}
