use super::state::ReactState;
use crate::llm::parse_json_response;
use crate::workers::Instruction;

/// System prompt for the reasoning step. Capability lines come from the
/// worker registry so the prompt always matches what is actually registered.
pub fn reasoning_system_prompt(capabilities: &str) -> String {
    format!(
        "You are an operations assistant that turns requests into single, \
         concrete actions.\n\n\
         Available workers and actions:\n{capabilities}\n\n\
         Respond with ONE JSON object, no markdown:\n\
         {{\n\
           \"thinking\": \"<brief reasoning>\",\n\
           \"instruction\": {{\n\
             \"worker\": \"<worker name>\",\n\
             \"action\": \"<action name>\",\n\
             \"args\": {{ ... }},\n\
             \"risk_level\": \"safe|medium|high\",\n\
             \"dry_run\": false\n\
           }},\n\
           \"is_final\": false\n\
         }}\n\n\
         Shell commands go through worker \"shell\", action \"execute_command\", \
         with the command string in args.command. Answer the user directly with \
         worker \"chat\", action \"respond\", message in args.message, and \
         is_final true.\n\
         If a previous command failed, choose a different approach; never \
         repeat the identical command."
    )
}

/// User prompt for a reasoning pass: the request, prior history, and an
/// explicit nudge away from repeating a failed command.
pub fn build_reason_prompt(state: &ReactState) -> String {
    let mut prompt = format!("Request: {}\n", state.user_input);

    if !state.history.is_empty() {
        prompt.push_str("\nActions so far:\n");
        prompt.push_str(&state.history.render_for_prompt());
    }

    if let Some(last) = state.history.last() {
        if !last.result.success {
            prompt.push_str(&format!(
                "\nThe last action failed: {}\nPick an alternative; do not retry the identical command.\n",
                last.result.message
            ));
        }
    }

    prompt
}

pub const SUMMARIZE_SYSTEM_PROMPT: &str = "You are an operations assistant. The action \
budget for this request is exhausted. Write a concise natural-language summary of what \
was attempted, what succeeded, what failed, and sensible next steps. Respond with plain \
text only.";

pub fn build_summarize_prompt(state: &ReactState) -> String {
    format!(
        "Request: {}\n\nActions taken:\n{}",
        state.user_input,
        state.history.render_for_prompt()
    )
}

/// Parse a reasoning response into (instruction, is_final). Accepts the
/// documented envelope shape and, leniently, a bare instruction object.
pub fn parse_reasoning(text: &str) -> Option<(Instruction, bool)> {
    let value = parse_json_response(text)?;

    if let Some(raw_instruction) = value.get("instruction") {
        let instruction: Instruction = serde_json::from_value(raw_instruction.clone()).ok()?;
        if instruction.worker.is_empty() || instruction.action.is_empty() {
            return None;
        }
        let is_final = value
            .get("is_final")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        return Some((instruction, is_final));
    }

    let instruction: Instruction = serde_json::from_value(value).ok()?;
    if instruction.worker.is_empty() || instruction.action.is_empty() {
        return None;
    }
    Some((instruction, false))
}

/// Turn a forced-summarization response into the message for the terminal
/// `chat.respond`. The LLM may answer in plain text or (despite the prompt)
/// in instruction JSON; either way only the message survives — the worker
/// and action are always coerced to chat.respond.
pub fn coerce_summary_message(text: &str) -> String {
    if let Some((instruction, _)) = parse_reasoning(text) {
        if let Some(message) = instruction
            .args
            .get("message")
            .and_then(crate::workers::ArgValue::as_str)
        {
            return message.to_string();
        }
    }
    if let Some(value) = parse_json_response(text) {
        if let Some(message) = value.get("message").and_then(serde_json::Value::as_str) {
            return message.to_string();
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::history::SessionHistory;
    use crate::workers::WorkerResult;
    use serde_json::json;

    fn state_with_failed_history() -> ReactState {
        let mut state = ReactState::new("check disk", "s-1", 10, SessionHistory::new());
        state.history.push(
            Instruction::new("shell", "execute_command").with_arg("command", "df -h /data"),
            WorkerResult::fail("df: /data: No such file or directory"),
        );
        state
    }

    #[test]
    fn parse_reasoning_accepts_envelope() {
        let raw = json!({
            "thinking": "list the pods",
            "instruction": {
                "worker": "shell",
                "action": "execute_command",
                "args": {"command": "kubectl get pods"}
            },
            "is_final": false
        })
        .to_string();

        let (instruction, is_final) = parse_reasoning(&raw).unwrap();
        assert_eq!(instruction.worker, "shell");
        assert!(!is_final);
    }

    #[test]
    fn parse_reasoning_accepts_bare_instruction() {
        let raw = json!({
            "worker": "chat",
            "action": "respond",
            "args": {"message": "done"}
        })
        .to_string();

        let (instruction, is_final) = parse_reasoning(&raw).unwrap();
        assert_eq!(instruction.worker, "chat");
        assert!(!is_final);
    }

    #[test]
    fn parse_reasoning_rejects_empty_worker() {
        let raw = json!({
            "instruction": {"worker": "", "action": "execute_command"}
        })
        .to_string();
        assert!(parse_reasoning(&raw).is_none());
    }

    #[test]
    fn parse_reasoning_rejects_prose() {
        assert!(parse_reasoning("I think we should list the pods").is_none());
    }

    #[test]
    fn parse_reasoning_reads_fenced_output() {
        let raw = "Sure!\n```json\n{\"instruction\": {\"worker\": \"shell\", \
                   \"action\": \"execute_command\", \"args\": {\"command\": \"ls\"}}, \
                   \"is_final\": true}\n```";
        let (instruction, is_final) = parse_reasoning(raw).unwrap();
        assert_eq!(instruction.command_arg(), Some("ls"));
        assert!(is_final);
    }

    #[test]
    fn reason_prompt_mentions_failure() {
        let state = state_with_failed_history();
        let prompt = build_reason_prompt(&state);
        assert!(prompt.contains("The last action failed"));
        assert!(prompt.contains("do not retry the identical command"));
    }

    #[test]
    fn reason_prompt_without_history_is_just_the_request() {
        let state = ReactState::new("check disk", "s-1", 10, SessionHistory::new());
        let prompt = build_reason_prompt(&state);
        assert!(prompt.contains("check disk"));
        assert!(!prompt.contains("Actions so far"));
    }

    #[test]
    fn system_prompt_embeds_capabilities() {
        let prompt = reasoning_system_prompt("shell: execute_command\nchat: respond");
        assert!(prompt.contains("shell: execute_command"));
        assert!(prompt.contains("is_final"));
    }

    #[test]
    fn coerce_summary_passes_plain_text_through() {
        assert_eq!(coerce_summary_message("  All done.\n"), "All done.");
    }

    #[test]
    fn coerce_summary_extracts_message_from_instruction_json() {
        let raw = json!({
            "instruction": {
                "worker": "shell",
                "action": "execute_command",
                "args": {"message": "summary text", "command": "ls"}
            }
        })
        .to_string();
        assert_eq!(coerce_summary_message(&raw), "summary text");
    }

    #[test]
    fn coerce_summary_extracts_top_level_message() {
        let raw = json!({"message": "wrapped summary"}).to_string();
        assert_eq!(coerce_summary_message(&raw), "wrapped summary");
    }
}
