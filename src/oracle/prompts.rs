//! Fixed instruction templates wrapped around the dynamic parts of each oracle call.

use crate::{graph::Edge, model::ChatMessage};

/// Appended to every agent persona: asks for the interactive reply shape.
pub const INTERACTIVE_INSTRUCTION: &str = r#"
Response Format (JSON):
{
  "concise_text": "A brief, punchy version of the response",
  "buttons": [
    { "label": "Button Label", "next_message": "What the user would say if they clicked this" }
  ]
}
Maintain your persona but be extremely concise in 'concise_text'.
"#;

/// The user turn that opens a node conversation.
pub const INITIATE_CONVERSATION_PROMPT: &str = "Please start the conversation and greet the user based on your persona.";

/// Leading user turn inserted when the history starts with a model message.
pub const CONTEXT_ESTABLISHED_PROMPT: &str = "System context established. Please introduce yourself and begin the conversation based on your persona.";

pub const SUMMARY_PROMPT_BASE: &str = r#"
    Analyze the following conversation between an AI Agent and a Visitor.
    Generate a concise, professional, and useful summary of the interaction.
    Focus on:
    1. The visitor's primary intent or needs.
    2. Key information provided by the visitor (including form data if present).
    3. The overall outcome or next steps discussed.

    Keep the summary structured with bullet points and under 200 words.
"#;

const JSON_GUARD: &str = "CRITICAL: Ensure the response is a valid JSON object. Escape all double quotes and newlines within the summary string.";

/// Shown in place of a summary when the oracle fails to produce one.
pub const SUMMARY_FALLBACK: &str = "### Conversation Recap\n\n*   **Intent**: The visitor engaged with the agent to explore available options.\n*   **Key Points**: Several topics were discussed throughout the session.\n*   **Outcome**: The conversation provided initial context for the visitor's needs.\n\n*(Note: Automated summary generation encountered a temporary issue. Full chat remains available for review.)*";

/// Persona text plus the interactive response contract.
pub fn agent_instruction(system_prompt: &str) -> String {
    format!("{}\n{}", system_prompt, INTERACTIVE_INSTRUCTION)
}

pub fn evaluate_prompt(
    current_node_key: &str,
    edges: &[Edge],
    recent: &[ChatMessage],
) -> String {
    let transitions = edges.iter().map(|e| format!("- To {}: {}", e.to, e.condition)).collect::<Vec<_>>().join("\n");
    let history = recent.iter().map(|m| format!("{}: {}", m.role.as_ref(), m.text())).collect::<Vec<_>>().join("\n");

    format!(
        r#"
    Analyze the following conversation and decide if the current task/node is completed.
    If completed, decide which node to transition to based on the available next steps.

    Current Node: {current_node_key}
    Available Transitions:
    {transitions}

    Recent Conversation History:
    {history}

    Respond with a JSON object:
    {{
      "completed": boolean,
      "nextNodeKey": string | null (the node key if completed, else null),
      "reason": string
    }}
"#
    )
}

/// Summary request over a history that is already free of system turns.
pub fn summary_prompt(
    custom_instruction: Option<&str>,
    history: &[&ChatMessage],
) -> String {
    let instructions = match custom_instruction {
        Some(custom) => format!("{}\n\n{}", custom, JSON_GUARD),
        None => format!("{}\n{}", SUMMARY_PROMPT_BASE, JSON_GUARD),
    };
    let history = history.iter().map(|m| format!("{}: {}", m.role.as_ref().to_uppercase(), m.text())).collect::<Vec<_>>().join("\n");

    format!(
        r#"
    {instructions}

    Conversation History:
    {history}

    Respond with a JSON object:
    {{
      "summary": "string"
    }}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatMessage, Interactive};

    #[test]
    fn test_evaluate_prompt_lists_edges_and_history() {
        let edges = vec![Edge {
            key: "e1".into(),
            from: "a".into(),
            to: "f".into(),
            condition: "user confirms".into(),
        }];
        let recent = vec![ChatMessage::user("yes")];
        let prompt = evaluate_prompt("a", &edges, &recent);

        assert!(prompt.contains("Current Node: a"));
        assert!(prompt.contains("- To f: user confirms"));
        assert!(prompt.contains("user: yes"));
    }

    #[test]
    fn test_summary_prompt_uses_custom_instruction() {
        let reply = ChatMessage::model(Interactive {
            concise_text: "Hello".into(),
            buttons: vec![],
        });
        let prompt = summary_prompt(Some("List the budget only."), &[&reply]);
        assert!(prompt.contains("List the budget only."));
        assert!(prompt.contains("MODEL: Hello"));
        assert!(!prompt.contains("primary intent"));

        let prompt = summary_prompt(None, &[]);
        assert!(prompt.contains("primary intent"));
        assert!(prompt.contains("CRITICAL"));
    }
}
