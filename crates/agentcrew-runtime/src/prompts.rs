//! Prompt templates for the model-driven strategies.

use agentcrew_chat::ChatMessage;

use crate::types::AgentDefinition;

pub const SELECTION_TEMPLATE: &str = "\
Examine the provided RESPONSE and choose the next participant.
State only the name of the chosen participant without explanation.
Never choose the participant named in the RESPONSE's author unless it is the only participant.

Choose only from these participants:
{{$agents}}

Always follow these rules when choosing the next participant:
- If the task is about leave, choose LeaveReviewer when it is available.
- If the task is about a signed document or a signature, choose SignatureReviewer when it is available.
- Otherwise choose the participant best suited to the RESPONSE.

RESPONSE:
{{$history}}";

pub const TERMINATION_TEMPLATE: &str = "\
Determine whether the employee's request has been fully handled by the most recent RESPONSE.
If so, respond with a single word without explanation: true
Otherwise respond with: false

RESPONSE:
{{$history}}";

/// Render messages as `author: content` lines.
pub fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = m
                .author_name
                .clone()
                .unwrap_or_else(|| m.role.to_string());
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the roster as a bullet list.
pub fn render_agents(agents: &[AgentDefinition]) -> String {
    agents
        .iter()
        .map(|a| {
            if a.description.is_empty() {
                format!("- {}", a.name)
            } else {
                format!("- {}: {}", a.name, a.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute `{{$agents}}` and `{{$history}}` in a template.
pub fn render(template: &str, agents: &[AgentDefinition], history: &[ChatMessage]) -> String {
    template
        .replace("{{$agents}}", &render_agents(agents))
        .replace("{{$history}}", &render_history(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_history() {
        let history = vec![
            ChatMessage::user("I need Friday off"),
            ChatMessage::assistant("Annual leave").with_author("LeaveReviewer"),
        ];
        assert_eq!(
            render_history(&history),
            "user: I need Friday off\nLeaveReviewer: Annual leave"
        );
    }

    #[test]
    fn test_render_template() {
        let agents = vec![
            AgentDefinition::new("A", "x").with_description("first"),
            AgentDefinition::new("B", "y"),
        ];
        let rendered = render(
            "{{$agents}}|{{$history}}",
            &agents,
            &[ChatMessage::user("hi")],
        );
        assert_eq!(rendered, "- A: first\n- B|user: hi");
    }
}
