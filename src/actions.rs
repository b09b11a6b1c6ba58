//! Action grammar - decodes a raw model response into typed operations
//!
//! Each tag kind is scanned independently over the whole response and the
//! resulting list is grouped by kind in fixed declaration order (SPAWN,
//! BROADCAST, MESSAGE, WAIT, REPORT, TERMINATE, TOOL), not by textual
//! position across kinds. Malformed tags match nothing and are dropped
//! silently.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::protocol::AgentId;

/// One operation extracted from a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create a child agent with the given mission.
    Spawn(String),
    /// Send to every other registered agent.
    Broadcast(String),
    /// Send to one agent by id.
    Message { to: AgentId, content: String },
    /// Block until at least one message is queued. The numeric argument
    /// is accepted for grammar compatibility but does not bound the wait.
    Wait(u64),
    /// Human-visible output; never routed through the bus.
    Report(String),
    /// Irreversibly end this agent.
    Terminate(String),
    /// Invoke a named collaborator tool with a raw string argument.
    Tool { name: String, args: String },
}

static SPAWN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[SPAWN:\s*([^\[\]]+?)\]").unwrap());
static BROADCAST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[BROADCAST:\s*([^\[\]]+?)\]").unwrap());
static MESSAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[MESSAGE\s+(\w+):\s*([^\[\]]+?)\]").unwrap());
static WAIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[WAIT:\s*(\d+)\]").unwrap());
static REPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:REPORT|PRINT):\s*([^\[\]]+?)\]").unwrap());
static TERMINATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[TERMINATE:\s*([^\[\]]+?)\]").unwrap());
static TOOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[TOOL:\s*(\w+)\((.*?)\)\]").unwrap());

/// Extract every recognized action from a raw response.
///
/// Occurrences of the same kind keep their left-to-right order; kinds are
/// concatenated in declaration order regardless of where they appear in
/// the text.
pub fn parse_actions(response: &str) -> Vec<Action> {
    let mut actions = Vec::new();

    for cap in SPAWN_RE.captures_iter(response) {
        actions.push(Action::Spawn(cap[1].trim().to_string()));
    }

    for cap in BROADCAST_RE.captures_iter(response) {
        actions.push(Action::Broadcast(cap[1].trim().to_string()));
    }

    for cap in MESSAGE_RE.captures_iter(response) {
        actions.push(Action::Message {
            to: AgentId::named(&cap[1]),
            content: cap[2].trim().to_string(),
        });
    }

    for cap in WAIT_RE.captures_iter(response) {
        // The pattern only admits digits; absurdly long runs overflow and
        // are treated as malformed.
        if let Ok(n) = cap[1].parse::<u64>() {
            actions.push(Action::Wait(n));
        }
    }

    for cap in REPORT_RE.captures_iter(response) {
        actions.push(Action::Report(cap[1].trim().to_string()));
    }

    for cap in TERMINATE_RE.captures_iter(response) {
        actions.push(Action::Terminate(cap[1].trim().to_string()));
    }

    for cap in TOOL_RE.captures_iter(response) {
        actions.push(Action::Tool {
            name: cap[1].to_string(),
            args: cap[2].trim().to_string(),
        });
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_kinds() {
        let response = "\
            [SPAWN: research quantum computing]\
            [BROADCAST: found something]\
            [MESSAGE abc123: can you verify?]\
            [WAIT: 2]\
            [REPORT: the answer is 42]\
            [TERMINATE: task complete]\
            [TOOL: calculate(2 + 2)]";

        let actions = parse_actions(response);
        assert_eq!(actions.len(), 7);
        assert_eq!(actions[0], Action::Spawn("research quantum computing".into()));
        assert_eq!(actions[1], Action::Broadcast("found something".into()));
        assert_eq!(
            actions[2],
            Action::Message { to: AgentId::named("abc123"), content: "can you verify?".into() }
        );
        assert_eq!(actions[3], Action::Wait(2));
        assert_eq!(actions[4], Action::Report("the answer is 42".into()));
        assert_eq!(actions[5], Action::Terminate("task complete".into()));
        assert_eq!(
            actions[6],
            Action::Tool { name: "calculate".into(), args: "2 + 2".into() }
        );
    }

    #[test]
    fn test_grouped_by_kind_ordering() {
        // MESSAGE appears first in the text; SPAWN still parses first.
        let response = "[MESSAGE bob: starting now] then [SPAWN: explore the data]";
        let actions = parse_actions(response);

        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Spawn(_)));
        assert!(matches!(actions[1], Action::Message { .. }));
    }

    #[test]
    fn test_same_kind_keeps_textual_order() {
        let response = "[BROADCAST: first] ... [BROADCAST: second]";
        let actions = parse_actions(response);

        assert_eq!(actions[0], Action::Broadcast("first".into()));
        assert_eq!(actions[1], Action::Broadcast("second".into()));
    }

    #[test]
    fn test_print_is_report_alias() {
        let actions = parse_actions("[PRINT: visible to the human]");
        assert_eq!(actions, vec![Action::Report("visible to the human".into())]);
    }

    #[test]
    fn test_malformed_tags_ignored() {
        // Unclosed bracket, non-integer wait, malformed target id.
        let response = "[SPAWN: never closed [WAIT: soon] [MESSAGE a-b: hi]";
        assert!(parse_actions(response).is_empty());
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(parse_actions("I will think about this first.").is_empty());
    }

    #[test]
    fn test_tool_empty_args() {
        let actions = parse_actions("[TOOL: get_time()]");
        assert_eq!(
            actions,
            vec![Action::Tool { name: "get_time".into(), args: String::new() }]
        );
    }

    #[test]
    fn test_wait_overflow_is_malformed() {
        assert!(parse_actions("[WAIT: 99999999999999999999999999]").is_empty());
    }
}
