use crate::application::capability::Operation;

/// Appended as a user turn once the cycle cap is reached.
pub const FORCE_FINAL_INSTRUCTION: &str = "You have reached the maximum number of tool calls for this request. \
Do not request any more tools. Answer the user now using only the information already gathered.";

/// System prompt for a run: tool catalogue, per-owner guidance, then any
/// operator-supplied prompt.
pub fn compose_system_instructions(
    operations: &[Operation],
    guidance: &[(String, String)],
    configured: Option<&str>,
) -> String {
    let mut lines = vec![
        "You are an assistant that can call tools to solve user requests.".to_string(),
        "Detect the user's language automatically and answer in that same language unless they ask for another."
            .to_string(),
    ];

    if operations.is_empty() {
        lines.push("No tools are currently available; answer directly.".to_string());
    } else {
        lines.push(
            "Call a tool whenever it helps; when you have enough information, reply with the final answer and no tool calls."
                .to_string(),
        );
        for (owner, instruction) in guidance {
            lines.push(format!("Server '{owner}' guidance: {instruction}"));
        }
        lines.push("Available tools:".to_string());
        for operation in operations {
            let mut line = format!("- {} (server: {})", operation.name, operation.owner_id);
            if !operation.description.is_empty() {
                line.push_str(&format!(": {}", operation.description));
            }
            lines.push(line);
        }
    }

    if let Some(extra) = configured.map(str::trim).filter(|text| !text.is_empty()) {
        lines.push(extra.to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_tools_with_owner_guidance() {
        let operations = vec![Operation::new(
            "inventory",
            "check_stock",
            "Stock level for a SKU",
            json!({ "type": "object" }),
        )];
        let guidance = vec![("inventory".to_string(), "Prefer SKUs.".to_string())];

        let prompt = compose_system_instructions(&operations, &guidance, Some("Be brief."));

        assert!(prompt.contains("Server 'inventory' guidance: Prefer SKUs."));
        assert!(prompt.contains("- check_stock (server: inventory): Stock level for a SKU"));
        assert!(prompt.ends_with("Be brief."));
    }

    #[test]
    fn empty_catalogue_says_so() {
        let prompt = compose_system_instructions(&[], &[], None);
        assert!(prompt.contains("No tools are currently available"));
        assert!(!prompt.contains("Available tools"));
    }
}
