// Fixed prompt text of the support agent

use serde_json::{Value, json};

pub const SYSTEM_PROMPT: &str = "You are LAMA's customer support AI. Use the available tools to provide accurate information from the knowledge base.";

pub const TOOL_NAME: &str = "lama_knowledge_search";

/// Retrieval tool description. Carries the exchange-period precedence policy and must stay verbatim.
pub const TOOL_DESCRIPTION: &str = "You are LAMA's customer support AI. Use the search tool to find accurate answers in the provided knowledge base. You can now also authoritatively answer questions about:

Company Details (e.g., HR email, social media, head office location)
Website & Account Management (e.g., creating an account, color accuracy, out-of-stock items)
Payment & Security (e.g., payment methods, SSL security, guest checkout)
Order Issues (e.g., canceled paid orders, missing confirmation emails, items disappearing from cart)
Promotions & Support (e.g., discount codes, customer support timings)
Services (e.g., no repair service, no gift cards)
Policies (e.g., detailed Return & Exchange, Privacy Policy)

Crucial Policy Note: If you find conflicting exchange periods (7 days in FAQ vs. 15 days in Policy), default to 7 days and note the discrepancy. Never make up information.";

pub const NOT_INITIALIZED: &str = "Agent executor not initialized.";

pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

pub const NO_RESULTS: &str = "No relevant information found in the knowledge base.";

/// JSON schema of the retrieval tool arguments
#[inline]
pub fn query_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "query to look up in the knowledge base"
            }
        },
        "required": ["query"]
    })
}

#[inline]
pub fn apology(error: &str) -> String {
    format!("I apologize, but I encountered an error: {}", error)
}
