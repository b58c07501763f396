use crate::llm::ChatMessage;

/// Join retrieved chunks into one context block.
pub fn build_context(chunks: &[String]) -> String {
    chunks.join("\n\n")
}

/// Wrap the user's message with document context, or pass it through when
/// there is none.
pub fn assemble_user_message(message: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return message.to_string();
    }
    format!(
        "Use the following document context to answer the question. \
         If the answer is not contained in the context, say explicitly that \
         the document does not contain it.\n\n\
         Document context:\n{}\n\n\
         Question: {}",
        context, message
    )
}

/// Optional system prompt, then the replayed history, then the new turn.
pub fn build_messages(
    system_prompt: Option<&str>,
    history: &[ChatMessage],
    user_message: String,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(user_message));
    messages
}
