//! Fixed prompt text for answer generation.

/// System instruction requiring bracketed `[filename, Page N]` citations.
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on the provided document context. \
You MUST cite your sources in your response. When you reference information from the context, include the source in square brackets like [Document.pdf, Page X].
Use the exact filename and page number provided in the context.
If the context doesn't contain enough information to answer the question fully, say so clearly.
Your response should be well-structured and informative, with proper source citations throughout.";

/// Response returned when retrieval finds nothing to answer from.
pub const NO_RESULTS_RESPONSE: &str = "I couldn't find any relevant information in your uploaded documents to answer this question. \
Please make sure you have uploaded documents that contain information related to your query.";

/// The user turn: assembled document context followed by the literal question.
pub fn user_prompt(context: &str, query: &str) -> String {
    format!(
        "Context from documents:\n{context}\n\nUser question: {query}\n\n\
         Please provide a helpful answer based on the context above. \
         IMPORTANT: You must cite your sources using the format [filename, Page X] \
         whenever you reference information from the documents."
    )
}

/// The text embedded for similarity search on a follow-up question.
pub fn search_input(conversation_context: &str, query: &str) -> String {
    if conversation_context.is_empty() {
        return query.to_string();
    }
    format!("{conversation_context}\n\nCurrent Question: {query}")
}
