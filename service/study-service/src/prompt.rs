use chunk_model::ChunkRecord;

use crate::modes::AnswerLength;

pub const SHORT_GUIDANCE: &str = "Give a short, direct answer in two or three sentences.";
pub const DETAILED_GUIDANCE: &str =
    "Explain in detail: include the definition, purpose and importance, in simple academic language.";

/// Texts of the first `max_chunks` chunks, separated by a blank line.
pub fn join_context<'a, I>(chunks: I, max_chunks: usize) -> String
where
    I: IntoIterator<Item = &'a ChunkRecord>,
{
    chunks
        .into_iter()
        .take(max_chunks)
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Grounding prompt: the model may only use `context` to answer `question`.
pub fn build_prompt(question: &str, context: &str, length: AnswerLength) -> String {
    let guidance = match length {
        AnswerLength::Short => SHORT_GUIDANCE,
        AnswerLength::Detailed => DETAILED_GUIDANCE,
    };
    format!(
        "You are a study assistant.\n\
         Answer using ONLY the notes below. Do not add information that is not in the notes.\n\
         {guidance}\n\
         \n\
         NOTES:\n\
         {context}\n\
         \n\
         QUESTION:\n\
         {question}\n\
         \n\
         ANSWER:",
        question = question.trim(),
    )
}
