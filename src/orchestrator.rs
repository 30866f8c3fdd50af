//! Prompt construction and the single generation call per question.
//!
//! Two prompt strategies:
//!
//! - **grounded**: the assembled context is included verbatim and the model
//!   is told to answer only from it, saying so when it is insufficient.
//! - **no-context**: nothing relevant was retrieved; the model is told to
//!   let the user know the information is not available rather than guess.
//!
//! Generation is never retried here. Transport-level retries, if any, are
//! configured on the gateway adapter.

use crate::error::{Error, Result};
use crate::generation::GenerationGateway;
use crate::knowledge::Persona;
use crate::models::{Answer, AssembledContext};

/// Build the prompt for `query`, choosing the strategy from `context`.
pub fn build_prompt(persona: &Persona, query: &str, context: &AssembledContext) -> String {
    if context.no_context {
        format!(
            r#"You are the personal assistant of {name}, {title}. You answer visitors' questions about {name}.

<USER_QUESTION>
{query}
</USER_QUESTION>

No information about this question was found in {name}'s knowledge base.

INSTRUCTIONS:
- Politely tell the user that this information is not available right now.
- Do not guess or invent details about {name}.
- Keep the reply to one or two sentences."#,
            name = persona.name,
            title = persona.title,
            query = query.trim(),
        )
    } else {
        format!(
            r#"You are the personal assistant of {name}, {title}. You answer visitors' questions about {name}.

<USER_QUESTION>
{query}
</USER_QUESTION>

<CONTEXT>
{context}
</CONTEXT>

INSTRUCTIONS:
- Answer only from the CONTEXT above.
- If the context does not contain the answer, say that the information is not available.
- Keep responses short (2-5 sentences) and speak about {name} in the third person."#,
            name = persona.name,
            title = persona.title,
            query = query.trim(),
            context = context.text,
        )
    }
}

/// Generate the answer to `query` grounded on `context`.
pub async fn answer(
    gateway: &dyn GenerationGateway,
    persona: &Persona,
    query: &str,
    context: &AssembledContext,
) -> Result<Answer> {
    let prompt = build_prompt(persona, query, context);
    let text = gateway.generate(&prompt).await?;

    Ok(Answer {
        text,
        context_used: context.context_used().to_string(),
        refined_query: None,
        no_context: context.no_context,
    })
}

/// Rewrite a conversational question into a focused search query.
pub async fn refine_query(gateway: &dyn GenerationGateway, query: &str) -> Result<String> {
    let prompt = format!(
        r#"Rewrite the user question below into a precise search query for a personal knowledge base.
Reply with the search query only.

User question: "{}"
Search query:"#,
        query.trim()
    );
    let refined = gateway.generate(&prompt).await?;
    let refined = refined.trim().trim_matches('"').trim();
    if refined.is_empty() {
        return Err(Error::Generation(
            "query refinement returned an empty query".to_string(),
        ));
    }
    Ok(refined.to_string())
}
