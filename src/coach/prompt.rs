//! Prompt templates for the coach

use crate::coach::index::SearchResult;
use crate::coach::ChatTurn;
use crate::predict::drivers::format_drivers;
use crate::predict::RiskScore;

/// Conversational template; `{chat_history}`, `{context}` and `{question}` are filled in
pub const COACH_TEMPLATE: &str = r#"**My identity (persona):**
You are "NexusByte", an AI health coach. Your tone is friendly, professional and empathetic.

**My knowledge base (context):**
My knowledge is limited *strictly* to the information given in the "Context" below.
{context}

**My operating rules (very important):**
1. Read the "Chat history". Use it to understand follow-up questions (e.g. "how do I do that", "why").
2. If the human only greets you, greet them back in a friendly way.
3. If the human asks about something covered by the context, answer using that context.
4. If the human asks about "their results" or "their risk", tell them to use the app's ML risk calculator.
5. If the answer is NOT in the context OR in the history, kindly say that you do not have that information.
Never give a diagnosis.

---
**Chat history (for context):**
{chat_history}
---

**Information from my knowledge base (context):**
{context}

**New question from the human:**
{question}

NexusByte (answer):"#;

/// Two-week plan template; `{risk_drivers}` and `{rag_context}` are filled in
pub const PLAN_TEMPLATE: &str = r#"You are a preventive wellness coach. Your task is to write a personalized two-week action plan for a user, focusing on lifestyle recommendations that mitigate the risk factors identified below.

CRITICAL INSTRUCTIONS:
1. ONLY use the sources in "KNOWLEDGE BASE" to build the plan.
2. Every recommendation MUST cite the knowledge base in square brackets followed by the source number (e.g. [Eat five portions of fruit and vegetables a day, source 1]).
3. Write a SMART action plan (specific, measurable, achievable, relevant, time-bound).
4. The plan covers two weeks and addresses the risk areas (diet, exercise, sleep, and so on).
5. Include a visible DISCLAIMER at the end.

RISK FACTORS IDENTIFIED (by the ML model):
{risk_drivers}

KNOWLEDGE BASE (RAG context):
{rag_context}

DISCLAIMER: {disclaimer}

PERSONALIZED ACTION PLAN (2 WEEKS):"#;

/// Replace `{name}` placeholders in one pass; unknown names are kept
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let value = after.find('}').and_then(|end| {
            values
                .iter()
                .find(|(name, _)| *name == &after[..end])
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Conversation as `role: content` lines
pub fn format_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieved chunks separated by blank lines
pub fn format_context(results: &[SearchResult<'_>]) -> String {
    results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Retrieved chunks numbered for citation
pub fn format_sources(results: &[SearchResult<'_>]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] ({}) {}", i + 1, r.chunk.source, r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the conversational template
pub fn coach_prompt(history: &[ChatTurn], context: &str, question: &str) -> String {
    let history = format_history(history);
    render(
        COACH_TEMPLATE,
        &[
            ("chat_history", history.as_str()),
            ("context", context),
            ("question", question),
        ],
    )
}

/// Fill the plan template
pub fn plan_prompt(score: &RiskScore, sources: &str) -> String {
    let drivers = format_drivers(&score.drivers);
    render(
        PLAN_TEMPLATE,
        &[
            ("risk_drivers", drivers.as_str()),
            ("rag_context", sources),
            ("disclaimer", crate::coach::DISCLAIMER),
        ],
    )
}

/// Question asked on behalf of a freshly scored user
pub fn risk_question(score: &RiskScore) -> String {
    let mut question = format!(
        "My hypertension risk is {} (score: {:.2}). What health advice (nutrition, exercise, stress) can you give me based on your knowledge?",
        score.risk_level(),
        score.risk_score
    );
    if !score.drivers.is_empty() {
        question.push_str("\nMy identified risk factors:\n");
        question.push_str(&format_drivers(&score.drivers));
    }
    question
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::Driver;

    #[test]
    fn test_history_lines() {
        let history = vec![ChatTurn::user("What is DASH?"), ChatTurn::assistant("An eating plan.")];
        assert_eq!(
            format_history(&history),
            "user: What is DASH?\nassistant: An eating plan."
        );
        assert_eq!(format_history(&[]), "");
    }

    #[test]
    fn test_coach_prompt_fills_every_placeholder() {
        let prompt = coach_prompt(&[ChatTurn::user("hi")], "Salt raises pressure.", "Why?");
        assert!(prompt.contains("user: hi"));
        assert_eq!(prompt.matches("Salt raises pressure.").count(), 2);
        assert!(prompt.contains("Why?"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
        assert!(!prompt.contains("{chat_history}"));
    }

    #[test]
    fn test_values_are_not_rescanned() {
        // retrieved text that looks like a placeholder stays literal
        let prompt = coach_prompt(&[], "see {question}", "Why?");
        assert!(prompt.contains("see {question}"));
        assert_eq!(render("{a} {b} {", &[("a", "{b}")]), "{b} {b} {");
    }

    #[test]
    fn test_risk_question() {
        let low = RiskScore::new(0.234, vec![]);
        assert!(risk_question(&low).starts_with("My hypertension risk is low (score: 0.23)."));

        let high = RiskScore::new(
            0.81,
            vec![Driver {
                feature: "feat_is_smoker".into(),
                description: "Current smoker".into(),
            }],
        );
        let question = risk_question(&high);
        assert!(question.contains("high (score: 0.81)"));
        assert!(question.ends_with("- Current smoker"));
    }

    #[test]
    fn test_plan_prompt_lists_drivers() {
        let score = RiskScore::new(0.7, vec![]);
        let prompt = plan_prompt(&score, "[1] (builtin) Walk daily.");
        assert!(prompt.contains("- No lifestyle risk factor flagged"));
        assert!(prompt.contains("[1] (builtin) Walk daily."));
        assert!(prompt.contains(crate::coach::DISCLAIMER));
    }
}
