//! Conversation assembly for report questions and summaries.
//!
//! Report text is cut to a fixed character prefix before it is placed in any
//! message. The cut counts Unicode scalar values and ignores word boundaries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::completion::Message;
use crate::session::Turn;

/// Characters of report text forwarded to the provider.
pub const REPORT_EXCERPT_CHARS: usize = 4000;

/// Response language, selecting one of the fixed template sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    #[serde(alias = "en")]
    English,
    #[serde(alias = "hi")]
    Hindi,
}

impl Locale {
    pub fn templates(self) -> &'static PromptTemplates {
        match self {
            Locale::English => &ENGLISH,
            Locale::Hindi => &HINDI,
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Locale::English),
            "hindi" | "hi" => Ok(Locale::Hindi),
            other => Err(format!("unknown language '{other}' (expected english or hindi)")),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::English => f.write_str("english"),
            Locale::Hindi => f.write_str("hindi"),
        }
    }
}

/// Fixed strings for one response language.
#[derive(Debug)]
pub struct PromptTemplates {
    pub persona: &'static str,
    pub report_preamble: &'static str,
    pub question_suffix: &'static str,
    pub summary_instruction: &'static str,
    pub no_answer: &'static str,
    pub no_summary: &'static str,
}

static ENGLISH: PromptTemplates = PromptTemplates {
    persona: "You are MediTrack, a medical report assistant that helps patients understand their own reports.\n\
        Use only information that appears in the report. Quote test values, units and reference ranges exactly as written.\n\
        Never diagnose, stage a disease or calculate values the report does not list.\n\
        Keep a calm, professional and empathetic tone and explain medical terms in plain language.\n\
        End every answer with: \"Please consult your healthcare provider to interpret these results in the context of your full medical history.\"\n\
        Always answer only in English.",
    report_preamble: "The following is a medical report:\n\n",
    question_suffix: " (Answer only in English)",
    summary_instruction: "Below is an English medical report. Please provide a concise summary in English:\n\n",
    no_answer: "The language model did not return an answer.",
    no_summary: "The language model did not return a summary.",
};

static HINDI: PromptTemplates = PromptTemplates {
    persona: "You are MediTrack, a helpful medical assistant who always answers only in Hindi.\n\
        The user will ask questions in Hindi about an English medical report.\n\
        Use only information that appears in the report and quote test values exactly as written.\n\
        Never diagnose or calculate values the report does not list.",
    report_preamble: "नीचे एक अंग्रेज़ी मेडिकल रिपोर्ट है:\n\n",
    question_suffix: " (उत्तर केवल हिंदी में दें, अंग्रेज़ी का एक भी शब्द न हो)",
    summary_instruction: "नीचे एक अंग्रेज़ी मेडिकल रिपोर्ट है। कृपया इसका संक्षिप्त सारांश केवल हिंदी में दें (अंग्रेज़ी का एक भी शब्द न हो):\n\n",
    no_answer: "भाषा मॉडल ने कोई उत्तर नहीं लौटाया।",
    no_summary: "भाषा मॉडल ने कोई सारांश नहीं लौटाया।",
};

/// First `max_chars` characters of `text`, possibly cutting mid-word.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn excerpt(report_text: &str) -> &str {
    truncate_chars(report_text, REPORT_EXCERPT_CHARS)
}

/// Stateless question: persona, report excerpt, then the question.
pub fn compose_question(report_text: &str, question: &str, locale: Locale) -> Vec<Message> {
    let t = locale.templates();
    vec![
        Message::system(t.persona),
        Message::user(format!("{}{}", t.report_preamble, excerpt(report_text))),
        Message::user(format!("{}{}", question.trim(), t.question_suffix)),
    ]
}

/// Summary request: persona, then the summary instruction with the excerpt.
pub fn compose_summary(report_text: &str, locale: Locale) -> Vec<Message> {
    let t = locale.templates();
    vec![
        Message::system(t.persona),
        Message::user(format!("{}{}", t.summary_instruction, excerpt(report_text))),
    ]
}

/// Session question: the excerpt rides in the system message, followed by
/// every retained turn and the new question.
pub fn compose_session(
    report_text: &str,
    history: &[Turn],
    question: &str,
    locale: Locale,
) -> Vec<Message> {
    let t = locale.templates();
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(Message::system(format!(
        "{}\n\n{}{}",
        t.persona,
        t.report_preamble,
        excerpt(report_text)
    )));
    for turn in history {
        messages.push(Message::user(turn.question.clone()));
        messages.push(Message::assistant(turn.answer.clone()));
    }
    messages.push(Message::user(format!("{}{}", question.trim(), t.question_suffix)));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;

    #[test]
    fn test_truncate_is_character_based() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 4), "");
        // multi-byte characters count once each
        assert_eq!(truncate_chars("रिपोर्ट", 2), "रि");
        assert_eq!(truncate_chars("Olá, você", 4), "Olá,");
    }

    #[test]
    fn test_question_conversation_shape() {
        let messages = compose_question(
            "Patient has mild hypertension.",
            "What is the diagnosis?",
            Locale::English,
        );
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::User]);
        assert!(messages[1].content.ends_with("Patient has mild hypertension."));
        assert_eq!(
            messages[2].content,
            "What is the diagnosis? (Answer only in English)"
        );
    }

    #[test]
    fn test_content_past_budget_never_sent() {
        let report = format!("{}TAIL-MARKER", "a".repeat(REPORT_EXCERPT_CHARS));
        let turns = vec![Turn {
            question: "q".into(),
            answer: "a".into(),
        }];

        for messages in [
            compose_question(&report, "q?", Locale::English),
            compose_summary(&report, Locale::Hindi),
            compose_session(&report, &turns, "q?", Locale::English),
        ] {
            assert!(messages.iter().all(|m| !m.content.contains("TAIL-MARKER")));
            assert!(messages
                .iter()
                .any(|m| m.content.contains(&"a".repeat(REPORT_EXCERPT_CHARS))));
        }
    }

    #[test]
    fn test_hindi_templates_selected() {
        let messages = compose_summary("report", Locale::Hindi);
        assert!(messages[0].content.contains("Hindi"));
        assert!(messages[1].content.starts_with(HINDI.summary_instruction));
        assert!(messages[1].content.ends_with("report"));

        let messages = compose_question("report", "क्या यह गंभीर है?", Locale::Hindi);
        assert!(messages[2].content.ends_with(HINDI.question_suffix));
    }

    #[test]
    fn test_session_replays_history_in_order() {
        let turns = vec![
            Turn {
                question: "first?".into(),
                answer: "one".into(),
            },
            Turn {
                question: "second?".into(),
                answer: "two".into(),
            },
        ];
        let messages = compose_session("report body", &turns, "third?", Locale::English);
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(messages.len(), 6);
        assert!(contents[0].ends_with("report body"));
        assert_eq!(&contents[1..5], &["first?", "one", "second?", "two"]);
        assert_eq!(messages[4].role, Role::Assistant);
        assert!(contents[5].starts_with("third?"));
    }

    #[test]
    fn test_locale_parsing() {
        assert_eq!("English".parse::<Locale>().unwrap(), Locale::English);
        assert_eq!("hi".parse::<Locale>().unwrap(), Locale::Hindi);
        assert!("french".parse::<Locale>().is_err());

        let parsed: Locale = serde_json::from_str("\"hindi\"").unwrap();
        assert_eq!(parsed, Locale::Hindi);
        let parsed: Locale = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(parsed, Locale::English);
    }
}
