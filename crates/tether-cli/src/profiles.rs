//! Built-in assistant profiles and system-instruction composition.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Conversation setting the assistant is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Interview,
    Sales,
    Meeting,
    Presentation,
    Negotiation,
    Exam,
}

const SHARED_RULES: &str = "Keep answers short and direct, no more than a few sentences \
unless asked for detail. Use plain text. If something was said in another language, \
answer in the language the user is speaking.";

impl Profile {
    fn role(self) -> &'static str {
        match self {
            Self::Interview => {
                "You are an interview copilot. Suggest concise, confident answers to the \
                 interviewer's questions, drawing on the candidate's background when it is given."
            }
            Self::Sales => {
                "You are a sales call assistant. Suggest how to answer objections, highlight \
                 value, and move the conversation toward a next step."
            }
            Self::Meeting => {
                "You are a meeting assistant. Suggest clear contributions, summarize decisions, \
                 and flag open action items."
            }
            Self::Presentation => {
                "You are a presentation coach. Suggest answers to audience questions and ways \
                 to recover when the speaker loses the thread."
            }
            Self::Negotiation => {
                "You are a negotiation advisor. Suggest positions, counteroffers and questions \
                 that protect the user's interests while keeping the deal alive."
            }
            Self::Exam => {
                "You are an exam assistant. Give the correct answer first, then a one-line \
                 justification."
            }
        }
    }
}

/// Compose the system instruction for `profile`, appending any user context.
pub fn system_prompt(profile: Profile, custom: &str) -> String {
    let mut prompt = format!("{}\n\n{}", profile.role(), SHARED_RULES);
    let custom = custom.trim();
    if !custom.is_empty() {
        prompt.push_str("\n\nUser-provided context:\n");
        prompt.push_str(custom);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_context() {
        let prompt = system_prompt(Profile::Sales, "   ");
        assert!(prompt.starts_with("You are a sales call assistant."));
        assert!(!prompt.contains("User-provided context"));
    }

    #[test]
    fn prompt_appends_context() {
        let prompt = system_prompt(Profile::Interview, " Senior Rust engineer, 8 years. ");
        assert!(prompt.ends_with("User-provided context:\nSenior Rust engineer, 8 years."));
    }

    #[test]
    fn profile_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            profile: Profile,
        }
        let parsed: Wrapper = toml::from_str("profile = \"negotiation\"").unwrap();
        assert_eq!(parsed.profile, Profile::Negotiation);
        assert_eq!(Profile::from_str("exam", true).unwrap(), Profile::Exam);
    }
}
