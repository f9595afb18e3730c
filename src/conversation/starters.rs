use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Opening line of every new conversation
pub const GREETING: &str = "Hi there! I'm Adi, Aditya's AI assistant. I'd be happy to tell you about \
my education, work experience, or any other aspect of the professional journey. \
What would you like to know?";

/// Canned question offered before the visitor has typed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarterPrompt {
    pub id: &'static str,
    pub label: &'static str,
    pub message: &'static str,
}

pub const STARTERS: [StarterPrompt; 4] = [
    StarterPrompt {
        id: "experience",
        label: "Work Experience",
        message: "Tell me about your work experience and professional background.",
    },
    StarterPrompt {
        id: "skills",
        label: "Technical Skills",
        message: "What technical skills and technologies do you specialize in?",
    },
    StarterPrompt {
        id: "projects",
        label: "Projects",
        message: "Can you showcase some of your notable projects?",
    },
    StarterPrompt {
        id: "contact",
        label: "Contact Info",
        message: "How can I get in touch with you?",
    },
];

static STARTERS_BY_ID: Lazy<HashMap<&'static str, StarterPrompt>> =
    Lazy::new(|| STARTERS.iter().map(|starter| (starter.id, *starter)).collect());

/// Look a starter up by its 1-based position or its id
pub fn find_starter(key: &str) -> Option<StarterPrompt> {
    let key = key.trim();
    if let Ok(position) = key.parse::<usize>() {
        return position.checked_sub(1).and_then(|i| STARTERS.get(i)).copied();
    }
    STARTERS_BY_ID.get(key.to_lowercase().as_str()).copied()
}
