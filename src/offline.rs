//! Keyword-matched replies used when no backend is reachable

const SKILLS_REPLY: &str = "I specialize in React, TypeScript, Node.js, and modern web development \
practices. I'm also experienced with cloud services and database technologies.";
const CONTACT_REPLY: &str = "You can reach me through the contact form on my website or directly \
via email.";
const PROJECTS_REPLY: &str = "I've worked on various projects including web applications, \
e-commerce platforms, and data visualization tools. Check out the portfolio section for detailed \
case studies!";
const FALLBACK_REPLY: &str = "I'm not sure how to help with that specific query. Feel free to ask \
about my skills, projects, or how to contact me!";

/// Rules are tried in order; the first keyword hit wins
const RULES: [(&[&str], &str); 3] = [
    (&["skill", "tech"], SKILLS_REPLY),
    (&["contact", "email"], CONTACT_REPLY),
    (&["project", "work"], PROJECTS_REPLY),
];

pub fn canned_reply(question: &str) -> &'static str {
    let question = question.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| question.contains(k)))
        .map(|(_, reply)| *reply)
        .unwrap_or(FALLBACK_REPLY)
}
