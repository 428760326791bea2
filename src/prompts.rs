//! System prompt for the CodeWizard assistant.

// Loaded at compile time
const SYSTEM_PROMPT: &str = include_str!("prompts/system.txt");

/// The fixed system turn that opens every run.
#[must_use]
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT.trim()
}

/// Pre-resolved library identifiers listed in the prompt, as `(name, id)`.
pub fn library_shortcuts() -> impl Iterator<Item = (&'static str, &'static str)> {
    SYSTEM_PROMPT.lines().filter_map(|line| {
        let (name, id) = line.strip_prefix("- ")?.split_once(": ")?;
        id.starts_with('/').then_some((name, id))
    })
}
