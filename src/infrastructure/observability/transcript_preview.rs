const MAX_VISIBLE_CHARS: usize = 100;

/// Shortens a transcript for log fields.
pub fn preview_transcript(transcript: &str) -> String {
    let trimmed = transcript.trim();

    if trimmed.is_empty() {
        return String::from("[EMPTY]");
    }

    let total = trimmed.chars().count();
    if total > MAX_VISIBLE_CHARS {
        let visible: String = trimmed.chars().take(MAX_VISIBLE_CHARS).collect();
        format!("{}... ({} chars total)", visible, total)
    } else {
        trimmed.to_string()
    }
}

