//! Prompt handling for the recognition engine.
//!
//! Centralising prompt text and its normalisation here keeps the orchestrator
//! free of string fiddling and makes the rules unit-testable without an
//! engine. Callers can override the default prompt per request or through
//! `INKSTONE_DEFAULT_PROMPT`; the constants here apply when they don't.

/// Default prompt: grounded markdown conversion.
///
/// The `<image>` placeholder marks where the engine injects the page; the
/// `<|grounding|>` tag asks for region markup that the layout extractor
/// understands.
pub const DEFAULT_PROMPT: &str = "<image>\n<|grounding|>Convert the document to markdown.";

/// Normalise a caller-supplied prompt into the effective prompt.
///
/// An empty (or whitespace-only) prompt falls back to `default_prompt`; a
/// prompt missing the `<image>` placeholder gets it prefixed, since the
/// engine requires exactly one image slot.
pub fn ensure_image_tag(prompt: &str, default_prompt: &str) -> String {
    let trimmed = prompt.trim();
    let effective = if trimmed.is_empty() { default_prompt } else { trimmed };
    if effective.contains("<image>") {
        effective.to_string()
    } else {
        format!("<image>\n{effective}")
    }
}

/// Strip the engine's end-of-sequence markers from raw output.
pub fn clean_prediction(text: &str) -> String {
    text.replace("<｜end▁of▁sentence｜>", "")
        .replace("<|end_of_text|>", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_falls_back_to_default() {
        assert_eq!(ensure_image_tag("", DEFAULT_PROMPT), DEFAULT_PROMPT);
        assert_eq!(ensure_image_tag("   \n", DEFAULT_PROMPT), DEFAULT_PROMPT);
    }

    #[test]
    fn missing_image_tag_is_prefixed() {
        assert_eq!(
            ensure_image_tag("识别全部文字", DEFAULT_PROMPT),
            "<image>\n识别全部文字"
        );
    }

    #[test]
    fn existing_image_tag_is_kept_as_is() {
        let p = "<image>\nFree OCR.";
        assert_eq!(ensure_image_tag(p, DEFAULT_PROMPT), p);
    }

    #[test]
    fn clean_prediction_strips_eos_markers() {
        let raw = "你好 world<|end_of_text|>\n<｜end▁of▁sentence｜>";
        assert_eq!(clean_prediction(raw), "你好 world");
    }

    #[test]
    fn clean_prediction_trims_whitespace() {
        assert_eq!(clean_prediction("  text  \n"), "text");
        assert_eq!(clean_prediction(""), "");
    }
}
