//! Text cleanup for speech synthesis.
//!
//! The generation backend is happy to emit emoji, markdown decoration and
//! raw links. None of that should be read aloud, so replies pass through
//! here before reaching the synthesizer.

use regex::Regex;

/// Strip decorative symbols from `text` and collapse whitespace.
///
/// Removes characters in the common emoji code-point blocks and a fixed set
/// of markdown/decoration symbols, then collapses every whitespace run to a
/// single space and trims the ends. Never fails; garbage in, empty out.
pub fn sanitize(text: &str) -> String {
    let emoji = Regex::new(
        "[\u{1F600}-\u{1F64F}\
\u{1F300}-\u{1F5FF}\
\u{1F680}-\u{1F6FF}\
\u{1F1E0}-\u{1F1FF}\
\u{2700}-\u{27BF}\
\u{24C2}-\u{1F251}]+",
    )
    .expect("emoji pattern is valid");
    let symbols = Regex::new(r#"[*_~`#@%^&+=|<>{}\[\]\\]"#).expect("symbol pattern is valid");

    let text = emoji.replace_all(text, "");
    let text = symbols.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Speech-oriented variant of [`sanitize`].
///
/// First discards any line containing a hyperlink or a markdown link
/// bracket, so the synthesizer never reads URLs or link syntax aloud, then
/// applies the regular symbol stripping.
pub fn sanitize_for_speech(text: &str) -> String {
    let spoken: Vec<&str> = text
        .lines()
        .filter(|line| {
            !line.contains("http://") && !line.contains("https://") && !line.contains("](")
        })
        .collect();
    sanitize(&spoken.join("\n"))
}
