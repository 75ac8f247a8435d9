//! Spoken/typed trigger phrases that bypass the generation pipeline.
//!
//! This is a guard-clause layer, not an intent classifier: case-insensitive
//! substring matches against a handful of literal phrases, checked in a
//! fixed priority order, first match wins.

/// Trigger phrase for a local news lookup.
pub const NEWS_PHRASE: &str = "latest news";
/// Trigger phrase for opening the browser, optionally with a search query.
pub const OPEN_BROWSER_PHRASE: &str = "open browser";
/// Trigger phrase for closing the browser.
pub const CLOSE_BROWSER_PHRASE: &str = "close browser";

/// A recognized trigger command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch news headlines for the user's rough location.
    GetLocalNews,
    /// Open the browser, searching for the given query when non-empty.
    OpenBrowser(String),
    /// Close the browser.
    CloseBrowser,
}

/// Match `input` against the trigger phrases.
///
/// Priority: news, then open-browser, then close-browser. For
/// [`Command::OpenBrowser`], whatever follows the trigger phrase becomes the
/// search query.
pub fn match_command(input: &str) -> Option<Command> {
    let normalized = input.trim().to_lowercase();

    if normalized.contains(NEWS_PHRASE) {
        return Some(Command::GetLocalNews);
    }

    if let Some(pos) = normalized.find(OPEN_BROWSER_PHRASE) {
        let query = normalized[pos + OPEN_BROWSER_PHRASE.len()..].trim().to_string();
        return Some(Command::OpenBrowser(query));
    }

    if normalized.contains(CLOSE_BROWSER_PHRASE) {
        return Some(Command::CloseBrowser);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_chat_is_not_a_command() {
        assert_eq!(match_command("tell me a joke"), None);
    }

    #[test]
    fn news_phrase_matches_anywhere() {
        assert_eq!(
            match_command("what's the Latest News around here?"),
            Some(Command::GetLocalNews)
        );
    }

    #[test]
    fn open_browser_captures_the_query() {
        assert_eq!(
            match_command("open browser cats"),
            Some(Command::OpenBrowser("cats".into()))
        );
    }

    #[test]
    fn open_browser_without_query_yields_empty_query() {
        assert_eq!(
            match_command("Open Browser"),
            Some(Command::OpenBrowser(String::new()))
        );
    }

    #[test]
    fn close_browser_matches() {
        assert_eq!(
            match_command("please close browser now"),
            Some(Command::CloseBrowser)
        );
    }

    #[test]
    fn news_takes_priority_over_browser_phrases() {
        assert_eq!(
            match_command("open browser with the latest news"),
            Some(Command::GetLocalNews)
        );
    }
}
