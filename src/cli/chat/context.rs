use std::env;

use chrono::Local;

/// Persona statement prefixed to every generation prompt.
pub const PERSONA: &str = "Your name is Eva and you are a friendly, helpful, and fun AI \
assistant. Respond in a casual and engaging manner.";

/// Ambient session facts woven into the generation context: who the user
/// is, roughly where they are, and what time it is.
pub struct ContextManager {
    pub username: String,
    pub location: String,
}

impl ContextManager {
    pub fn new(location: String) -> Self {
        let username = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| "user".to_string());

        Self { username, location }
    }

    pub fn system_context(&self) -> String {
        format!(
            "Current time: {}\nUser location: {}\nUser name: {}",
            Local::now().format("%Y-%m-%d %H:%M"),
            self.location,
            self.username
        )
    }
}
