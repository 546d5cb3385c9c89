//! 展示主题
//!
//! 两种主题只影响系统提示文案与"助手正在输入"指示，不影响消息顺序与投递。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Minimal,
    #[default]
    Rich,
}

impl Theme {
    pub fn welcome(self, room: &str, identity: &str) -> String {
        match self {
            Theme::Minimal => {
                format!("Welcome to {room}, {identity}! Start chatting with the AI assistant.")
            }
            Theme::Rich => format!("Welcome to {room}, {identity}! 🎉"),
        }
    }

    pub fn joined(self, identity: &str) -> String {
        match self {
            Theme::Minimal => format!("{identity} joined the chat"),
            Theme::Rich => format!("{identity} joined the conversation 👋"),
        }
    }

    pub fn left(self, identity: &str) -> String {
        match self {
            Theme::Minimal => format!("{identity} left the chat"),
            Theme::Rich => format!("{identity} left the conversation 👋"),
        }
    }

    pub fn shows_typing(self) -> bool {
        matches!(self, Theme::Rich)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lowercase_names() {
        let theme: Theme = serde_json::from_str("\"minimal\"").unwrap();
        assert_eq!(theme, Theme::Minimal);
        assert_eq!(Theme::default(), Theme::Rich);
    }

    #[test]
    fn wording_differs_per_theme() {
        assert_eq!(Theme::Minimal.joined("bob"), "bob joined the chat");
        assert_eq!(Theme::Rich.left("bob"), "bob left the conversation 👋");
        assert!(!Theme::Minimal.shows_typing());
    }
}
