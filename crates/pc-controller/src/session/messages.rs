//! User-facing messages shown when the controller ends a session

/// Message languages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Chinese,
}

impl Language {
    /// Map a `LANGUAGE_CODE` value; anything not Chinese falls back to English
    pub fn from_code(code: &str) -> Self {
        let code = code.to_ascii_lowercase();
        if code == "zh" || code.starts_with("zh-") || code.starts_with("zh_") {
            Self::Chinese
        } else {
            Self::English
        }
    }
}

/// Shown when the idle limit disconnects a session
pub fn idle_disconnect(language: Language, minutes: f64) -> String {
    match language {
        Language::English => format!("Connect idle more than {} minutes, disconnect", minutes),
        Language::Chinese => format!("连接空闲超过 {} 分钟，断开连接", minutes),
    }
}

/// Shown when an administrator kills a session from the central server
pub fn terminated_by_administrator(language: Language) -> &'static str {
    match language {
        Language::English => "Terminated by administrator",
        Language::Chinese => "被管理员中断",
    }
}
