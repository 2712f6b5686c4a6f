//! Localized reminder strings.
//!
//! Only the text that leaves the core (notification title, bodies and action
//! labels) lives here; `{title}` is replaced by the task title.

const TITLE_PLACEHOLDER: &str = "{title}";

/// Supported UI languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    /// Parses `en`/`zh` (case-insensitive, region suffix ignored).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let primary = normalized.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    pub fn strings(self) -> &'static ReminderStrings {
        match self {
            Self::En => &EN,
            Self::Zh => &ZH,
        }
    }
}

/// Reminder text table for one language.
#[derive(Debug, PartialEq, Eq)]
pub struct ReminderStrings {
    pub reminder_title: &'static str,
    configured_body: &'static str,
    legacy_body: &'static str,
    pub mark_done: &'static str,
    pub snooze: &'static str,
}

impl ReminderStrings {
    /// Body for a configured (repeating) reminder.
    pub fn configured_body(&self, task_title: &str) -> String {
        self.configured_body.replace(TITLE_PLACEHOLDER, task_title)
    }

    /// Body for the legacy one-shot warning.
    pub fn legacy_body(&self, task_title: &str) -> String {
        self.legacy_body.replace(TITLE_PLACEHOLDER, task_title)
    }
}

static EN: ReminderStrings = ReminderStrings {
    reminder_title: "Gentle Reminder",
    configured_body: "It's time for \"{title}\". Remember to take a break.",
    legacy_body: "Time is up for \"{title}\". Take it at your own pace.",
    mark_done: "Mark done",
    snooze: "Snooze",
};

static ZH: ReminderStrings = ReminderStrings {
    reminder_title: "温馨提醒",
    configured_body: "\"{title}\" 的预定时间到了，记得休息一下。",
    legacy_body: "\"{title}\" 的时间快到了，按自己的节奏来就好。",
    mark_done: "完成",
    snooze: "稍后提醒",
};
