//! Session state shared by the views of one user: display language and the
//! queue of pending notices.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WaitlistError;

/// Oldest notices are dropped beyond this many.
const MAX_PENDING_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "zh-TW")]
    ZhTw,
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "en")]
    En,
}

impl Locale {
    pub fn tag(&self) -> &'static str {
        match self {
            Locale::ZhTw => "zh-TW",
            Locale::ZhCn => "zh-CN",
            Locale::Ja => "ja",
            Locale::En => "en",
        }
    }

    /// First supported language in an `Accept-Language` value, else the default.
    pub fn from_accept_language(header: &str) -> Self {
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .find_map(|tag| tag.trim().parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Locale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase().replace('_', "-");
        match tag.as_str() {
            "zh-tw" | "zh-hant" | "zh-hk" => Ok(Locale::ZhTw),
            "zh-cn" | "zh-hans" | "zh" => Ok(Locale::ZhCn),
            "ja" | "ja-jp" => Ok(Locale::Ja),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Fixed texts views show after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    CheckedIn,
    PlayerCalled,
    YouAreCalled,
    PlayerArrived,
    PlayerSeated,
    SeatsUpdated,
    EntryCancelled,
    ViewReloaded,
}

impl Message {
    pub fn text(&self, locale: Locale) -> &'static str {
        use Locale::*;
        use Message::*;
        match (self, locale) {
            (CheckedIn, ZhTw) => "已加入候位",
            (CheckedIn, ZhCn) => "已加入候位",
            (CheckedIn, Ja) => "ウェイティングリストに登録しました",
            (CheckedIn, En) => "You are on the waitlist",
            (PlayerCalled, ZhTw) => "已叫號",
            (PlayerCalled, ZhCn) => "已叫号",
            (PlayerCalled, Ja) => "プレイヤーを呼び出しました",
            (PlayerCalled, En) => "Player called",
            (YouAreCalled, ZhTw) => "輪到你了，請至櫃台報到",
            (YouAreCalled, ZhCn) => "轮到你了，请至柜台报到",
            (YouAreCalled, Ja) => "順番が来ました。受付までお越しください",
            (YouAreCalled, En) => "You have been called, please come to the front desk",
            (PlayerArrived, ZhTw) => "玩家已報到",
            (PlayerArrived, ZhCn) => "玩家已报到",
            (PlayerArrived, Ja) => "プレイヤーが到着しました",
            (PlayerArrived, En) => "Player arrived",
            (PlayerSeated, ZhTw) => "玩家已入座",
            (PlayerSeated, ZhCn) => "玩家已入座",
            (PlayerSeated, Ja) => "プレイヤーが着席しました",
            (PlayerSeated, En) => "Player seated",
            (SeatsUpdated, ZhTw) => "座位已更新",
            (SeatsUpdated, ZhCn) => "座位已更新",
            (SeatsUpdated, Ja) => "座席数を更新しました",
            (SeatsUpdated, En) => "Seats updated",
            (EntryCancelled, ZhTw) => "已取消候位",
            (EntryCancelled, ZhCn) => "已取消候位",
            (EntryCancelled, Ja) => "キャンセルしました",
            (EntryCancelled, En) => "Waitlist entry cancelled",
            (ViewReloaded, ZhTw) => "資料已重新載入",
            (ViewReloaded, ZhCn) => "数据已重新载入",
            (ViewReloaded, Ja) => "データを再読み込みしました",
            (ViewReloaded, En) => "Data reloaded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Passed to every view operation that reports back to the user.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    locale: Locale,
    notices: VecDeque<Notice>,
}

impl SessionContext {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            notices: VecDeque::new(),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    fn push(&mut self, level: NoticeLevel, text: String) {
        if self.notices.len() == MAX_PENDING_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice { level, text });
    }

    pub fn success(&mut self, message: Message) {
        self.push(NoticeLevel::Success, message.text(self.locale).to_string());
    }

    pub fn info(&mut self, message: Message) {
        self.push(NoticeLevel::Info, message.text(self.locale).to_string());
    }

    pub fn error(&mut self, err: &WaitlistError) {
        self.push(NoticeLevel::Error, err.notice());
    }

    pub fn pending(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }
}
