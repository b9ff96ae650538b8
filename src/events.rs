/// One inbound event from the conversation channel, already routed by
/// command name or inline-button payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Start,
    Consent { agreed: bool },
    UsernameInput(String),
    Generate,
    WatchAd,
    BuySubscription,
    BuyCredits,
    Stats,
    Unknown(String),
}

impl std::fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelEvent::Start => write!(f, "start"),
            ChannelEvent::Consent { agreed: true } => write!(f, "consent_agree"),
            ChannelEvent::Consent { agreed: false } => write!(f, "consent_disagree"),
            ChannelEvent::UsernameInput(_) => write!(f, "username_input"),
            ChannelEvent::Generate => write!(f, "generate"),
            ChannelEvent::WatchAd => write!(f, "watch_ad"),
            ChannelEvent::BuySubscription => write!(f, "buy_subscription"),
            ChannelEvent::BuyCredits => write!(f, "buy_credits"),
            ChannelEvent::Stats => write!(f, "stats"),
            ChannelEvent::Unknown(_) => write!(f, "unknown"),
        }
    }
}

impl ChannelEvent {
    pub fn from_command(name: &str) -> ChannelEvent {
        match name {
            "start" => ChannelEvent::Start,
            "generate" => ChannelEvent::Generate,
            "stats" => ChannelEvent::Stats,
            other => ChannelEvent::Unknown(other.to_string()),
        }
    }

    /// Inline-button payloads as the channel delivers them. `buy_sub` and
    /// `buy_unlimited` are the same purchase under two button labels.
    pub fn from_payload(payload: &str) -> Option<ChannelEvent> {
        match payload {
            "agree" => Some(ChannelEvent::Consent { agreed: true }),
            "disagree" => Some(ChannelEvent::Consent { agreed: false }),
            "watch_ad" => Some(ChannelEvent::WatchAd),
            "buy_sub" | "buy_unlimited" => Some(ChannelEvent::BuySubscription),
            "buy_credits" => Some(ChannelEvent::BuyCredits),
            _ => None,
        }
    }
}

/// Inline action offered alongside a text reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAction {
    Agree,
    Disagree,
    WatchAd,
    BuySubscription,
    BuyCredits,
}

impl ReplyAction {
    /// The callback payload the channel sends back when the button is pressed.
    pub fn payload(&self) -> &'static str {
        match self {
            ReplyAction::Agree => "agree",
            ReplyAction::Disagree => "disagree",
            ReplyAction::WatchAd => "watch_ad",
            ReplyAction::BuySubscription => "buy_sub",
            ReplyAction::BuyCredits => "buy_credits",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReplyAction::Agree => "I agree",
            ReplyAction::Disagree => "I disagree",
            ReplyAction::WatchAd => "Watch an ad (+1 credit)",
            ReplyAction::BuySubscription => "Unlimited subscription",
            ReplyAction::BuyCredits => "Buy credits",
        }
    }
}

/// One outbound message produced by the engine. The channel adapter decides
/// how to deliver it (chat message, inline keyboard, photo upload).
#[derive(Debug, Clone)]
pub enum Reply {
    Text {
        text: String,
        actions: Vec<ReplyAction>,
    },
    Photo {
        image: Vec<u8>,
        caption: String,
    },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Reply {
        Reply::Text {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_actions(text: impl Into<String>, actions: Vec<ReplyAction>) -> Reply {
        Reply::Text {
            text: text.into(),
            actions,
        }
    }

    pub fn photo(image: Vec<u8>, caption: impl Into<String>) -> Reply {
        Reply::Photo {
            image,
            caption: caption.into(),
        }
    }
}
