use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Delivery channel(s) for a promotional message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionChannel {
    Email,
    Push,
    Both,
}

impl PromotionChannel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PromotionChannel::Email => "email",
            PromotionChannel::Push => "push",
            PromotionChannel::Both => "both",
        }
    }

    #[must_use]
    pub fn sends_email(self) -> bool {
        matches!(self, PromotionChannel::Email | PromotionChannel::Both)
    }

    #[must_use]
    pub fn sends_push(self) -> bool {
        matches!(self, PromotionChannel::Push | PromotionChannel::Both)
    }
}

impl FromStr for PromotionChannel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(PromotionChannel::Email),
            "push" => Ok(PromotionChannel::Push),
            "both" => Ok(PromotionChannel::Both),
            other => Err(CoreError::Validation {
                field: "channel",
                reason: format!("unknown channel '{other}'"),
            }),
        }
    }
}

/// Who receives a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionAudience {
    /// Every active user.
    All,
    /// Only the user ids stored with the promotion.
    Selected,
}

impl PromotionAudience {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PromotionAudience::All => "all",
            PromotionAudience::Selected => "selected",
        }
    }
}

impl FromStr for PromotionAudience {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PromotionAudience::All),
            "selected" => Ok(PromotionAudience::Selected),
            other => Err(CoreError::Validation {
                field: "audience",
                reason: format!("unknown audience '{other}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sends_on_every_channel() {
        assert!(PromotionChannel::Both.sends_email());
        assert!(PromotionChannel::Both.sends_push());
        assert!(!PromotionChannel::Email.sends_push());
        assert!(!PromotionChannel::Push.sends_email());
    }

    #[test]
    fn channel_and_audience_parse() {
        assert_eq!("push".parse::<PromotionChannel>().unwrap(), PromotionChannel::Push);
        assert_eq!(
            "selected".parse::<PromotionAudience>().unwrap(),
            PromotionAudience::Selected
        );
        assert!("sms".parse::<PromotionChannel>().is_err());
    }
}
