use crate::error::RecordError;
use serde_json::Value;
use std::fmt;

/// Superchat tier, ordered by significance (blue = 1 .. red = 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SuperchatColor {
    Blue,
    LightBlue,
    Green,
    Yellow,
    Orange,
    Magenta,
    Red,
}

impl SuperchatColor {
    /// Map a `headerBackgroundColor` ARGB code to its tier.
    pub fn from_header_color(code: &str) -> Result<Self, RecordError> {
        let c = match code.trim() {
            "4279592384" => SuperchatColor::Blue,
            "4278237396" => SuperchatColor::LightBlue,
            "4278239141" => SuperchatColor::Green,
            "4294947584" => SuperchatColor::Yellow,
            "4293284096" => SuperchatColor::Orange,
            "4290910299" => SuperchatColor::Magenta,
            "4291821568" => SuperchatColor::Red,
            other => return Err(RecordError::UnknownColor(other.to_string())),
        };
        Ok(c)
    }

    /// Same as `from_header_color`, accepting the code as a JSON string or number.
    pub fn from_value(v: &Value) -> Result<Self, RecordError> {
        match v {
            Value::String(s) => Self::from_header_color(s),
            Value::Number(n) => Self::from_header_color(&n.to_string()),
            _ => Err(RecordError::malformed("purchase.headerBackgroundColor")),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SuperchatColor::Blue => "blue",
            SuperchatColor::LightBlue => "lightblue",
            SuperchatColor::Green => "green",
            SuperchatColor::Yellow => "yellow",
            SuperchatColor::Orange => "orange",
            SuperchatColor::Magenta => "magenta",
            SuperchatColor::Red => "red",
        }
    }

    pub fn significance(self) -> u8 {
        self as u8 + 1
    }
}

impl fmt::Display for SuperchatColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
