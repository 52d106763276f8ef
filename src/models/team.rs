use serde::{Deserialize, Serialize};

/// A team a chatter drives for: the card's accent color and logo.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Team {
    /// Any CSS color value.
    pub color: String,
    pub logo: String,
}

impl Team {
    pub fn new(color: impl Into<String>, logo: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            logo: logo.into(),
        }
    }
}
