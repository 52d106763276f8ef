use eyre::{WrapErr, eyre};
use std::collections::BTreeMap;

/// Emote id to the raw `start-end` ranges it covers, as carried by the
/// `emotes` IRC tag. Ranges are inclusive character offsets into the message.
pub type EmoteMap = BTreeMap<String, Vec<String>>;

const EMOTE_CDN: &str = "https://static-cdn.jtvnw.net/emoticons/v2";

/// One emote occurrence inside a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmotePlacement {
    pub id: String,
    pub start: usize,
    pub end: usize,
}

impl EmotePlacement {
    /// Parses a single `start-end` range for the emote `id`.
    pub fn parse(id: &str, range: &str) -> Result<Self, eyre::Report> {
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| eyre!("Emote range {:?} is missing a '-'", range))?;
        let start: usize = start
            .trim()
            .parse()
            .wrap_err_with(|| format!("Invalid emote range start in {:?}", range))?;
        let end: usize = end
            .trim()
            .parse()
            .wrap_err_with(|| format!("Invalid emote range end in {:?}", range))?;

        if start > end {
            return Err(eyre!("Emote range {:?} ends before it starts", range));
        }

        Ok(Self {
            id: id.to_string(),
            start,
            end,
        })
    }

    pub fn image_url(&self) -> String {
        format!("{}/{}/default/dark/2.0", EMOTE_CDN, self.id)
    }
}

/// Flattens an emote map into placements. Fails on the first malformed range.
pub fn placements(emotes: &EmoteMap) -> Result<Vec<EmotePlacement>, eyre::Report> {
    let mut out = Vec::new();
    for (id, ranges) in emotes {
        for range in ranges {
            out.push(EmotePlacement::parse(id, range)?);
        }
    }
    Ok(out)
}
