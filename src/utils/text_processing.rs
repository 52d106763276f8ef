use crate::models::emote::{EmoteMap, EmotePlacement, placements};
use eyre::eyre;

/// A piece of the rendered message body.
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Char(char),
    Emote(&'a EmotePlacement),
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        push_escaped(&mut out, ch);
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        _ => out.push(ch),
    }
}

/// Renders a chat message as HTML with its emotes replaced by images.
///
/// Every character that is not part of an emote is escaped on its own, so the
/// result is always safe to inject. Ranges index characters of `text`. Any
/// malformed emote data degrades to the escaped plain text.
pub fn render_emotes(text: &str, emotes: Option<&EmoteMap>, emote_size: &str) -> String {
    let Some(emotes) = emotes else {
        return escape_html(text);
    };

    match try_render_emotes(text, emotes, emote_size) {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!("Failed to process emotes, showing plain text: {}", e);
            escape_html(text)
        }
    }
}

fn try_render_emotes(
    text: &str,
    emotes: &EmoteMap,
    emote_size: &str,
) -> Result<String, eyre::Report> {
    let chars: Vec<char> = text.chars().collect();
    let mut replacements = placements(emotes)?;

    // Highest start first, so each range is checked against the one after it.
    replacements.sort_by(|a, b| b.start.cmp(&a.start));

    let mut next_start = chars.len();
    for placement in &replacements {
        if placement.end >= next_start {
            return Err(eyre!(
                "Emote {} at {}-{} overlaps another emote or runs past the message ({} chars)",
                placement.id,
                placement.start,
                placement.end,
                chars.len()
            ));
        }
        next_start = placement.start;
    }

    let mut segments = Vec::with_capacity(chars.len());
    let mut cursor = 0;
    for placement in replacements.iter().rev() {
        segments.extend(chars[cursor..placement.start].iter().copied().map(Segment::Char));
        segments.push(Segment::Emote(placement));
        cursor = placement.end + 1;
    }
    segments.extend(chars[cursor..].iter().copied().map(Segment::Char));

    let mut html = String::with_capacity(text.len());
    for segment in segments {
        match segment {
            Segment::Char(ch) => push_escaped(&mut html, ch),
            Segment::Emote(placement) => html.push_str(&emote_img(placement, emote_size)),
        }
    }
    Ok(html)
}

fn emote_img(placement: &EmotePlacement, emote_size: &str) -> String {
    format!(
        r#"<img src="{}" alt="emote" class="emote-img" style="height:{};vertical-align:middle;">"#,
        escape_html(&placement.image_url()),
        escape_html(emote_size)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emote_map(entries: Vec<(&str, Vec<&str>)>) -> EmoteMap {
        entries
            .into_iter()
            .map(|(id, ranges)| {
                (
                    id.to_string(),
                    ranges.into_iter().map(String::from).collect(),
                )
            })
            .collect()
    }

    fn img(id: &str) -> String {
        format!(
            r#"<img src="https://static-cdn.jtvnw.net/emoticons/v2/{}/default/dark/2.0" alt="emote" class="emote-img" style="height:1.2em;vertical-align:middle;">"#,
            id
        )
    }

    #[test]
    fn escapes_plain_text_without_emotes() {
        assert_eq!(render_emotes("<script>", None, "1.2em"), "&lt;script&gt;");
        assert_eq!(escape_html(r#"a & "b" 'c'"#), "a &amp; &quot;b&quot; &#39;c&#39;");
    }

    #[test]
    fn replaces_single_character_emote() {
        let emotes = emote_map(vec![("123", vec!["0-0"])]);
        let html = render_emotes("abc", Some(&emotes), "1.2em");
        assert_eq!(html, format!("{}bc", img("123")));
        assert_eq!(html.matches("<img").count(), 1);
    }

    #[test]
    fn applies_ranges_regardless_of_declaration_order() {
        let expected = format!("{} {}", img("1"), img("2"));

        let forward = emote_map(vec![("1", vec!["0-4"]), ("2", vec!["6-10"])]);
        assert_eq!(render_emotes("hello world", Some(&forward), "1.2em"), expected);

        let mut reversed = EmoteMap::new();
        reversed.insert("2".into(), vec!["6-10".into()]);
        reversed.insert("1".into(), vec!["0-4".into()]);
        assert_eq!(render_emotes("hello world", Some(&reversed), "1.2em"), expected);
    }

    #[test]
    fn same_emote_repeated_within_one_entry() {
        let emotes = emote_map(vec![("25", vec!["6-10", "0-4"])]);
        let html = render_emotes("Kappa Kappa!", Some(&emotes), "1.2em");
        assert_eq!(html, format!("{} {}!", img("25"), img("25")));
    }

    #[test]
    fn text_around_emotes_is_still_escaped() {
        let emotes = emote_map(vec![("25", vec!["4-8"])]);
        let html = render_emotes("<b> Kappa </b>", Some(&emotes), "1.2em");
        assert_eq!(html, format!("&lt;b&gt; {} &lt;/b&gt;", img("25")));
    }

    #[test]
    fn indexes_by_character_not_byte() {
        let emotes = emote_map(vec![("25", vec!["2-6"])]);
        let html = render_emotes("é Kappa", Some(&emotes), "1.2em");
        assert_eq!(html, format!("é {}", img("25")));
    }

    #[test]
    fn empty_emote_map_is_plain_escaped_text() {
        let emotes = EmoteMap::new();
        assert_eq!(render_emotes("a<b", Some(&emotes), "1.2em"), "a&lt;b");
    }

    #[test]
    fn malformed_ranges_fall_back_to_escaped_text() {
        for ranges in [vec!["x-1"], vec!["3-1"], vec!["0-20"], vec!["0-3", "2-4"]] {
            let emotes = emote_map(vec![("25", ranges.clone())]);
            assert_eq!(
                render_emotes("<i>hey</i>", Some(&emotes), "1.2em"),
                "&lt;i&gt;hey&lt;/i&gt;",
                "ranges {:?}",
                ranges
            );
        }
    }
}
