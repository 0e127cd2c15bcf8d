//! Renders the profile list into chunks that each fit one channel message.

use time::{OffsetDateTime, macros::format_description};

use crate::model::ProfileRecord;

/// Characters of the token shown before the ellipsis.
pub const TOKEN_PREFIX_LEN: usize = 16;

const HEADER: &str = "🟣 <b>Group Nostr directory</b>\n\n";
const CONTINUATION_HEADER: &str = "🟣 <b>Group Nostr directory (continued)</b>\n\n";
const CONTINUATION_FOOTER: &str = "\n\n⬇️ <i>Continued in the next message...</i>";
const ELLIPSIS: char = '…';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("chunk size {max} cannot hold a header, footer and one profile line ({needed} chars)")]
    ChunkTooSmall { max: usize, needed: usize },
}

#[derive(Debug, Clone)]
pub struct Renderer {
    viewer_base_url: String,
    max_chunk_size: usize,
}

impl Renderer {
    pub fn new(viewer_base_url: impl Into<String>, max_chunk_size: usize) -> Self {
        Self {
            viewer_base_url: viewer_base_url.into(),
            max_chunk_size,
        }
    }

    /// Packs `profiles` in order, numbering them across the whole list.
    ///
    /// Every chunk is at most `max_chunk_size` characters. Non-final chunks
    /// end with a continuation marker, the final one with the total count and
    /// `rendered_at`.
    pub fn render(
        &self,
        profiles: &[ProfileRecord],
        rendered_at: OffsetDateTime,
    ) -> Result<Vec<String>, RenderError> {
        let stamp = format_stamp(rendered_at);
        let max = self.max_chunk_size;

        if profiles.is_empty() {
            let placeholder = format!(
                "{HEADER}<i>No profiles registered yet.</i>\n\
                 Send your <code>npub1...</code> to appear here.{}",
                final_footer(0, &stamp)
            );
            let needed = char_len(&placeholder);
            if needed > max {
                return Err(RenderError::ChunkTooSmall { max, needed });
            }
            return Ok(vec![placeholder]);
        }

        let footer = final_footer(profiles.len(), &stamp);
        let worst_footer = char_len(&footer).max(char_len(CONTINUATION_FOOTER));
        let frame = char_len(HEADER).max(char_len(CONTINUATION_HEADER)) + worst_footer;

        let mut chunks = Vec::new();
        let mut header = HEADER;
        let mut lines: Vec<String> = Vec::new();
        let mut body_len = 0;

        for (index, profile) in profiles.iter().enumerate() {
            let line = self.line(index + 1, profile, frame)?;
            let line_len = char_len(&line);

            if !lines.is_empty()
                && char_len(header) + body_len + 1 + line_len + worst_footer > max
            {
                chunks.push(seal(header, &lines, CONTINUATION_FOOTER));
                lines.clear();
                body_len = 0;
                header = CONTINUATION_HEADER;
            }

            body_len += if lines.is_empty() { line_len } else { line_len + 1 };
            lines.push(line);
        }
        chunks.push(seal(header, &lines, &footer));

        Ok(chunks)
    }

    /// `"{index}. {name} → <a href='{url}'>{short}</a>"`, with the name
    /// shortened when the whole line would not fit an empty chunk.
    fn line(
        &self,
        index: usize,
        profile: &ProfileRecord,
        frame: usize,
    ) -> Result<String, RenderError> {
        let link = format!(
            "<a href='{}'>{}</a>",
            profile.token.viewer_url(&self.viewer_base_url),
            profile.token.short(TOKEN_PREFIX_LEN)
        );
        let needed = frame + char_len(&format!("{index}.  → {link}"));
        let Some(name_budget) = self.max_chunk_size.checked_sub(needed) else {
            return Err(RenderError::ChunkTooSmall {
                max: self.max_chunk_size,
                needed,
            });
        };

        let name = fit_escaped(&profile.display_name(), name_budget);
        Ok(format!("{index}. {name} → {link}"))
    }
}

fn seal(header: &str, lines: &[String], footer: &str) -> String {
    format!("{header}{}{footer}", lines.join("\n"))
}

fn final_footer(count: usize, stamp: &str) -> String {
    format!("\n\n📊 {count} profiles | Updated: {stamp} UTC")
}

pub fn format_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[day]/[month]/[year] [hour]:[minute]"))
        .unwrap_or_default()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// HTML-escapes `raw`, cutting it at a character boundary so the escaped
/// form plus a trailing ellipsis stays within `budget`.
fn fit_escaped(raw: &str, budget: usize) -> String {
    let full = escape_html(raw);
    if char_len(&full) <= budget {
        return full;
    }
    if budget == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in raw.chars() {
        let escaped = escape_char(ch);
        let len = char_len(&escaped);
        if used + len + 1 > budget {
            break;
        }
        out.push_str(&escaped);
        used += len;
    }
    out.push(ELLIPSIS);
    out
}

pub fn escape_html(raw: &str) -> String {
    raw.chars().map(escape_char).collect()
}

fn escape_char(ch: char) -> String {
    match ch {
        '&' => "&amp;".to_owned(),
        '<' => "&lt;".to_owned(),
        '>' => "&gt;".to_owned(),
        '"' => "&quot;".to_owned(),
        _ => ch.to_string(),
    }
}
