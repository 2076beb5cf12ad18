//! Templated post texts, one per slot.

use sp_core::{PostWriter, QueuedArticle, Rules, Slot, SlotTexts};

/// Hard cap on a rendered post, in characters.
pub const MAX_POST_CHARS: usize = 270;
pub const EXCERPT_CHARS: usize = 140;
const ELLIPSIS: char = '…';
const UNTITLED: &str = "Untitled";
const NO_IMAGE: &str = "no image";

const SLOT1_TEMPLATE: &str = "[Intro] {title}\n{excerpt}\n\
First, the facts. The next post breaks down what actually drove the results.\n\
({style})";

const SLOT2_TEMPLATE: &str = "[Strategy] The win rarely comes from the technology alone:\n\
1) define the problem on the ground\n2) build it into the workflow\n3) measure and improve\n\
Judge an AI tool by how much faster it makes existing decisions.";

const SLOT3_TEMPLATE: &str = "[Today] To try this now, set a KPI for one small task first \
and keep a human review step in place.\n\
Source (article): {url}\n\
Source (image): {image_credit}";

/// Renders the built-in templates, or the per-slot overrides from the rules.
///
/// Placeholders: `{title}`, `{excerpt}`, `{url}`, `{topic}`,
/// `{image_credit}` and `{style}`. Unknown placeholders are left as written.
#[derive(Debug, Clone, Default)]
pub struct TemplateWriter;

impl TemplateWriter {
    pub fn new() -> Self {
        Self
    }

    fn render(&self, template: &str, article: &QueuedArticle, style: &str) -> String {
        let title = match article.title.trim() {
            "" => UNTITLED,
            title => title,
        };
        let credit = article
            .image_source
            .as_deref()
            .or(article.image_url.as_deref())
            .unwrap_or(NO_IMAGE);
        let excerpt = excerpt(&article.body, EXCERPT_CHARS);

        let text = fill(template, |key| match key {
            "title" => Some(title),
            "excerpt" => Some(excerpt.as_str()),
            "url" => Some(article.article_url.as_str()),
            "topic" => Some(article.topic.as_str()),
            "image_credit" => Some(credit),
            "style" => Some(style),
            _ => None,
        });
        truncate_chars(&text, MAX_POST_CHARS)
    }
}

impl PostWriter for TemplateWriter {
    fn write_posts(&self, article: &QueuedArticle, rules: &Rules) -> SlotTexts {
        let style = style_note(&rules.writer_constraints);
        let text_for = |slot: Slot, default: &str| {
            let template = rules.templates.for_slot(slot).unwrap_or(default);
            self.render(template, article, &style)
        };
        SlotTexts {
            first: text_for(Slot::First, SLOT1_TEMPLATE),
            second: text_for(Slot::Second, SLOT2_TEMPLATE),
            third: text_for(Slot::Third, SLOT3_TEMPLATE),
        }
    }
}

pub fn style_note(constraints: &[String]) -> String {
    let mut note = String::from("Style: ");
    if !constraints.is_empty() {
        note.push_str(&constraints.join(" / "));
        note.push_str(". ");
    }
    note.push_str("Objective and analytical, never sensational.");
    note
}

/// Single left-to-right pass, so substituted values are never re-expanded.
fn fill<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| lookup(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Flattens whitespace and shortens to `width` characters on a word
/// boundary, marking the cut with an ellipsis.
pub fn excerpt(body: &str, width: usize) -> String {
    let words: Vec<&str> = body.split_whitespace().collect();
    let flat = words.join(" ");
    if flat.chars().count() <= width {
        return flat;
    }

    let budget = width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for word in words {
        let needed = word.chars().count() + usize::from(used > 0);
        if used + needed > budget {
            break;
        }
        if used > 0 {
            out.push(' ');
        }
        out.push_str(word);
        used += needed;
    }
    if out.is_empty() {
        // A single word longer than the budget, typical for unspaced CJK text.
        out = flat.chars().take(budget).collect();
    }
    out.push(ELLIPSIS);
    out
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
