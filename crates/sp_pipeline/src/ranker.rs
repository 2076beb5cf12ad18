//! Deterministic keyword scoring of extracted articles.

use sp_core::text::normalize;
use sp_core::{ExtractedArticle, Person, Ranking};

pub const THEME_WEIGHT: f64 = 2.0;
pub const IMPACT_WEIGHT: f64 = 0.5;
pub const PERSON_WEIGHT: f64 = 3.0;

/// Practical-impact terms: adoption, operations, results, efficiency and
/// their English business counterparts.
pub const IMPACT_KEYWORDS: &[&str] = &[
    "導入",
    "運用",
    "成果",
    "効率",
    "revenue",
    "productivity",
    "enterprise",
    "workflow",
];

pub const DEFAULT_TOPIC: &str = "AI use-case";

/// Checked in order; the first category whose marker appears wins.
pub const TOPIC_MARKERS: &[(&str, &[&str])] = &[
    ("Medical AI", &["medical", "医療"]),
    ("Education AI", &["education", "教育"]),
    ("Finance AI", &["finance", "金融"]),
];

/// Scores `article` against the theme phrases and the people registry.
///
/// Matching is substring-based on the normalized `title + " " + body`, so
/// CJK terms match without word boundaries.
pub fn rank(article: &ExtractedArticle, people: &[Person], themes: &[String]) -> Ranking {
    let text = normalize(&format!("{} {}", article.title, article.body));

    let mut score = THEME_WEIGHT * theme_hits(&text, themes) as f64;
    score += IMPACT_WEIGHT * IMPACT_KEYWORDS.iter().filter(|kw| text.contains(*kw)).count() as f64;

    let (person, image_source) = match match_person(&text, people) {
        Some(found) => {
            score += PERSON_WEIGHT;
            (Some(found.name.clone()), found.image_source.clone())
        }
        None => (None, None),
    };

    Ranking {
        score,
        topic: classify_topic(&text).to_string(),
        person,
        image_source,
    }
}

/// A theme counts once if any of its tokens occurs in the text.
fn theme_hits(text: &str, themes: &[String]) -> usize {
    themes
        .iter()
        .filter(|theme| normalize(theme).split_whitespace().any(|token| text.contains(token)))
        .count()
}

/// First registry entry whose name or keyword occurs in the text.
pub fn match_person<'a>(text: &str, people: &'a [Person]) -> Option<&'a Person> {
    people.iter().find(|person| {
        std::iter::once(&person.name)
            .chain(person.keywords.iter())
            .map(|term| normalize(term))
            .any(|term| !term.is_empty() && text.contains(&term))
    })
}

pub fn classify_topic(text: &str) -> &'static str {
    TOPIC_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| text.contains(m)))
        .map(|(topic, _)| *topic)
        .unwrap_or(DEFAULT_TOPIC)
}
