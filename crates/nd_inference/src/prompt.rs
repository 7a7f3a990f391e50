use nd_core::{Article, Preference, ScoringRequest, SourceCatalog, MAX_SCORE};
use serde_json::json;

const RUBRIC: &str = "\
Scoring guide. Most articles should land between 1 and 5:
0 = nothing to do with the reader's interests
1 = touches a neighbouring topic, not what the reader wants
2 = same broad area, but unfocused
3 = related topic, generic or shallow coverage
4 = relevant topic with a few useful details
5 = clearly relevant, information the reader would value
6 = highly relevant, substantial and specific
7 = very strong match, goes deep on the reader's core interests
8 = exceptional, a must-read for this reader
9 = perfect match, kept for the rare article that is exactly what the reader wants

A 5 already means a good match. Scores above 6 should be uncommon and 8-9 reserved for outstanding pieces.";

const EXAMPLES: &[(&str, &str, u8)] = &[
    ("Global economy, stock markets", "S&P 500 hits record high amid tech rally", 6),
    ("Global economy, stock markets", "Central bank raises rates, economists debate recession risk", 7),
    ("Global economy, stock markets", "Oil prices rise slightly on supply concerns", 3),
    ("Local politics, national news", "Parliament passes new education reform", 5),
    ("Local politics, national news", "Celebrity chef opens new restaurant in capital", 1),
];

/// JSON schema of the expected answer, sent as a strict response format.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "2-3 sentence summary adding information not already in the title"
            },
            "score": {
                "type": "integer",
                "minimum": 0,
                "maximum": MAX_SCORE,
                "description": "Relevance score from 0 to 9"
            }
        },
        "required": ["summary", "score"],
        "additionalProperties": false
    })
}

fn system_prompt(language: &str) -> String {
    let mut prompt = format!(
        "You are a strict relevance scorer and summarizer. You get a reader's interests and one article.\n\
         The summary MUST be written entirely in {language}. Every word of it must be {language}, \
         whatever the language of the article.\n\
         Write 2-3 sentences with the most important information of the article. \
         Focus on what the title does not already say and do not repeat the title.\n\
         Then rate from 0 to {max} how useful the article is to this reader.\n\n\
         {rubric}\n\nExamples:\n",
        language = language,
        max = MAX_SCORE,
        rubric = RUBRIC,
    );
    for (interest, title, score) in EXAMPLES {
        prompt.push_str(&format!(
            "Interest: '{}'\nTitle: '{}'\nScore: {}\n\n",
            interest, title, score
        ));
    }
    prompt.truncate(prompt.trim_end().len());
    prompt
}

fn user_prompt(preference: &Preference, article: &Article) -> String {
    format!(
        "Reader interest: '{}'\n\nTitle: {}\n\nText: {}",
        preference.text, article.title, article.text
    )
}

/// Build the scoring request for an article, or `None` when its site has
/// no reader preference.
pub fn build_request(catalog: &dyn SourceCatalog, article: &Article) -> Option<ScoringRequest> {
    let preference = catalog.preference_for(&article.site_name)?;
    Some(ScoringRequest {
        system: system_prompt(&preference.language),
        user: user_prompt(&preference, article),
        interest: preference.text.clone(),
        language: preference.language.clone(),
        schema: response_schema(),
    })
}
