//! Rule-based entity recognition used without a generator, and as the
//! baseline a generator's extraction is merged over.
//!
//! Two passes per sentence: a glossary of tools and technologies matched
//! case-insensitively, then runs of capitalized words (people, places,
//! organizations, projects). Names are deduplicated case-insensitively with
//! the first sighting winning.

/// Characters of input examined.
const MAX_TEXT_CHARS: usize = 1000;
/// Longest capitalized run kept as one name.
const MAX_RUN_WORDS: usize = 4;
/// Entities per sentence that get co-occurrence relations.
const MAX_LINKED_PER_SENTENCE: usize = 4;

pub const NER_CONFIDENCE: f64 = 0.85;
pub const NER_IMPORTANCE: f64 = 0.7;

const TOOL_TERMS: &[&str] = &[
    "rust", "python", "javascript", "typescript", "golang", "java", "kotlin", "swift", "ruby",
    "php", "scala", "elixir", "haskell", "zig", "react", "vue", "angular", "svelte", "tauri",
    "electron", "flutter", "docker", "kubernetes", "terraform", "github", "gitlab", "jira",
    "redis", "postgres", "postgresql", "mysql", "mongodb", "sqlite", "kafka", "graphql",
    "nginx", "aws", "gcp", "azure", "linux", "ubuntu", "macos", "windows", "openai",
    "gemini", "ollama", "llama", "mistral", "git", "npm", "cargo", "vscode", "neovim", "vim",
    "emacs", "notion", "figma", "slack", "excel",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "was", "are", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "can", "it", "its",
    "this", "that", "these", "those", "i", "i'm", "i've", "i'd", "i'll", "we", "you", "he",
    "she", "they", "my", "our", "your", "his", "her", "their", "what", "which", "who", "how",
    "when", "where", "why", "if", "for", "but", "and", "or", "not", "no", "so", "just",
    "about", "with", "from", "into", "to", "of", "in", "on", "at", "by", "up", "out",
];

/// Capitalized only because they open a sentence.
const SENTENCE_OPENERS: &[&str] = &[
    "yesterday", "today", "tomorrow", "tonight", "hello", "hi", "hey", "thanks", "thank",
    "please", "yes", "yeah", "also", "maybe", "then", "now", "let", "let's", "sure", "okay",
    "ok", "well", "actually", "last", "next", "every", "some", "any", "all", "after", "before",
    "since", "because", "there", "here", "remember", "can't", "don't", "monday", "tuesday",
    "wednesday", "thursday", "friday", "saturday", "sunday",
];

const PERSON_TITLES: &[&str] = &["mr", "mrs", "ms", "dr", "prof", "sir"];
const PLACE_CUES: &[&str] = &["in", "at", "from", "to", "near", "visited", "visit"];
const ORG_SUFFIXES: &[&str] = &[
    "inc", "corp", "labs", "ltd", "llc", "university", "company", "group", "foundation",
];
const NAME_CONNECTORS: &[&str] = &["of", "de", "van", "von", "di", "da"];

/// An entity found by [`NerExtractor::extract`].
#[derive(Debug, Clone, PartialEq)]
pub struct NerEntity {
    pub name: String,
    pub entity_type: String,
    pub confidence: f64,
    pub importance: f64,
    /// Index of the sentence the name was first seen in.
    pub sentence: usize,
}

/// Heuristic named-entity recognizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NerExtractor;

impl NerExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> Vec<NerEntity> {
        let text: String = text.chars().take(MAX_TEXT_CHARS).collect();
        let mut found: Vec<NerEntity> = Vec::new();
        for (sentence, words) in sentences(&text).into_iter().enumerate() {
            tool_terms(&words, sentence, &mut found);
            capitalized_runs(&words, sentence, &mut found);
        }
        found
    }

    /// Name pairs that share a sentence, capped per sentence, in first-seen order.
    pub fn cooccurrences(entities: &[NerEntity]) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let Some(last) = entities.iter().map(|e| e.sentence).max() else {
            return pairs;
        };
        for sentence in 0..=last {
            let names: Vec<&str> = entities
                .iter()
                .filter(|e| e.sentence == sentence)
                .take(MAX_LINKED_PER_SENTENCE)
                .map(|e| e.name.as_str())
                .collect();
            for (i, a) in names.iter().enumerate() {
                for b in &names[i + 1..] {
                    pairs.push((a.to_string(), b.to_string()));
                }
            }
        }
        pairs
    }
}

fn sentences(text: &str) -> Vec<Vec<&str>> {
    text.split(['.', '!', '?', '\n', ';'])
        .map(|s| s.split_whitespace().collect::<Vec<_>>())
        .filter(|words| !words.is_empty())
        .collect()
}

fn clean(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
}

fn push(found: &mut Vec<NerEntity>, name: String, entity_type: &str, sentence: usize) {
    if found.iter().any(|e| e.name.to_lowercase() == name.to_lowercase()) {
        return;
    }
    found.push(NerEntity {
        name,
        entity_type: entity_type.to_string(),
        confidence: NER_CONFIDENCE,
        importance: NER_IMPORTANCE,
        sentence,
    });
}

fn tool_terms(words: &[&str], sentence: usize, found: &mut Vec<NerEntity>) {
    for word in words {
        let word = clean(word);
        if TOOL_TERMS.contains(&word.to_lowercase().as_str()) {
            push(found, word.to_string(), "tool", sentence);
        }
    }
}

fn capitalized_runs(words: &[&str], sentence: usize, found: &mut Vec<NerEntity>) {
    let mut i = 0;
    while i < words.len() {
        let first = clean(words[i]);
        let is_title = PERSON_TITLES.contains(&first.to_lowercase().as_str());
        if is_title || !is_name_word(first) || (i == 0 && is_opener(first)) {
            i += 1;
            continue;
        }
        // "Planning a trip..." style openers.
        if i == 0 && first.chars().count() > 5 && first.ends_with("ing") {
            i += 1;
            continue;
        }

        let mut run = vec![first];
        let mut j = i + 1;
        while j < words.len() && run.len() < MAX_RUN_WORDS {
            // A trailing comma or similar ends the run at this word.
            let ends_here = words[j - 1].ends_with([',', ':', ')', '"']);
            let next = clean(words[j]);
            if ends_here {
                break;
            }
            if is_name_word(next) {
                run.push(next);
            } else if NAME_CONNECTORS.contains(&next)
                && j + 1 < words.len()
                && is_name_word(clean(words[j + 1]))
            {
                run.push(next);
            } else {
                break;
            }
            j += 1;
        }

        let previous = (i > 0).then(|| clean(words[i - 1]).to_lowercase());
        let entity_type = classify(&run, previous.as_deref());
        push(found, run.join(" "), entity_type, sentence);
        i = j;
    }
}

fn is_name_word(word: &str) -> bool {
    let Some(first) = word.chars().next() else {
        return false;
    };
    first.is_uppercase()
        && word.chars().count() > 1
        && !STOP_WORDS.contains(&word.to_lowercase().as_str())
}

fn is_opener(word: &str) -> bool {
    SENTENCE_OPENERS.contains(&word.to_lowercase().as_str())
}

fn classify(run: &[&str], previous: Option<&str>) -> &'static str {
    let last = run.last().map(|w| w.to_lowercase()).unwrap_or_default();
    let shaped_like_tool = run.len() == 1
        && run[0].chars().skip(1).any(|c| c.is_uppercase() || c.is_ascii_digit());
    match previous {
        Some(p) if PERSON_TITLES.contains(&p) => "person",
        _ if ORG_SUFFIXES.contains(&last.as_str()) => "project",
        _ if shaped_like_tool => "tool",
        Some(p) if PLACE_CUES.contains(&p) => "place",
        _ if run.len() >= 2 => "person",
        _ => recall_types::graph::GENERIC_ENTITY_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(text: &str) -> Vec<(String, String)> {
        NerExtractor::new()
            .extract(text)
            .into_iter()
            .map(|e| (e.name, e.entity_type))
            .collect()
    }

    #[test]
    fn test_tools_and_names() {
        let found = names("Mark writes Rust every day with Jane Doe.");
        assert_eq!(
            found,
            vec![
                ("Rust".to_string(), "tool".to_string()),
                ("Mark".to_string(), "concept".to_string()),
                ("Jane Doe".to_string(), "person".to_string()),
            ]
        );
    }

    #[test]
    fn test_openers_and_pronouns_skipped() {
        assert!(names("Yesterday I went for a walk").is_empty());
        assert!(names("I am learning to brew pour-over coffee").is_empty());
        assert!(names("hello there, how are you").is_empty());
        assert_eq!(
            names("Planning a trip to Lisbon"),
            vec![("Lisbon".to_string(), "place".to_string())]
        );
    }

    #[test]
    fn test_context_cues_pick_types() {
        let found = names("I moved to Seoul. Dr Kim works at Acme Labs on PostgreSQL tuning.");
        assert!(found.contains(&("Seoul".into(), "place".into())));
        assert!(found.contains(&("Kim".into(), "person".into())));
        assert!(found.contains(&("Acme Labs".into(), "project".into())));
        assert!(found.contains(&("PostgreSQL".into(), "tool".into())));
    }

    #[test]
    fn test_names_dedup_case_insensitive() {
        let found = NerExtractor::new().extract("Docker is great. I run docker daily. DOCKER!");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence, NER_CONFIDENCE);
        assert_eq!(found[0].importance, NER_IMPORTANCE);
    }

    #[test]
    fn test_cooccurrences_within_sentence() {
        let found = NerExtractor::new().extract("Mark uses Rust and Docker. Seoul is far.");
        let pairs = NerExtractor::cooccurrences(&found);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("Rust".into(), "Docker".into())));
        assert!(!pairs.iter().any(|(a, b)| a == "Seoul" || b == "Seoul"));
    }
}
