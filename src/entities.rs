use std::collections::HashSet;

/// Extracts a set of normalized entity strings from free Latin-script
/// text.
///
/// Four independent passes feed the set:
/// 1. runs of two or more consecutive capitalized words, joined into one
///    compound ("White House" -> `white_house`);
/// 2. single capitalized words of three or more letters that are not at
///    a sentence start;
/// 3. ALL-CAPS acronyms of two to six letters;
/// 4. a capitalized word immediately followed by a 2-4 digit number
///    ("Euro 2024" -> `euro_2024`).
///
/// Sentence boundaries are `.`, `!`, or `?` followed by whitespace, and
/// the first word of the text counts as sentence-initial. The heuristic
/// trades recall for precision: downstream consumers require several
/// shared entities, which filters generic capitalized words.
pub fn extract_entities(text: &str) -> HashSet<String> {
    let mut entities = HashSet::new();
    if text.trim().is_empty() {
        return entities;
    }

    let words: Vec<Word> = text
        .split_whitespace()
        .map(Word::parse)
        .filter(|w| !w.core.is_empty())
        .collect();

    let mut sentence_start = true;
    let mut compound: Vec<&str> = Vec::new();

    for (idx, word) in words.iter().enumerate() {
        if word.is_capitalized() {
            compound.push(&word.core);
        } else {
            flush_compound(&mut compound, &mut entities);
        }

        if word.is_capitalized() && !sentence_start && word.core.chars().count() >= 3 {
            entities.insert(word.core.to_lowercase());
        }

        if word.is_acronym() {
            entities.insert(word.core.to_lowercase());
        }

        if word.is_capitalized() {
            if let Some(next) = words.get(idx + 1) {
                if next.is_short_number() {
                    entities.insert(format!("{}_{}", word.core.to_lowercase(), next.core));
                }
            }
        }

        // Trailing sentence punctuation both ends the current compound
        // and marks the next word as sentence-initial.
        if word.ends_sentence {
            flush_compound(&mut compound, &mut entities);
        }
        sentence_start = word.ends_sentence;
    }
    flush_compound(&mut compound, &mut entities);

    entities
}

fn flush_compound(compound: &mut Vec<&str>, entities: &mut HashSet<String>) {
    if compound.len() >= 2 {
        let joined = compound
            .iter()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join("_");
        entities.insert(joined);
    }
    compound.clear();
}

struct Word {
    core: String,
    ends_sentence: bool,
}

impl Word {
    fn parse(raw: &str) -> Self {
        let ends_sentence = raw
            .trim_end_matches(|c: char| c == '"' || c == '\'' || c == ')' || c == ']')
            .ends_with(['.', '!', '?']);
        let core: String = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_string();
        Self {
            core,
            ends_sentence,
        }
    }

    /// First letter uppercase, remainder lowercase letters.
    fn is_capitalized(&self) -> bool {
        let mut chars = self.core.chars();
        match chars.next() {
            Some(first) if first.is_uppercase() => {
                let mut any = false;
                for c in chars {
                    if !c.is_lowercase() {
                        return false;
                    }
                    any = true;
                }
                any
            }
            _ => false,
        }
    }

    /// Two to six letters, all uppercase.
    fn is_acronym(&self) -> bool {
        let len = self.core.chars().count();
        (2..=6).contains(&len) && self.core.chars().all(|c| c.is_uppercase())
    }

    /// A bare 2-4 digit number, as found in named years and events.
    fn is_short_number(&self) -> bool {
        let len = self.core.chars().count();
        (2..=4).contains(&len) && self.core.chars().all(|c| c.is_ascii_digit())
    }
}
