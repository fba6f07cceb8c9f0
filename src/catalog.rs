use rand::{rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic labels offered to the question provider.
pub(crate) const GRAMMAR_CATEGORIES: [&str; 8] = [
    "定语从句 (Attributive Clause)",
    "状语从句 (Adverbial Clause)",
    "非谓语动词 (Non-finite Verbs)",
    "名词性从句 (Noun Clause)",
    "独立主格 (Absolute Construction)",
    "虚拟语气 (Subjunctive Mood)",
    "连词辨析 (Conjunctions)",
    "时态语态 (Tenses & Voices)",
];

pub(crate) const ENCOURAGING_WORDS: [&str; 5] = [
    "太棒了！你的语法感越来越好了！",
    "继续加油，离语法大师又近了一步！",
    "稳扎稳打，你是最棒的！",
    "坚持就是胜利，汤小米为你点赞！",
    "不错哦，这个知识点你掌握得很牢固！",
];

/// Difficulty level as understood by the provider. The wire form is the localized label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "初级", alias = "beginner", alias = "BEGINNER")]
    Beginner,
    #[default]
    #[serde(rename = "中级", alias = "intermediate", alias = "INTERMEDIATE")]
    Intermediate,
    #[serde(rename = "高级", alias = "advanced", alias = "ADVANCED")]
    Advanced,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Self::Beginner => "初级",
            Self::Intermediate => "中级",
            Self::Advanced => "高级",
        }
    }

    pub fn english_name(self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Beginner => Self::Intermediate,
            Self::Intermediate => Self::Advanced,
            Self::Advanced => Self::Beginner,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Self::Beginner => Self::Advanced,
            Self::Intermediate => Self::Beginner,
            Self::Advanced => Self::Intermediate,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.english_name())
    }
}

/// Category label at `index`, falling back to the first entry.
pub(crate) fn category_at(index: usize) -> &'static str {
    GRAMMAR_CATEGORIES
        .get(index)
        .copied()
        .unwrap_or(GRAMMAR_CATEGORIES[0])
}

/// Position of `category` in [`GRAMMAR_CATEGORIES`]; free-form labels are not listed.
pub(crate) fn category_index(category: &str) -> Option<usize> {
    GRAMMAR_CATEGORIES.iter().position(|entry| *entry == category)
}

/// Cycle through the fixed category list. Unknown labels restart at the first entry.
pub(crate) fn cycle_category(current: &str, forward: bool) -> &'static str {
    let len = GRAMMAR_CATEGORIES.len();
    let next = match (category_index(current), forward) {
        (Some(index), true) => (index + 1) % len,
        (Some(index), false) => (index + len - 1) % len,
        (None, _) => 0,
    };
    GRAMMAR_CATEGORIES[next]
}

pub(crate) fn random_encouragement() -> &'static str {
    ENCOURAGING_WORDS
        .choose(&mut rng())
        .copied()
        .unwrap_or(ENCOURAGING_WORDS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_uses_localized_labels_on_the_wire() {
        let encoded = serde_json::to_string(&Difficulty::Advanced).unwrap();
        assert_eq!(encoded, "\"高级\"");

        let decoded: Difficulty = serde_json::from_str("\"初级\"").unwrap();
        assert_eq!(decoded, Difficulty::Beginner);

        let alias: Difficulty = serde_json::from_str("\"INTERMEDIATE\"").unwrap();
        assert_eq!(alias, Difficulty::Intermediate);
    }

    #[test]
    fn difficulty_cycles_in_both_directions() {
        for difficulty in [
            Difficulty::Beginner,
            Difficulty::Intermediate,
            Difficulty::Advanced,
        ] {
            assert_eq!(difficulty.next().previous(), difficulty);
        }
        assert_eq!(Difficulty::Advanced.next(), Difficulty::Beginner);
    }

    #[test]
    fn category_cycling_wraps_and_recovers_from_unknown_labels() {
        let last = GRAMMAR_CATEGORIES[GRAMMAR_CATEGORIES.len() - 1];
        assert_eq!(cycle_category(last, true), GRAMMAR_CATEGORIES[0]);
        assert_eq!(cycle_category(GRAMMAR_CATEGORIES[0], false), last);
        assert_eq!(cycle_category("Phrasal verbs", true), GRAMMAR_CATEGORIES[0]);
        assert_eq!(category_at(99), GRAMMAR_CATEGORIES[0]);
    }

    #[test]
    fn encouragement_comes_from_the_fixed_list() {
        let word = random_encouragement();
        assert!(ENCOURAGING_WORDS.contains(&word));
    }
}
