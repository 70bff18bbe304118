//! Item catalog records and fuzzy name ranking.

use serde::{Deserialize, Serialize};

use super::auction::ItemId;

/// Item record as stored under `sotah-items/{id}.json.gz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, rename = "itemClass")]
    pub item_class: i32,
    #[serde(default, rename = "itemSubClass")]
    pub item_sub_class: i32,
    #[serde(default, rename = "itemLevel")]
    pub item_level: i32,
    #[serde(default)]
    pub quality: i32,
}

impl Item {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Item class tree served on the `itemClasses` subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemClass {
    pub class: i32,
    pub name: String,
    #[serde(default, rename = "subclasses")]
    pub sub_classes: Vec<ItemSubClass>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSubClass {
    #[serde(rename = "subclass")]
    pub sub_class: i32,
    pub name: String,
}

/// Lowercase and keep only alphanumerics and spaces.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Rank how well `query` matches `target`.
///
/// Returns -1 when the characters of `query` do not all occur in order in
/// `target`; otherwise the Levenshtein distance between the two, so a
/// lower rank is a closer match.
pub fn fuzzy_rank(query: &str, target: &str) -> i64 {
    if !is_subsequence(query, target) {
        return -1;
    }
    i64::try_from(levenshtein(query, target)).unwrap_or(i64::MAX)
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    needle.chars().all(|n| hay.any(|h| h == n))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
