use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::Result;
use crate::types::{MentionedItem, ReferenceContext, Resolution};

const CACHE_TTL_SECS: i64 = 600;
const MAX_CACHE_ENTRIES: usize = 256;

const ORDINAL_WORDS: &[(&str, u32)] =
    &[("first", 1), ("second", 2), ("third", 3), ("fourth", 4), ("fifth", 5)];

/// Tracks, per conversation, the list of catalog items the agent most
/// recently presented, so the next customer message's pronouns and
/// ordinals ("the second one", "that one", "#2") resolve to a concrete
/// item instead of forcing another round of clarifying questions
/// (spec §4.5).
///
/// The in-memory cache mirrors `skynet-memory::MemoryManager`'s
/// TTL-capped `HashMap` — entries expire after 10 minutes and the cache
/// evicts its oldest half when full, rather than reaching for an external
/// LRU crate for a structure this small.
pub struct ReferenceContextManager {
    db: Arc<Mutex<Connection>>,
    cache: Mutex<HashMap<String, ReferenceContext>>,
}

impl ReferenceContextManager {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db, cache: Mutex::new(HashMap::new()) }
    }

    /// Replace the mentioned-item list for a conversation, e.g. after the
    /// agent presents a catalog search result.
    pub fn set_mentions(&self, conversation_id: &str, items: Vec<MentionedItem>) -> Result<()> {
        let ctx = ReferenceContext {
            conversation_id: conversation_id.to_string(),
            items,
            built_at: chrono::Utc::now(),
        };

        let items_json = serde_json::to_string(&ctx.items).unwrap_or_default();
        {
            let conn = self.db.lock().unwrap();
            crate::db::persist(&conn, conversation_id, &items_json, &ctx.built_at.to_rfc3339())?;
        }

        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= MAX_CACHE_ENTRIES && !cache.contains_key(conversation_id) {
            let stale: Vec<String> = {
                let mut entries: Vec<_> = cache.iter().collect();
                entries.sort_by_key(|(_, v)| v.built_at);
                entries.iter().take(MAX_CACHE_ENTRIES / 2).map(|(k, _)| (*k).clone()).collect()
            };
            for k in stale {
                cache.remove(&k);
            }
        }
        cache.insert(conversation_id.to_string(), ctx);
        Ok(())
    }

    /// Resolve a customer utterance's deictic reference against the most
    /// recently mentioned items for this conversation.
    ///
    /// Tries, in order: ordinal word or "#N" position, a bare demonstrative
    /// ("that one"/"this one") against a single remaining candidate, then a
    /// descriptive word-overlap match against item labels.
    pub fn resolve(&self, conversation_id: &str, utterance: &str) -> Resolution {
        let Some(ctx) = self.get_live(conversation_id) else {
            return Resolution::NoMatch;
        };
        let lower = utterance.to_lowercase();

        if let Some(item) = resolve_ordinal(&lower, &ctx.items) {
            return Resolution::Ordinal(item.item_id.clone());
        }

        if (lower.contains("that one") || lower.contains("this one") || lower == "that" || lower == "this")
            && ctx.items.len() == 1
        {
            return Resolution::Demonstrative(ctx.items[0].item_id.clone());
        }

        if let Some(item) = resolve_descriptive(&lower, &ctx.items) {
            return Resolution::Descriptive(item.item_id.clone());
        }

        Resolution::NoMatch
    }

    fn get_live(&self, conversation_id: &str) -> Option<ReferenceContext> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(ctx) = cache.get(conversation_id) {
            let age = chrono::Utc::now().signed_duration_since(ctx.built_at).num_seconds();
            if age < CACHE_TTL_SECS {
                return Some(ctx.clone());
            }
            cache.remove(conversation_id);
        }
        None
    }
}

fn resolve_ordinal<'a>(lower: &str, items: &'a [MentionedItem]) -> Option<&'a MentionedItem> {
    for (word, n) in ORDINAL_WORDS {
        if lower.contains(word) {
            return items.iter().find(|i| i.position == *n);
        }
    }
    if let Some(pos) = lower.find('#') {
        let rest = &lower[pos + 1..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse::<u32>() {
            return items.iter().find(|i| i.position == n);
        }
    }
    None
}

fn resolve_descriptive<'a>(lower: &str, items: &'a [MentionedItem]) -> Option<&'a MentionedItem> {
    let words: Vec<&str> = lower.split_whitespace().filter(|w| w.len() > 2).collect();
    if words.is_empty() {
        return None;
    }
    items
        .iter()
        .filter(|item| {
            let label_lower = item.label.to_lowercase();
            words.iter().any(|w| label_lower.contains(w))
        })
        .max_by_key(|item| {
            let label_lower = item.label.to_lowercase();
            words.iter().filter(|w| label_lower.contains(*w)).count()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ReferenceContextManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        ReferenceContextManager::new(Arc::new(Mutex::new(conn)))
    }

    fn item(id: &str, label: &str, pos: u32) -> MentionedItem {
        MentionedItem { item_id: id.to_string(), label: label.to_string(), position: pos }
    }

    #[test]
    fn resolves_ordinal_word() {
        let m = manager();
        m.set_mentions(
            "c1",
            vec![item("i1", "Red Jacket", 1), item("i2", "Blue Jacket", 2)],
        )
        .unwrap();
        assert_eq!(m.resolve("c1", "I'll take the second one"), Resolution::Ordinal("i2".to_string()));
    }

    #[test]
    fn resolves_hash_position() {
        let m = manager();
        m.set_mentions("c1", vec![item("i1", "Red Jacket", 1), item("i2", "Blue Jacket", 2)]).unwrap();
        assert_eq!(m.resolve("c1", "give me #1"), Resolution::Ordinal("i1".to_string()));
    }

    #[test]
    fn resolves_demonstrative_single_candidate() {
        let m = manager();
        m.set_mentions("c1", vec![item("i1", "Red Jacket", 1)]).unwrap();
        assert_eq!(m.resolve("c1", "I want that one"), Resolution::Demonstrative("i1".to_string()));
    }

    #[test]
    fn resolves_descriptive_match() {
        let m = manager();
        m.set_mentions("c1", vec![item("i1", "Red Jacket", 1), item("i2", "Blue Jacket", 2)]).unwrap();
        assert_eq!(m.resolve("c1", "the blue jacket please"), Resolution::Descriptive("i2".to_string()));
    }

    #[test]
    fn no_match_without_context() {
        let m = manager();
        assert_eq!(m.resolve("unknown", "the second one"), Resolution::NoMatch);
    }
}
