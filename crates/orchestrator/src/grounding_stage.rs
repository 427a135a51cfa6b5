//! Extracts factual claims from a drafted reply, validates them against the
//! catalog, strips disclaimer/echo phrases, and enforces the hard limits on
//! sentence count and list length (spec §4.6). `grounding::GroundingValidator`
//! only judges one already-built `Claim`; this module is what builds those
//! claims out of free text and rewrites the draft around the verdicts.

use grounding::{CatalogItem, Claim, GroundingValidator, GroundingVerdict};

const MAX_SENTENCES: usize = 6;
const MAX_LIST_ITEMS: usize = 5;

const DISCLAIMER_PHRASES: &[&str] = &[
    "as an ai",
    "i cannot guarantee",
    "please note that i might be wrong",
    "i'm just a bot",
];

const DEFERRAL: &str = "Let me check on that and get back to you.";

pub struct GroundingOutcome {
    pub text: String,
    pub log: Vec<(String, String)>,
}

/// Runs the full validation/rewrite pass over one drafted response.
pub fn validate_and_rewrite(
    validator: &GroundingValidator,
    tenant_id: &str,
    customer_utterance: &str,
    catalog_matches: &[CatalogItem],
    draft: &str,
) -> GroundingOutcome {
    let mut log = Vec::new();
    let lower_utterance = customer_utterance.to_lowercase();

    let mut sentences: Vec<String> = split_sentences(draft);
    let mut kept = Vec::with_capacity(sentences.len());

    for sentence in sentences.drain(..) {
        let lower = sentence.to_lowercase();

        if DISCLAIMER_PHRASES.iter().any(|p| lower.contains(p)) {
            log.push(("disclaimer_removed".to_string(), sentence.clone()));
            continue;
        }

        if sentence.trim().len() > 12 && lower_utterance.contains(lower.trim()) {
            log.push(("echo_removed".to_string(), sentence.clone()));
            continue;
        }

        match judge_sentence(validator, tenant_id, catalog_matches, &sentence) {
            Some(GroundingVerdict::Contradicted { catalog_value }) => {
                log.push(("claim_contradicted".to_string(), format!("{sentence} (catalog: {catalog_value})")));
                continue;
            }
            Some(GroundingVerdict::NoMatchingItem) => {
                log.push(("claim_unverifiable".to_string(), sentence.clone()));
                continue;
            }
            _ => {}
        }

        kept.push(sentence);
    }

    if kept.is_empty() {
        kept.push(DEFERRAL.to_string());
        log.push(("deferral_substituted".to_string(), String::new()));
    }

    if kept.len() > MAX_SENTENCES {
        log.push(("sentence_limit_enforced".to_string(), format!("{} -> {}", kept.len(), MAX_SENTENCES)));
        kept.truncate(MAX_SENTENCES);
    }

    let mut text = kept.join(" ");
    text = truncate_list_items(&text, &mut log);

    GroundingOutcome { text, log }
}

fn split_sentences(draft: &str) -> Vec<String> {
    draft
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Tries, in order, a price claim (item name + "$amount" in the same
/// sentence) then an availability claim (item name + a stock keyword).
/// Returns `None` when the sentence makes no claim this pass recognizes.
fn judge_sentence(
    validator: &GroundingValidator,
    tenant_id: &str,
    catalog_matches: &[CatalogItem],
    sentence: &str,
) -> Option<GroundingVerdict> {
    let lower = sentence.to_lowercase();
    let item = catalog_matches.iter().find(|i| lower.contains(&i.name.to_lowercase()))?;

    if let Some(cents) = extract_price_cents(sentence) {
        let claim = Claim::Price { item_name: item.name.clone(), claimed_cents: cents };
        return validator.validate_claim(tenant_id, &claim).ok();
    }

    if lower.contains("out of stock") || lower.contains("sold out") {
        let claim = Claim::Availability { item_name: item.name.clone(), claimed_in_stock: false };
        return validator.validate_claim(tenant_id, &claim).ok();
    }
    if lower.contains("in stock") || lower.contains("available") {
        let claim = Claim::Availability { item_name: item.name.clone(), claimed_in_stock: true };
        return validator.validate_claim(tenant_id, &claim).ok();
    }

    None
}

/// Parses the first `$123.45`-shaped amount in `text` into integer cents.
fn extract_price_cents(text: &str) -> Option<i64> {
    let dollar_idx = text.find('$')?;
    let rest = &text[dollar_idx + 1..];
    let number: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    let cleaned: String = number.chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    Some((value * 100.0).round() as i64)
}

/// Caps a `- item` / `1. item` style list to `MAX_LIST_ITEMS` lines.
fn truncate_list_items(text: &str, log: &mut Vec<(String, String)>) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let list_line_count = lines
        .iter()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("- ") || t.starts_with(|c: char| c.is_ascii_digit())
        })
        .count();
    if list_line_count <= MAX_LIST_ITEMS {
        return text.to_string();
    }

    log.push(("list_truncated".to_string(), format!("{list_line_count} -> {MAX_LIST_ITEMS}")));
    let mut out = Vec::new();
    let mut seen = 0;
    for line in lines {
        let t = line.trim_start();
        let is_list_item = t.starts_with("- ") || t.starts_with(|c: char| c.is_ascii_digit());
        if is_list_item {
            if seen >= MAX_LIST_ITEMS {
                continue;
            }
            seen += 1;
        }
        out.push(line);
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn validator() -> GroundingValidator {
        let conn = Connection::open_in_memory().unwrap();
        grounding::db::init_db(&conn).unwrap();
        GroundingValidator::new(conn)
    }

    fn item(name: &str, price_cents: i64, in_stock: bool) -> CatalogItem {
        CatalogItem {
            id: 1,
            tenant_id: "t1".into(),
            sku: "sku-1".into(),
            name: name.into(),
            description: String::new(),
            price_cents,
            currency: "USD".into(),
            in_stock,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn strips_contradicted_price_claim() {
        let v = validator();
        v.upsert_item("t1", "sku-1", "Blue Jacket", "warm", 4999, "USD", true).unwrap();
        let matches = vec![item("Blue Jacket", 4999, true)];
        let out = validate_and_rewrite(&v, "t1", "how much is the jacket", &matches, "The Blue Jacket is $10.00. It looks great on you.");
        assert!(!out.text.contains("$10.00"));
        assert!(out.log.iter().any(|(k, _)| k == "claim_contradicted"));
    }

    #[test]
    fn keeps_grounded_claim() {
        let v = validator();
        v.upsert_item("t1", "sku-1", "Blue Jacket", "warm", 4999, "USD", true).unwrap();
        let matches = vec![item("Blue Jacket", 4999, true)];
        let out = validate_and_rewrite(&v, "t1", "how much", &matches, "The Blue Jacket is $49.99.");
        assert!(out.text.contains("$49.99"));
    }

    #[test]
    fn removes_disclaimer_phrase() {
        let v = validator();
        let out = validate_and_rewrite(&v, "t1", "hi", &[], "As an AI, I can help. Sure, here's the price: $5.00.");
        assert!(!out.text.to_lowercase().contains("as an ai"));
    }

    #[test]
    fn falls_back_to_deferral_when_everything_stripped() {
        let v = validator();
        v.upsert_item("t1", "sku-1", "Blue Jacket", "warm", 4999, "USD", true).unwrap();
        let matches = vec![item("Blue Jacket", 4999, true)];
        let out = validate_and_rewrite(&v, "t1", "x", &matches, "The Blue Jacket is $1.00.");
        assert_eq!(out.text, DEFERRAL);
    }
}
