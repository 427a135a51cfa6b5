//! Heuristic intent inference over the context pack (spec §4.7 step 5).
//!
//! This is a keyword classifier, not a model call: the LLM is reserved for
//! drafting the actual reply text (step 6), so routing the handful of
//! checkout intents here keeps every `pay`/`quantity`/`select` turn free of
//! an LLM round trip entirely.

use reference_ctx::Resolution;

use crate::types::HandlerDecision;

const QUANTITY_WORDS: &[&str] = &["one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten"];
const PAYMENT_WORDS: &[&str] = &["card", "credit card", "debit card", "cash", "bank transfer", "paypal", "wallet"];

pub fn infer(utterance: &str, resolution: &Resolution) -> HandlerDecision {
    let lower = utterance.to_lowercase();

    if let Some(method) = PAYMENT_WORDS.iter().find(|w| lower.contains(**w)) {
        return HandlerDecision::SelectPaymentMethod { method: method.to_string() };
    }

    if let Some(qty) = extract_quantity(&lower) {
        return HandlerDecision::ConfirmQuantity { quantity: qty };
    }

    match resolution {
        Resolution::Ordinal(item_id) | Resolution::Demonstrative(item_id) | Resolution::Descriptive(item_id) => {
            HandlerDecision::SelectProduct { item_ref: item_id.clone() }
        }
        Resolution::NoMatch => {
            if is_browse_intent(&lower) {
                HandlerDecision::Browse { query: utterance.to_string() }
            } else {
                HandlerDecision::AskGeneric
            }
        }
    }
}

fn extract_quantity(lower: &str) -> Option<u32> {
    for token in lower.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
        if !cleaned.is_empty() {
            if let Ok(n) = cleaned.parse::<u32>() {
                if n > 0 && n < 10_000 {
                    return Some(n);
                }
            }
        }
    }
    for (i, word) in QUANTITY_WORDS.iter().enumerate() {
        if lower.contains(word) {
            return Some(i as u32 + 1);
        }
    }
    None
}

fn is_browse_intent(lower: &str) -> bool {
    const BROWSE_MARKERS: &[&str] =
        &["do you have", "looking for", "how much", "price", "available", "show me", "what about"];
    BROWSE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_payment_method() {
        let decision = infer("I'll pay by card", &Resolution::NoMatch);
        assert_eq!(decision, HandlerDecision::SelectPaymentMethod { method: "card".to_string() });
    }

    #[test]
    fn detects_numeric_quantity() {
        let decision = infer("I'll take 3 please", &Resolution::NoMatch);
        assert_eq!(decision, HandlerDecision::ConfirmQuantity { quantity: 3 });
    }

    #[test]
    fn detects_word_quantity() {
        let decision = infer("two of those", &Resolution::NoMatch);
        assert_eq!(decision, HandlerDecision::ConfirmQuantity { quantity: 2 });
    }

    #[test]
    fn resolved_reference_selects_product() {
        let decision = infer("I'll take that one", &Resolution::Demonstrative("item-1".to_string()));
        assert_eq!(decision, HandlerDecision::SelectProduct { item_ref: "item-1".to_string() });
    }

    #[test]
    fn falls_back_to_ask_generic() {
        let decision = infer("hello there", &Resolution::NoMatch);
        assert_eq!(decision, HandlerDecision::AskGeneric);
    }
}
