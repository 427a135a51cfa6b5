use serde::{Deserialize, Serialize};

/// One inbound WhatsApp message waiting to be folded into a burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstMessage {
    pub provider_message_id: String,
    pub text: String,
    pub received_at: String,
}

/// The result of flushing a burst buffer: every message received inside the
/// harmonization window, in arrival order, ready for the orchestrator to
/// treat as a single customer turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonizedBurst {
    pub conversation_id: String,
    pub messages: Vec<BurstMessage>,
}

impl HarmonizedBurst {
    /// Concatenates message bodies in arrival order, separated by newlines —
    /// the shape the orchestrator treats as one logical customer utterance.
    pub fn combined_text(&self) -> String {
        self.messages.iter().map(|m| m.text.as_str()).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_text_joins_in_order() {
        let burst = HarmonizedBurst {
            conversation_id: "c1".to_string(),
            messages: vec![
                BurstMessage {
                    provider_message_id: "m1".into(),
                    text: "hi".into(),
                    received_at: "t1".into(),
                },
                BurstMessage {
                    provider_message_id: "m2".into(),
                    text: "how much for the blue one".into(),
                    received_at: "t2".into(),
                },
            ],
        };
        assert_eq!(burst.combined_text(), "hi\nhow much for the blue one");
    }
}
