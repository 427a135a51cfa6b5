use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::error::{CampaignError, Result};
use crate::stats;
use crate::types::{
    Campaign, CampaignReport, CampaignStatus, CampaignVariant, ExecutionSummary, TargetingCriteria, VariantReport,
};
use messaging::{Customer, DispatchOutcome, DispatchRequest, MessagingDispatcher};
use platform_core::types::{MessageType, QuietHours, SubscriptionTier};

/// Default significance threshold for the winner declaration (spec §4.10 step 4).
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

fn partition_variants(mut audience: Vec<Customer>, variants: &[CampaignVariant], is_ab_test: bool) -> Vec<(Customer, CampaignVariant)> {
    if variants.is_empty() {
        return Vec::new();
    }
    if !is_ab_test {
        let variant = variants[0].clone();
        return audience.into_iter().map(|c| (c, variant.clone())).collect();
    }
    audience.shuffle(&mut rand::thread_rng());
    audience
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, variants[i % variants.len()].clone()))
        .collect()
}

pub struct CampaignEngine {
    conn: Arc<Mutex<Connection>>,
    dispatcher: Arc<MessagingDispatcher>,
}

impl CampaignEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, dispatcher: Arc<MessagingDispatcher>) -> Result<Self> {
        {
            let c = conn.lock().unwrap();
            db::init_db(&c)?;
        }
        Ok(Self { conn, dispatcher })
    }

    /// Creation validates the tenant's tier permits the requested variant
    /// count (spec §4.10).
    pub fn create_campaign(
        &self,
        tenant_id: &str,
        name: &str,
        criteria: TargetingCriteria,
        variants: Vec<CampaignVariant>,
        is_ab_test: bool,
        tier: SubscriptionTier,
    ) -> Result<Campaign> {
        if is_ab_test {
            let max = tier.max_campaign_variants();
            if variants.len() as u32 > max {
                return Err(CampaignError::TooManyVariants { requested: variants.len() as u32, max });
            }
        }
        let conn = self.conn.lock().unwrap();
        db::create_campaign(&conn, tenant_id, name, &criteria, &variants, is_ab_test)
    }

    pub fn tag_customer(&self, tenant_id: &str, customer_id: &str, tag: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        db::add_customer_tag(&conn, tenant_id, customer_id, tag)
    }

    /// Computes the audience, partitions it across variants when
    /// `is_ab_test`, and dispatches to each assigned customer, accumulating
    /// `{targeted, delivered, failed, skipped_no_consent}` (spec §4.10 steps
    /// 1-3).
    pub async fn execute(
        &self,
        campaign_id: &str,
        tier: SubscriptionTier,
        quiet_hours: Option<QuietHours>,
        minute_of_day: u16,
    ) -> Result<ExecutionSummary> {
        let campaign = {
            let conn = self.conn.lock().unwrap();
            db::get_campaign(&conn, campaign_id)?.ok_or_else(|| CampaignError::NotFound(campaign_id.to_string()))?
        };
        if !matches!(campaign.status, CampaignStatus::Draft | CampaignStatus::Scheduled) {
            return Err(CampaignError::NotDraft(campaign_id.to_string()));
        }

        {
            let conn = self.conn.lock().unwrap();
            db::set_status(&conn, campaign_id, CampaignStatus::Sending)?;
        }

        let audience = {
            let conn = self.conn.lock().unwrap();
            db::compute_audience(&conn, &campaign.tenant_id, &campaign.criteria)?
        };
        let assignments = partition_variants(audience, &campaign.variants, campaign.is_ab_test);

        let mut summary = ExecutionSummary::default();
        for (customer, variant) in assignments {
            {
                let conn = self.conn.lock().unwrap();
                db::assign_variant(&conn, campaign_id, &customer.id, &variant.key)?;
                db::bump_stat(&conn, campaign_id, &variant.key, "targeted")?;
            }
            summary.targeted += 1;

            if !customer.consent_promotional {
                let conn = self.conn.lock().unwrap();
                db::bump_stat(&conn, campaign_id, &variant.key, "skipped_no_consent")?;
                summary.skipped_no_consent += 1;
                continue;
            }

            let conversation_id = {
                let conn = self.conn.lock().unwrap();
                match messaging::db::get_active_conversation(&conn, &campaign.tenant_id, &customer.id)? {
                    Some(conv) => conv.id,
                    None => messaging::db::create_conversation(&conn, &campaign.tenant_id, &customer.id)?.id,
                }
            };
            let content = match self.dispatcher.render_template(&campaign.tenant_id, &variant.template_name, &[]) {
                Ok(c) => c,
                Err(e) => {
                    warn!(campaign_id, variant = %variant.key, error = %e, "template render failed");
                    let conn = self.conn.lock().unwrap();
                    db::bump_stat(&conn, campaign_id, &variant.key, "failed")?;
                    summary.failed += 1;
                    continue;
                }
            };

            let req = DispatchRequest {
                tenant_id: &campaign.tenant_id,
                conversation_id: &conversation_id,
                customer: &customer,
                message_type: MessageType::Campaign,
                content,
                minute_of_day,
            };
            let conn_for_stat = |col: &str| {
                let conn = self.conn.lock().unwrap();
                db::bump_stat(&conn, campaign_id, &variant.key, col)
            };
            match self.dispatcher.dispatch(req, tier, quiet_hours).await {
                Ok(DispatchOutcome::Sent(_)) => {
                    conn_for_stat("delivered")?;
                    summary.delivered += 1;
                }
                Ok(DispatchOutcome::Deferred { reason, .. }) => {
                    info!(campaign_id, variant = %variant.key, reason, "campaign send deferred, counted as failed");
                    conn_for_stat("failed")?;
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(campaign_id, variant = %variant.key, error = %e, "campaign dispatch failed");
                    conn_for_stat("failed")?;
                    summary.failed += 1;
                }
            }
        }

        {
            let conn = self.conn.lock().unwrap();
            db::set_status(&conn, campaign_id, CampaignStatus::Completed)?;
        }
        Ok(summary)
    }

    /// Aggregates per-variant engagement; for exactly two variants also runs
    /// the two-proportion significance test on conversion rate (spec §4.10
    /// step 4).
    pub fn report(&self, campaign_id: &str, confidence_level: f64) -> Result<CampaignReport> {
        let campaign = {
            let conn = self.conn.lock().unwrap();
            db::get_campaign(&conn, campaign_id)?.ok_or_else(|| CampaignError::NotFound(campaign_id.to_string()))?
        };
        let conn = self.conn.lock().unwrap();
        let mut variants = Vec::new();
        for v in &campaign.variants {
            let stats = db::variant_stats(&conn, campaign_id, &v.key)?;
            variants.push(VariantReport { key: v.key.clone(), template_name: v.template_name.clone(), stats });
        }

        let significance = if variants.len() == 2 {
            stats::two_proportion_test(
                &variants[0].key,
                variants[0].stats.conversion,
                variants[0].stats.targeted,
                &variants[1].key,
                variants[1].stats.conversion,
                variants[1].stats.targeted,
                confidence_level,
            )
        } else {
            None
        };

        Ok(CampaignReport { campaign_id: campaign_id.to_string(), variants, significance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use messaging::TelephonyCapability;

    struct FakeTelephony;
    #[async_trait]
    impl TelephonyCapability for FakeTelephony {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _to: &str, _content: &str) -> std::result::Result<String, messaging::MessagingError> {
            Ok("wamid.fake".to_string())
        }
    }

    fn setup() -> (Arc<Mutex<Connection>>, CampaignEngine) {
        let conn = Connection::open_in_memory().unwrap();
        messaging::db::init_db(&conn).unwrap();
        checkout::db::init_db(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let dispatcher = Arc::new(MessagingDispatcher::new(conn.clone(), Arc::new(FakeTelephony)));
        let engine = CampaignEngine::new(conn.clone(), dispatcher).unwrap();
        (conn, engine)
    }

    fn make_customer(conn: &Connection, tenant_id: &str, phone: &str, consent: bool) -> Customer {
        let c = messaging::db::create_customer(conn, tenant_id, phone, None).unwrap();
        messaging::db::set_consent(conn, tenant_id, &c.id, None, Some(consent)).unwrap();
        messaging::db::get_customer(conn, tenant_id, &c.id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn execute_targets_only_tagged_opted_in_customers() {
        let (conn, engine) = setup();
        {
            let c = conn.lock().unwrap();
            messaging::db::upsert_template(&c, "t1", "promo", "Special offer!").unwrap();
            let vip = make_customer(&c, "t1", "+15550000001", true);
            let _other = make_customer(&c, "t1", "+15550000002", true);
            db::add_customer_tag(&c, "t1", &vip.id, "vip").unwrap();
        };

        let campaign = engine
            .create_campaign(
                "t1",
                "VIP promo",
                TargetingCriteria { tags: vec!["vip".to_string()], ..Default::default() },
                vec![CampaignVariant { key: "a".to_string(), template_name: "promo".to_string() }],
                false,
                SubscriptionTier::Starter,
            )
            .unwrap();

        let summary = engine.execute(&campaign.id, SubscriptionTier::Starter, None, 600).await.unwrap();
        assert_eq!(summary.targeted, 1);
        assert_eq!(summary.delivered, 1);

        let report = engine.report(&campaign.id, DEFAULT_CONFIDENCE_LEVEL).unwrap();
        assert_eq!(report.variants.len(), 1);
        assert_eq!(report.variants[0].stats.delivered, 1);
    }

    #[test]
    fn ab_test_rejects_too_many_variants_for_tier() {
        let (_conn, engine) = setup();
        let variants = vec![
            CampaignVariant { key: "a".to_string(), template_name: "promo".to_string() },
            CampaignVariant { key: "b".to_string(), template_name: "promo".to_string() },
            CampaignVariant { key: "c".to_string(), template_name: "promo".to_string() },
        ];
        let err = engine
            .create_campaign("t1", "promo", TargetingCriteria::default(), variants, true, SubscriptionTier::Starter)
            .unwrap_err();
        assert!(matches!(err, CampaignError::TooManyVariants { requested: 3, max: 2 }));
    }
}
