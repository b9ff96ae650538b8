use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::entitlement::{EntitlementRecord, MAX_ADS_PER_DAY, PURCHASE_CREDITS, validate_username};
use crate::events::{ChannelEvent, Reply, ReplyAction};
use crate::provider::ImageProvider;
use crate::store::{EntitlementStore, EntitlementTable};

const CAPTION: &str = "Here is a new AI-generated face!";
const FETCH_FAILED: &str = "Failed to generate face. Please try again later.";
const NOT_ONBOARDED: &str =
    "You are not set up yet. Send /start and accept the terms to get going.";
const USERNAME_PROMPT: &str =
    "Great! What should I call you? Send a username (1-32 characters).";

/// Applies the entitlement rules for one user per inbound event and produces
/// the outbound replies. Owns the in-memory table; every mutation is written
/// back through the store before the event finishes.
pub struct EntitlementEngine<P> {
    store: EntitlementStore,
    provider: P,
    table: Mutex<EntitlementTable>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    save_lock: Mutex<()>,
}

impl<P: ImageProvider> EntitlementEngine<P> {
    pub fn new(store: EntitlementStore, provider: P) -> EntitlementEngine<P> {
        let table = store.load();
        info!("loaded {} entitlement records", table.len());

        EntitlementEngine {
            store,
            provider,
            table: Mutex::new(table),
            user_locks: Mutex::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Single entry point for the conversation channel. Events for the same
    /// user are serialized; events for different users run concurrently.
    pub async fn handle_event(
        &self,
        user_id: &str,
        event: ChannelEvent,
        today: NaiveDate,
    ) -> Vec<Reply> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        debug!("handling {} for user {}", event, user_id);

        match event {
            ChannelEvent::Start => vec![Self::disclaimer_prompt()],
            ChannelEvent::Consent { agreed } => self.record_consent(user_id, agreed, today).await,
            ChannelEvent::UsernameInput(text) => self.set_username(user_id, &text).await,
            ChannelEvent::Generate => self.generate(user_id, today).await,
            ChannelEvent::WatchAd => self.watch_ad(user_id, today).await,
            ChannelEvent::BuySubscription => self.grant_unlimited(user_id).await,
            ChannelEvent::BuyCredits => self.grant_credits(user_id, PURCHASE_CREDITS).await,
            ChannelEvent::Stats => self.stats(user_id).await,
            ChannelEvent::Unknown(command) => {
                vec![Reply::text(format!(
                    "Unknown command '{}'. Try /start, /generate or /stats.",
                    command
                ))]
            }
        }
    }

    /// The disclaimer is shown on every /start, whether or not a record
    /// exists yet. Consent is only recorded when a button comes back.
    fn disclaimer_prompt() -> Reply {
        Reply::with_actions(
            "Welcome to the AI Face Generator Bot!\n\n\
             Every face you receive here is synthetic and generated on demand. \
             Any resemblance to a real person is pure coincidence. \
             Do you agree to these terms?",
            vec![ReplyAction::Agree, ReplyAction::Disagree],
        )
    }

    async fn record_consent(&self, user_id: &str, agreed: bool, today: NaiveDate) -> Vec<Reply> {
        if !agreed {
            // Terminal for this session; no record is created.
            return vec![Reply::text(
                "Understood, nothing was set up. Send /start again if you change your mind.",
            )];
        }

        let created = {
            let mut table = self.table.lock().await;
            if table.contains_key(user_id) {
                false
            } else {
                table.insert(user_id.to_string(), EntitlementRecord::new(today));
                true
            }
        };

        if created {
            info!("created entitlement record for user {}", user_id);
            self.persist().await;
        }

        vec![Reply::text(USERNAME_PROMPT)]
    }

    async fn set_username(&self, user_id: &str, text: &str) -> Vec<Reply> {
        let Some(mut record) = self.load_record(user_id).await else {
            return vec![Reply::text(NOT_ONBOARDED)];
        };

        if record.username.is_some() {
            return vec![Reply::text(
                "You are all set up already. Send /generate for a face or /stats for your balance.",
            )];
        }

        let username = match validate_username(text) {
            Ok(name) => name.to_string(),
            Err(message) => return vec![Reply::text(message)],
        };

        record.username = Some(username.clone());
        let credits = record.credits;
        self.store_record(user_id, record).await;

        vec![Reply::text(format!(
            "Welcome, {}! You have {} free credits. Send /generate to get your first face.",
            username, credits
        ))]
    }

    async fn generate(&self, user_id: &str, today: NaiveDate) -> Vec<Reply> {
        let Some(mut record) = self.load_record(user_id).await else {
            return vec![Reply::text(NOT_ONBOARDED)];
        };
        if !record.is_onboarded() {
            return vec![Reply::text(
                "Almost there! Send me a username (1-32 characters) to finish setting up.",
            )];
        }

        let months = record.apply_monthly_rollover(today);
        if months > 0 {
            info!("user {}: monthly rollover granted {} months of credits", user_id, months);
        }
        record.apply_daily_rollover(today);

        if record.subscribed {
            let reply = match self.provider.fetch().await {
                Ok(image) => Reply::photo(image, CAPTION),
                Err(e) => {
                    warn!("image fetch failed for user {}: {}", user_id, e);
                    Reply::text(FETCH_FAILED)
                }
            };
            self.store_record(user_id, record).await;
            return vec![reply];
        }

        if record.credits == 0 {
            // Rollover bookkeeping still counts even though nothing is sent.
            self.store_record(user_id, record).await;
            return vec![Reply::with_actions(
                "You are out of credits. Watch an ad for +1 credit, or unlock more below.",
                vec![
                    ReplyAction::WatchAd,
                    ReplyAction::BuySubscription,
                    ReplyAction::BuyCredits,
                ],
            )];
        }

        // The credit is only consumed once the fetch has succeeded.
        match self.provider.fetch().await {
            Ok(image) => {
                record.credits -= 1;
                let caption = format!("{} Credits left: {}", CAPTION, record.credits);
                self.store_record(user_id, record).await;
                vec![Reply::photo(image, caption)]
            }
            Err(e) => {
                warn!("image fetch failed for user {}: {}", user_id, e);
                self.store_record(user_id, record).await;
                vec![Reply::text(FETCH_FAILED)]
            }
        }
    }

    async fn watch_ad(&self, user_id: &str, today: NaiveDate) -> Vec<Reply> {
        let Some(mut record) = self.load_record(user_id).await else {
            return vec![Reply::text(NOT_ONBOARDED)];
        };

        record.apply_daily_rollover(today);

        if !record.can_watch_ad() {
            // The cap is only reachable when the counter already belongs to
            // today, so the rollover above changed nothing worth persisting.
            return vec![Reply::text(format!(
                "You reached the daily limit of {} ads. Come back tomorrow!",
                MAX_ADS_PER_DAY
            ))];
        }

        record.record_ad_watch();
        let credits = record.credits;
        let ads_used = record.ads_used_today;
        self.store_record(user_id, record).await;

        vec![Reply::text(format!(
            "Thanks for watching! +1 credit (you now have {}). Ads today: {}/{}.",
            credits, ads_used, MAX_ADS_PER_DAY
        ))]
    }

    /// Applies a confirmed credit purchase. Invoked by the payment
    /// confirmation path, not derived from free text.
    pub async fn grant_credits(&self, user_id: &str, amount: u32) -> Vec<Reply> {
        let Some(mut record) = self.load_record(user_id).await else {
            return vec![Reply::text(NOT_ONBOARDED)];
        };

        record.credits += amount;
        let credits = record.credits;
        self.store_record(user_id, record).await;
        info!("user {}: granted {} credits", user_id, amount);

        vec![Reply::text(format!(
            "Purchase confirmed: +{} credits. You now have {}.",
            amount, credits
        ))]
    }

    /// Applies a confirmed unlimited-subscription purchase.
    pub async fn grant_unlimited(&self, user_id: &str) -> Vec<Reply> {
        let Some(mut record) = self.load_record(user_id).await else {
            return vec![Reply::text(NOT_ONBOARDED)];
        };

        record.subscribed = true;
        self.store_record(user_id, record).await;
        info!("user {}: unlimited subscription activated", user_id);

        vec![Reply::text(
            "Subscription active! Generate as many faces as you like with /generate.",
        )]
    }

    async fn stats(&self, user_id: &str) -> Vec<Reply> {
        let Some(record) = self.load_record(user_id).await else {
            return vec![Reply::text(NOT_ONBOARDED)];
        };

        let username = record.username.as_deref().unwrap_or("(not set)");
        let subscription = if record.subscribed { "active" } else { "none" };

        vec![Reply::text(format!(
            "Your stats\n\
             Name: {}\n\
             Credits: {}\n\
             Subscription: {}\n\
             Ads watched today: {}/{}\n\
             Next credit reset: {}",
            username,
            record.credits,
            subscription,
            record.ads_used_today,
            MAX_ADS_PER_DAY,
            record.next_reset_date()
        ))]
    }

    /// Read-only view of one record, for the admin CLI and tests.
    pub async fn record(&self, user_id: &str) -> Option<EntitlementRecord> {
        self.table.lock().await.get(user_id).cloned()
    }

    /// Read-only snapshot of the whole table.
    pub async fn snapshot(&self) -> EntitlementTable {
        self.table.lock().await.clone()
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_record(&self, user_id: &str) -> Option<EntitlementRecord> {
        self.table.lock().await.get(user_id).cloned()
    }

    async fn store_record(&self, user_id: &str, record: EntitlementRecord) {
        {
            let mut table = self.table.lock().await;
            table.insert(user_id.to_string(), record);
        }
        self.persist().await;
    }

    /// Saves the whole table. The save lock keeps concurrent writers from
    /// interleaving the backup/primary pair; a failed save is logged and the
    /// in-memory table stays the source of truth.
    async fn persist(&self) {
        let _write = self.save_lock.lock().await;
        let table = self.table.lock().await;
        if let Err(e) = self.store.save(&table) {
            error!("failed to persist entitlement table: {:#}", e);
        }
    }
}
