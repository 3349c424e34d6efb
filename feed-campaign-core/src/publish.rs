//! Two-phase publish: create a draft campaign, then schedule it.
//!
//! ```text
//! Resolving -> Creating -> Created -> Scheduling -> Scheduled [-> notify]
//! ```
//!
//! A failure in any state aborts without moving further and without rolling
//! back earlier states. In particular a failure while `Scheduling` leaves the
//! draft created in `Creating` on the service; the returned
//! [`Error::Orphaned`] carries its id so it can be removed by hand.
//!
//! The service's answers are checked: a create without an id, or a schedule
//! echoing a different id, is an [`Error::Inconsistency`] even on HTTP 2xx.
//! Notification runs only after `Scheduled` and its failure is logged, never
//! returned.

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::config::CampaignConfig;
use crate::contract::{MailingList, NewCampaign, Notifier};
use crate::error::{Error, Result};

pub const NOTIFICATION_TITLE: &str = "Newsletter for your blog";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Resolving,
    Creating,
    Created,
    Scheduling,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub campaign_id: i64,
    pub list_id: i64,
    pub send_at: DateTime<Utc>,
    /// Whether the best-effort notification went out.
    pub notified: bool,
}

pub struct CampaignPublisher<'a> {
    service: &'a dyn MailingList,
    notifier: Option<&'a dyn Notifier>,
    list_name: String,
    campaign: CampaignConfig,
}

impl<'a> CampaignPublisher<'a> {
    pub fn new(
        service: &'a dyn MailingList,
        list_name: impl Into<String>,
        campaign: CampaignConfig,
    ) -> Self {
        Self {
            service,
            notifier: None,
            list_name: list_name.into(),
            campaign,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<&'a dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Publishes `body` as a campaign that goes out `delay_minutes` after `now`.
    pub async fn publish(&self, body: &str, now: DateTime<Utc>) -> Result<PublishOutcome> {
        let send_at = self.send_at(now)?;

        let mut state = PublishState::Resolving;
        info!(?state, list_name = %self.list_name, "[PUBLISH] Resolving target list");
        let list_id = self.resolve_list().await?;

        state = PublishState::Creating;
        let campaign = NewCampaign {
            name: format!("RSS Update Newsletter, {}", now.format("%Y-%m-%d %H:%M")),
            subject: self.campaign.subject.clone(),
            list_id,
            body: body.to_string(),
            send_at,
        };
        info!(?state, list_id, name = %campaign.name, "[PUBLISH] Creating draft campaign");
        let created = self.service.create_campaign(campaign).await?;
        let Some(campaign_id) = created.id else {
            error!(?state, "[PUBLISH][ERROR] Create response carried no campaign id");
            return Err(Error::inconsistency(
                "create campaign",
                "response did not contain a campaign id",
            ));
        };

        state = PublishState::Created;
        info!(?state, campaign_id, "[PUBLISH] Campaign draft created");

        state = PublishState::Scheduling;
        info!(?state, campaign_id, %send_at, "[PUBLISH] Scheduling campaign");
        let scheduled = match self.service.schedule_campaign(campaign_id).await {
            Ok(ack) => ack,
            Err(e) => {
                error!(?state, campaign_id, error = %e, "[PUBLISH][ERROR] Scheduling failed, draft campaign left behind");
                return Err(Error::Orphaned {
                    campaign_id,
                    source: Box::new(e),
                });
            }
        };
        if scheduled.id != Some(campaign_id) {
            error!(?state, campaign_id, echoed = ?scheduled.id, "[PUBLISH][ERROR] Schedule response does not match created campaign");
            return Err(Error::inconsistency(
                "schedule campaign",
                format!(
                    "expected campaign id {campaign_id}, got {:?}; draft {campaign_id} is left unscheduled",
                    scheduled.id
                ),
            ));
        }

        state = PublishState::Scheduled;
        info!(
            ?state,
            campaign_id,
            delay_minutes = self.campaign.delay_minutes,
            "[PUBLISH] Campaign scheduled"
        );

        let notified = self.notify(campaign_id).await;
        Ok(PublishOutcome {
            campaign_id,
            list_id,
            send_at,
            notified,
        })
    }

    fn send_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_minutes(self.campaign.delay_minutes)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| {
                Error::configuration(format!(
                    "send delay of {} minutes is out of range",
                    self.campaign.delay_minutes
                ))
            })
    }

    async fn resolve_list(&self) -> Result<i64> {
        let lists = self.service.lists().await?;
        lists
            .iter()
            .find(|l| l.name == self.list_name)
            .map(|l| l.id)
            .ok_or_else(|| {
                error!(list_name = %self.list_name, available = lists.len(), "[PUBLISH][ERROR] Target list not found");
                Error::ListNotFound(self.list_name.clone())
            })
    }

    async fn notify(&self, campaign_id: i64) -> bool {
        let Some(notifier) = self.notifier else {
            return false;
        };
        let message = format!(
            "A new campaign has been successfully scheduled with {} mins delay! \
             Check if you want to review this before sending. (campaign {campaign_id})",
            self.campaign.delay_minutes
        );
        match notifier.notify(NOTIFICATION_TITLE, &message).await {
            Ok(()) => {
                info!(campaign_id, "[PUBLISH] Notification sent");
                true
            }
            Err(e) => {
                warn!(campaign_id, error = %e, "[PUBLISH] Notification failed, campaign stays scheduled");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CampaignAck, MailingListRef, MockMailingList, MockNotifier};
    use chrono::TimeZone;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 7, 30, 0).unwrap()
    }

    fn config() -> CampaignConfig {
        CampaignConfig {
            subject: "Weekly digest".into(),
            delay_minutes: 45,
        }
    }

    fn with_lists(service: &mut MockMailingList) {
        service.expect_lists().returning(|| {
            Ok(vec![
                MailingListRef { id: 3, name: "Opt-in".into() },
                MailingListRef { id: 7, name: "Newsletter".into() },
            ])
        });
    }

    #[tokio::test]
    async fn creates_then_schedules_the_returned_campaign() {
        let mut service = MockMailingList::new();
        let mut seq = Sequence::new();
        service
            .expect_lists()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![MailingListRef { id: 7, name: "Newsletter".into() }]));
        service
            .expect_create_campaign()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|c| {
                c.list_id == 7
                    && c.subject == "Weekly digest"
                    && c.body == "body"
                    && c.name == "RSS Update Newsletter, 2024-04-01 07:30"
                    && c.send_at == Utc.with_ymd_and_hms(2024, 4, 1, 8, 15, 0).unwrap()
            })
            .returning(|_| Ok(CampaignAck { id: Some(42) }));
        service
            .expect_schedule_campaign()
            .with(eq(42))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(CampaignAck { id: Some(id) }));

        let outcome = CampaignPublisher::new(&service, "Newsletter", config())
            .publish("body", now())
            .await
            .unwrap();

        assert_eq!(outcome.campaign_id, 42);
        assert_eq!(outcome.list_id, 7);
        assert!(!outcome.notified);
    }

    #[tokio::test]
    async fn unknown_list_aborts_before_create() {
        let mut service = MockMailingList::new();
        with_lists(&mut service);
        service.expect_create_campaign().never();
        service.expect_schedule_campaign().never();

        let err = CampaignPublisher::new(&service, "newsletter", config())
            .publish("body", now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ListNotFound(name) if name == "newsletter"));
    }

    #[tokio::test]
    async fn create_without_id_never_schedules() {
        let mut service = MockMailingList::new();
        with_lists(&mut service);
        service
            .expect_create_campaign()
            .returning(|_| Ok(CampaignAck { id: None }));
        service.expect_schedule_campaign().never();

        let err = CampaignPublisher::new(&service, "Newsletter", config())
            .publish("body", now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Inconsistency { operation: "create campaign", .. }
        ));
    }

    #[tokio::test]
    async fn schedule_echoing_other_id_is_inconsistent() {
        let mut service = MockMailingList::new();
        with_lists(&mut service);
        service
            .expect_create_campaign()
            .returning(|_| Ok(CampaignAck { id: Some(42) }));
        service
            .expect_schedule_campaign()
            .returning(|_| Ok(CampaignAck { id: Some(43) }));

        let err = CampaignPublisher::new(&service, "Newsletter", config())
            .publish("body", now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Inconsistency { operation: "schedule campaign", .. }
        ));
    }

    #[tokio::test]
    async fn transport_failure_while_scheduling_propagates() {
        let mut service = MockMailingList::new();
        with_lists(&mut service);
        service
            .expect_create_campaign()
            .returning(|_| Ok(CampaignAck { id: Some(42) }));
        service.expect_schedule_campaign().returning(|_| {
            Err(Error::Transport {
                operation: "schedule campaign",
                status: 500,
                body: "boom".into(),
            })
        });

        let err = CampaignPublisher::new(&service, "Newsletter", config())
            .publish("body", now())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("42"), "draft id missing from: {err}");
        match err {
            Error::Orphaned { campaign_id, source } => {
                assert_eq!(campaign_id, 42);
                assert!(matches!(*source, Error::Transport { status: 500, .. }));
            }
            other => panic!("expected orphaned draft error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_range_delay_fails_before_any_call() {
        let mut service = MockMailingList::new();
        service.expect_lists().never();
        service.expect_create_campaign().never();
        service.expect_schedule_campaign().never();
        let campaign = CampaignConfig {
            delay_minutes: 9_000_000_000_000,
            ..config()
        };

        let err = CampaignPublisher::new(&service, "Newsletter", campaign)
            .publish("body", now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn notification_failure_does_not_undo_scheduling() {
        let mut service = MockMailingList::new();
        with_lists(&mut service);
        service
            .expect_create_campaign()
            .returning(|_| Ok(CampaignAck { id: Some(42) }));
        service
            .expect_schedule_campaign()
            .returning(|id| Ok(CampaignAck { id: Some(id) }));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .withf(|title, message| {
                title.to_string() == NOTIFICATION_TITLE && message.contains("45 mins delay")
            })
            .returning(|_, _| {
                Err(Error::Transport {
                    operation: "send notification",
                    status: 400,
                    body: "invalid token".into(),
                })
            });

        let outcome = CampaignPublisher::new(&service, "Newsletter", config())
            .with_notifier(Some(&notifier))
            .publish("body", now())
            .await
            .unwrap();

        assert_eq!(outcome.campaign_id, 42);
        assert!(!outcome.notified);
    }

    #[tokio::test]
    async fn successful_notification_is_reported() {
        let mut service = MockMailingList::new();
        with_lists(&mut service);
        service
            .expect_create_campaign()
            .returning(|_| Ok(CampaignAck { id: Some(9) }));
        service
            .expect_schedule_campaign()
            .returning(|id| Ok(CampaignAck { id: Some(id) }));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_, _| Ok(()));

        let outcome = CampaignPublisher::new(&service, "Newsletter", config())
            .with_notifier(Some(&notifier))
            .publish("body", now())
            .await
            .unwrap();

        assert!(outcome.notified);
    }
}
