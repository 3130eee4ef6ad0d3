use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::atlas_score::Tier;
use crate::kingdom_stats::KvkOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    KvkResult,
    ScoreChange,
    TransferApplication,
    FundContribution,
    ReviewReply,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Declined,
    Withdrawn,
}

impl ApplicationStatus {
    fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Declined => "declined",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

/// Each notification type carries its own metadata shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metadata", rename_all = "snake_case")]
pub enum NotificationPayload {
    KvkResult {
        kingdom_number: u32,
        kvk_number: u32,
        outcome: KvkOutcome,
        opponent_kingdom: Option<u32>,
    },
    ScoreChange {
        kingdom_number: u32,
        old_score: f64,
        new_score: f64,
        old_tier: Tier,
        new_tier: Tier,
    },
    TransferApplication {
        application_id: String,
        kingdom_number: u32,
        status: ApplicationStatus,
    },
    FundContribution {
        kingdom_number: u32,
        contributor: String,
        amount_cents: u64,
    },
    ReviewReply {
        kingdom_number: u32,
        review_id: String,
        replier: String,
    },
    System {
        title: String,
        body: String,
        link: Option<String>,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationPayload::KvkResult { .. } => NotificationKind::KvkResult,
            NotificationPayload::ScoreChange { .. } => NotificationKind::ScoreChange,
            NotificationPayload::TransferApplication { .. } => NotificationKind::TransferApplication,
            NotificationPayload::FundContribution { .. } => NotificationKind::FundContribution,
            NotificationPayload::ReviewReply { .. } => NotificationKind::ReviewReply,
            NotificationPayload::System { .. } => NotificationKind::System,
        }
    }

    /// Notifications only group with others sharing kind and this key.
    pub fn group_key(&self) -> String {
        match self {
            NotificationPayload::KvkResult { kingdom_number, .. }
            | NotificationPayload::ScoreChange { kingdom_number, .. }
            | NotificationPayload::TransferApplication { kingdom_number, .. }
            | NotificationPayload::FundContribution { kingdom_number, .. } => {
                format!("kingdom:{kingdom_number}")
            }
            NotificationPayload::ReviewReply { review_id, .. } => format!("review:{review_id}"),
            NotificationPayload::System { title, .. } => format!("system:{title}"),
        }
    }

    pub fn title(&self) -> String {
        match self {
            NotificationPayload::KvkResult { kvk_number, .. } => format!("KvK #{kvk_number} result"),
            NotificationPayload::ScoreChange { kingdom_number, .. } => {
                format!("Kingdom {kingdom_number} score updated")
            }
            NotificationPayload::TransferApplication { .. } => "Transfer application".to_string(),
            NotificationPayload::FundContribution { .. } => "Kingdom fund contribution".to_string(),
            NotificationPayload::ReviewReply { .. } => "New reply to your review".to_string(),
            NotificationPayload::System { title, .. } => title.clone(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            NotificationPayload::KvkResult {
                kingdom_number,
                outcome,
                opponent_kingdom,
                ..
            } => match opponent_kingdom {
                Some(opp) => format!("Kingdom {kingdom_number}: {} vs {opp}", outcome.label()),
                None => format!("Kingdom {kingdom_number}: {}", outcome.label()),
            },
            NotificationPayload::ScoreChange {
                old_score,
                new_score,
                old_tier,
                new_tier,
                ..
            } => {
                if old_tier == new_tier {
                    format!("{old_score:.2} -> {new_score:.2}")
                } else {
                    format!("{old_score:.2} -> {new_score:.2} (tier {old_tier} -> {new_tier})")
                }
            }
            NotificationPayload::TransferApplication {
                kingdom_number,
                status,
                ..
            } => format!(
                "Your application to kingdom {kingdom_number} is {}",
                status.label()
            ),
            NotificationPayload::FundContribution {
                kingdom_number,
                contributor,
                amount_cents,
            } => format!(
                "{contributor} contributed ${}.{:02} to kingdom {kingdom_number}",
                amount_cents / 100,
                amount_cents % 100
            ),
            NotificationPayload::ReviewReply { replier, .. } => format!("{replier} replied"),
            NotificationPayload::System { body, .. } => body.clone(),
        }
    }

    pub fn link(&self) -> Option<String> {
        match self {
            NotificationPayload::KvkResult { kingdom_number, .. }
            | NotificationPayload::ScoreChange { kingdom_number, .. }
            | NotificationPayload::FundContribution { kingdom_number, .. }
            | NotificationPayload::ReviewReply { kingdom_number, .. } => {
                Some(format!("/kingdom/{kingdom_number}"))
            }
            NotificationPayload::TransferApplication { application_id, .. } => {
                Some(format!("/transfer-hub/applications/{application_id}"))
            }
            NotificationPayload::System { link, .. } => link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationGroup {
    pub kind: NotificationKind,
    pub group_key: String,
    /// Newest member.
    pub latest: Notification,
    pub ids: Vec<String>,
    pub unread: usize,
    pub newest_at: DateTime<Utc>,
    pub oldest_at: DateTime<Utc>,
}

impl NotificationGroup {
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn summary(&self) -> String {
        let base = self.latest.payload.message();
        match self.count() {
            0 | 1 => base,
            n => format!("{base} (+{} more)", n - 1),
        }
    }
}

/// Groups notifications newest first. A notification joins an existing group
/// of the same kind and key when it is no older than `window` relative to the
/// group's newest member. Repeated ids and payloads already present in the
/// group are dropped.
pub fn group_notifications(items: &[Notification], window: Duration) -> Vec<NotificationGroup> {
    let mut sorted = items.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut groups: Vec<NotificationGroup> = Vec::new();
    let mut payloads: Vec<Vec<&NotificationPayload>> = Vec::new();

    for item in sorted {
        if !seen_ids.insert(item.id.as_str()) {
            continue;
        }
        let kind = item.payload.kind();
        let key = item.payload.group_key();

        let open = groups.iter().position(|g| {
            g.kind == kind
                && g.group_key == key
                && g.newest_at.signed_duration_since(item.created_at) <= window
        });

        match open {
            Some(idx) => {
                if payloads[idx].contains(&&item.payload) {
                    continue;
                }
                let group = &mut groups[idx];
                group.ids.push(item.id.clone());
                group.oldest_at = item.created_at;
                if !item.read {
                    group.unread += 1;
                }
                payloads[idx].push(&item.payload);
            }
            None => {
                groups.push(NotificationGroup {
                    kind,
                    group_key: key,
                    latest: item.clone(),
                    ids: vec![item.id.clone()],
                    unread: usize::from(!item.read),
                    newest_at: item.created_at,
                    oldest_at: item.created_at,
                });
                payloads.push(vec![&item.payload]);
            }
        }
    }

    groups
}

pub fn unread_count(groups: &[NotificationGroup]) -> usize {
    groups.iter().map(|g| g.unread).sum()
}
