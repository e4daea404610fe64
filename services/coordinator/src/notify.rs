//! Post-commit notification seam.
//!
//! Handlers emit a [`Notification`] only after the owning transition has
//! committed. Delivery (email, chat provisioning) lives behind [`Notifier`];
//! the shipped [`LogNotifier`] only records a structured log line.
use async_trait::async_trait;
use loop_authz::{GroupUid, UserUid};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Other,
    TooFarAway,
    SizesGenders,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::Other => "other",
            DenyReason::TooFarAway => "too_far_away",
            DenyReason::SizesGenders => "sizes_genders",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OneTimeCode {
        user_uid: UserUid,
        email: String,
        code: String,
    },
    ParticipantJoined {
        group_uid: GroupUid,
        user_uid: UserUid,
        admin_uids: Vec<UserUid>,
    },
    JoinApproved {
        group_uid: GroupUid,
        user_uid: UserUid,
    },
    JoinDenied {
        group_uid: GroupUid,
        user_uid: UserUid,
        reason: DenyReason,
    },
    AccountDeleted {
        user_uid: UserUid,
        email: Option<String>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OneTimeCode { .. } => "one_time_code",
            Notification::ParticipantJoined { .. } => "participant_joined",
            Notification::JoinApproved { .. } => "join_approved",
            Notification::JoinDenied { .. } => "join_denied",
            Notification::AccountDeleted { .. } => "account_deleted",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        match &notification {
            // Never log the code itself.
            Notification::OneTimeCode { user_uid, .. } => {
                tracing::info!(kind = notification.kind(), user = %user_uid, "notification");
            }
            Notification::ParticipantJoined {
                group_uid,
                user_uid,
                admin_uids,
            } => {
                tracing::info!(
                    kind = notification.kind(),
                    group = %group_uid,
                    user = %user_uid,
                    admins = admin_uids.len(),
                    "notification"
                );
            }
            Notification::JoinApproved {
                group_uid,
                user_uid,
            } => {
                tracing::info!(kind = notification.kind(), group = %group_uid, user = %user_uid, "notification");
            }
            Notification::JoinDenied {
                group_uid,
                user_uid,
                reason,
            } => {
                tracing::info!(
                    kind = notification.kind(),
                    group = %group_uid,
                    user = %user_uid,
                    reason = reason.as_str(),
                    "notification"
                );
            }
            Notification::AccountDeleted { user_uid, .. } => {
                tracing::info!(kind = notification.kind(), user = %user_uid, "notification");
            }
        }
    }
}

/// Keeps every notification in memory; used by integration tests to read
/// one-time codes and assert on post-commit side effects.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Most recent one-time code delivered to `email`.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|n| match n {
            Notification::OneTimeCode {
                email: to, code, ..
            } if to == email => Some(code),
            _ => None,
        })
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}
