//! One-time code and session lifecycle.
//!
//! # Purpose
//! Issues one-time codes, exchanges them for sessions, and revokes sessions.
//! The store performs each exchange atomically; this module adds metrics and
//! fires notifications once the store call has committed.
use crate::api::error::{ApiError, api_validation_error};
use crate::app::AppState;
use crate::notify::Notification;
use crate::store::{Redemption, StoreResult};
use chrono::Utc;
use loop_authz::{GroupUid, Principal, UserUid, digest};

fn record<T>(op: &'static str, result: &StoreResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    metrics::counter!(crate::observability::CREDENTIALS, "op" => op, "outcome" => outcome).increment(1);
}

/// Stores a fresh one-time code for `principal` and hands it to the notifier.
pub async fn send_one_time_code(state: &AppState, principal: &Principal) -> Result<(), ApiError> {
    let email = principal
        .email
        .clone()
        .ok_or_else(|| api_validation_error("user has no email address"))?;
    let issued = state
        .credentials
        .issue_one_time_code(principal.uid.clone(), Utc::now());
    let result = state.store.insert_credential(issued.credential).await;
    record("issue", &result);
    result?;
    state
        .notifier
        .notify(Notification::OneTimeCode {
            user_uid: principal.uid.clone(),
            email,
            code: issued.token,
        })
        .await;
    Ok(())
}

/// Exchanges `code` for a session. On a principal's first verification the
/// admins of every group it asked to join are told about the new participant.
pub async fn redeem_one_time_code(
    state: &AppState,
    email: &str,
    code: &str,
) -> Result<Redemption, ApiError> {
    let result = state
        .store
        .redeem_one_time_code(email, &digest(code.trim()), &state.credentials, Utc::now())
        .await;
    record("redeem", &result);
    let redemption = result?;
    if redemption.first_verification {
        for membership in redemption.memberships.iter().filter(|m| !m.is_admin) {
            notify_participant_joined(state, &membership.group_uid, &redemption.principal.uid)
                .await;
        }
    }
    Ok(redemption)
}

/// Deletes the session behind `token`. Unknown tokens are ignored.
pub async fn revoke(state: &AppState, token: &str) -> Result<(), ApiError> {
    let result = state.store.revoke_credential(&digest(token)).await;
    record("revoke", &result);
    Ok(result?)
}

/// Tells the admins of `group_uid` that `user_uid` asked to join.
pub async fn notify_participant_joined(state: &AppState, group_uid: &GroupUid, user_uid: &UserUid) {
    let admin_uids = match state.store.group_members(group_uid).await {
        Ok(members) => members
            .into_iter()
            .filter(|member| member.membership.is_admin)
            .map(|member| member.principal.uid)
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, group = %group_uid, "failed to load group admins");
            return;
        }
    };
    state
        .notifier
        .notify(Notification::ParticipantJoined {
            group_uid: group_uid.clone(),
            user_uid: user_uid.clone(),
            admin_uids,
        })
        .await;
}
