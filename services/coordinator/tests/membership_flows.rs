mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Session, TestApp, read_json, test_app};
use coordinator::notify::{DenyReason, Notification};
use coordinator::store::CoordinatorStore;
use http_helpers::{get, json_request, request};
use loop_authz::{DependentKind, UserUid};

async fn user_view(app: &TestApp, caller: &Session, query: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .send(get(&format!("/v2/user?{query}"), Some(&caller.token)))
        .await;
    let status = response.status();
    let body = if status == StatusCode::OK {
        read_json(response).await
    } else {
        serde_json::Value::Null
    };
    (status, body)
}

async fn members(app: &TestApp, caller: &Session, chain_uid: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .send(get(
            &format!("/v2/user/all-chain?chain_uid={chain_uid}"),
            Some(&caller.token),
        ))
        .await;
    let status = response.status();
    let body = if status == StatusCode::OK {
        read_json(response).await
    } else {
        serde_json::Value::Null
    };
    (status, body)
}

fn membership_in<'a>(user: &'a serde_json::Value, chain_uid: &str) -> Option<&'a serde_json::Value> {
    user["chains"]
        .as_array()?
        .iter()
        .find(|m| m["chain_uid"] == chain_uid)
}

async fn chain(app: &TestApp, chain_uid: &str) -> serde_json::Value {
    read_json(app.send(get(&format!("/v2/chain?chain_uid={chain_uid}"), None)).await).await
}

#[tokio::test]
async fn root_passes_group_checks_without_membership() {
    let app = test_app();
    let owner = app.register("Ann", "ann@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Ann loop").await;
    let root = app.root().await;

    let (status, body) = members(&app, &root, &chain_uid).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("members").len(), 1);

    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain",
            serde_json::json!({ "chain_uid": chain_uid, "name": "Renamed" }),
            Some(&root.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["name"], "Renamed");
}

#[tokio::test]
async fn non_members_are_denied_group_member_access() {
    let app = test_app();
    let owner = app.register("Ben", "ben@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Ben loop").await;
    let outsider = app.register("Out", "out@example.org", None).await;

    let (status, _) = members(&app, &outsider, &chain_uid).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain",
            serde_json::json!({ "chain_uid": chain_uid, "published": false }),
            Some(&outsider.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let (status, _) = members(&app, &outsider, "missing-chain").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_can_always_act_on_themselves() {
    let app = test_app();
    let owner = app.register("Cy", "cy@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Cy loop").await;
    let pending = app
        .register("Pat", "pat@example.org", Some(&chain_uid))
        .await;

    let (status, body) = user_view(&app, &pending, &format!("user_uid={}", pending.uid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], pending.uid.as_str());

    let response = app
        .send(json_request(
            "PATCH",
            "/v2/user",
            serde_json::json!({ "name": "Patricia" }),
            Some(&pending.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["name"], "Patricia");
}

#[tokio::test]
async fn admin_of_one_chain_cannot_act_on_member_of_another() {
    let app = test_app();
    let admin_a = app.register("Ada", "ada@example.org", None).await;
    let chain_a = app.create_chain(&admin_a, "Loop A").await;
    let admin_b = app.register("Bo", "bo@example.org", None).await;
    let chain_b = app.create_chain(&admin_b, "Loop B").await;
    let member_b = app.register("Max", "max@example.org", None).await;
    app.add_approved(&admin_b, &member_b, &chain_b).await;

    let (status, _) = user_view(
        &app,
        &admin_a,
        &format!("user_uid={}&chain_uid={chain_a}", member_b.uid),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/remove-user",
            serde_json::json!({ "user_uid": member_b.uid, "chain_uid": chain_a }),
            Some(&admin_a.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin of the member's own chain may.
    let (status, body) = user_view(
        &app,
        &admin_b,
        &format!("user_uid={}&chain_uid={chain_b}", member_b.uid),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "max@example.org");
}

#[tokio::test]
async fn caller_without_target_acts_on_itself() {
    let app = test_app();
    let owner = app.register("Dee", "dee@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Dee loop").await;
    let root = app.root().await;
    let (status, body) = user_view(&app, &root, &format!("chain_uid={chain_uid}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], root.uid.as_str());
}

#[tokio::test]
async fn removing_last_admin_of_open_chain_conflicts_and_changes_nothing() {
    let app = test_app();
    let owner = app.register("Eli", "eli@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Eli loop").await;
    let member = app.register("Flo", "flo@example.org", None).await;
    app.add_approved(&owner, &member, &chain_uid).await;
    let (_, before) = members(&app, &owner, &chain_uid).await;

    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/remove-user",
            serde_json::json!({ "user_uid": owner.uid, "chain_uid": chain_uid }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/add-user",
            serde_json::json!({ "user_uid": owner.uid, "chain_uid": chain_uid, "is_chain_admin": false }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let (_, after) = members(&app, &owner, &chain_uid).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn admins_can_leave_once_another_admin_exists() {
    let app = test_app();
    let owner = app.register("Gil", "gil@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Gil loop").await;
    let heir = app.register("Hana", "hana@example.org", None).await;
    app.add_approved(&owner, &heir, &chain_uid).await;

    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/add-user",
            serde_json::json!({ "user_uid": heir.uid, "chain_uid": chain_uid, "is_chain_admin": true }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["is_chain_admin"], true);

    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/remove-user",
            serde_json::json!({ "user_uid": owner.uid, "chain_uid": chain_uid }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, body) = members(&app, &heir, &chain_uid).await;
    let uids: Vec<_> = body
        .as_array()
        .expect("members")
        .iter()
        .map(|m| m["uid"].as_str().expect("uid").to_string())
        .collect();
    assert_eq!(uids, vec![heir.uid.clone()]);
}

#[tokio::test]
async fn approval_resets_tenure_and_keeps_admin_flag() {
    let app = test_app();
    let owner = app.register("Ivo", "ivo@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Ivo loop").await;
    let member = app.register("Jan", "jan@example.org", None).await;

    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/join",
            serde_json::json!({ "chain_uid": chain_uid }),
            Some(&member.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let joined = read_json(response).await;
    assert_eq!(joined["is_approved"], false);

    let before_approval = Utc::now();
    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain/approve-user",
            serde_json::json!({ "user_uid": member.uid, "chain_uid": chain_uid }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let approved = read_json(response).await;
    assert_eq!(approved["is_approved"], true);
    assert_eq!(approved["is_chain_admin"], false);
    assert_eq!(approved["id"], joined["id"]);
    let created_at: DateTime<Utc> = approved["created_at"]
        .as_str()
        .expect("created_at")
        .parse()
        .expect("timestamp");
    assert!(created_at >= before_approval);

    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain/approve-user",
            serde_json::json!({ "user_uid": member.uid, "chain_uid": chain_uid }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert!(app.notifier.sent().contains(&Notification::JoinApproved {
        group_uid: loop_authz::GroupUid::new(chain_uid.as_str()),
        user_uid: UserUid::new(member.uid.as_str()),
    }));
}

#[tokio::test]
async fn pending_members_cannot_approve_themselves() {
    let app = test_app();
    let owner = app.register("Kai", "kai@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Kai loop").await;
    let pending = app
        .register("Lea", "lea@example.org", Some(&chain_uid))
        .await;

    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain/approve-user",
            serde_json::json!({ "user_uid": pending.uid, "chain_uid": chain_uid }),
            Some(&pending.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(request(
            "DELETE",
            &format!(
                "/v2/chain/unapproved-user?user_uid={}&chain_uid={chain_uid}",
                pending.uid
            ),
            Some(&pending.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn denying_a_join_request_removes_it_and_notifies() {
    let app = test_app();
    let owner = app.register("Mo", "mo@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Mo loop").await;
    let pending = app
        .register("Ned", "ned@example.org", Some(&chain_uid))
        .await;

    let response = app
        .send(request(
            "DELETE",
            &format!(
                "/v2/chain/unapproved-user?user_uid={}&chain_uid={chain_uid}&reason=too_far_away",
                pending.uid
            ),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, body) = user_view(&app, &pending, "").await;
    assert!(membership_in(&body, &chain_uid).is_none());
    assert!(app.notifier.sent().iter().any(|n| matches!(
        n,
        Notification::JoinDenied { reason: DenyReason::TooFarAway, .. }
    )));

    // Approved members are removed, not denied.
    let member = app.register("Oli", "oli@example.org", None).await;
    app.add_approved(&owner, &member, &chain_uid).await;
    let response = app
        .send(request(
            "DELETE",
            &format!(
                "/v2/chain/unapproved-user?user_uid={}&chain_uid={chain_uid}",
                member.uid
            ),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn joining_twice_or_joining_a_closed_chain_conflicts() {
    let app = test_app();
    let owner = app.register("Pia", "pia@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Pia loop").await;
    let member = app.register("Quin", "quin@example.org", None).await;

    let join = || {
        json_request(
            "POST",
            "/v2/chain/join",
            serde_json::json!({ "chain_uid": chain_uid }),
            Some(&member.token),
        )
    };
    assert_eq!(app.send(join()).await.status(), StatusCode::CREATED);
    assert_eq!(app.send(join()).await.status(), StatusCode::CONFLICT);

    let closed_uid = app.create_chain(&owner, "Closed loop").await;
    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain",
            serde_json::json!({ "chain_uid": closed_uid, "open_to_new_members": false }),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .send(json_request(
            "POST",
            "/v2/chain/join",
            serde_json::json!({ "chain_uid": closed_uid }),
            Some(&member.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn member_listing_follows_the_approval_rule() {
    let app = test_app();
    let owner = app.register("Rae", "rae@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Rae loop").await;
    let member = app.register("Sam", "sam@example.org", None).await;
    app.add_approved(&owner, &member, &chain_uid).await;
    let pending = app
        .register("Tom", "tom@example.org", Some(&chain_uid))
        .await;

    let (status, body) = members(&app, &owner, &chain_uid).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("members").len(), 3);

    let (status, body) = members(&app, &member, &chain_uid).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().expect("members");
    assert_eq!(listed.len(), 2);
    for entry in listed {
        if entry["uid"] == member.uid.as_str() {
            assert_eq!(entry["email"], "sam@example.org");
        } else {
            assert!(entry.get("email").is_none());
        }
    }

    let (status, _) = members(&app, &pending, &chain_uid).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn transfer_onto_existing_membership_repoints_dependents() {
    let app = test_app();
    let admin = app.register("Uma", "uma@example.org", None).await;
    let from = app.create_chain(&admin, "From loop").await;
    let to = app.create_chain(&admin, "To loop").await;
    let member = app.register("Vic", "vic@example.org", None).await;
    app.add_approved(&admin, &member, &from).await;
    app.add_approved(&admin, &member, &to).await;
    app.send(json_request(
        "POST",
        "/v2/chain/add-user",
        serde_json::json!({ "user_uid": member.uid, "chain_uid": to, "is_chain_admin": true }),
        Some(&admin.token),
    ))
    .await;

    let (_, before) = user_view(&app, &member, "").await;
    let source_id = membership_in(&before, &from).expect("source")["id"]
        .as_i64()
        .expect("id");
    let destination = membership_in(&before, &to).expect("destination").clone();
    app.store
        .add_dependent(source_id, DependentKind::BulkyItem)
        .await
        .expect("dependent");

    let response = app
        .send(json_request(
            "POST",
            "/v2/user/transfer-chain",
            serde_json::json!({ "user_uid": member.uid, "from_chain_uid": from, "to_chain_uid": to }),
            Some(&admin.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, after) = user_view(&app, &member, "").await;
    assert!(membership_in(&after, &from).is_none());
    assert_eq!(membership_in(&after, &to), Some(&destination));
    let dependents = app
        .store
        .dependents_of(&UserUid::new(member.uid.as_str()))
        .await
        .expect("dependents");
    assert_eq!(dependents.len(), 1);
    assert_eq!(Some(dependents[0].membership_id), destination["id"].as_i64());
}

#[tokio::test]
async fn copy_onto_existing_membership_is_a_no_op() {
    let app = test_app();
    let admin = app.register("Wes", "wes@example.org", None).await;
    let from = app.create_chain(&admin, "Copy from").await;
    let to = app.create_chain(&admin, "Copy to").await;
    let member = app.register("Xan", "xan@example.org", None).await;
    app.add_approved(&admin, &member, &from).await;
    app.add_approved(&admin, &member, &to).await;
    let (_, before) = user_view(&app, &member, "").await;

    let response = app
        .send(json_request(
            "POST",
            "/v2/user/transfer-chain",
            serde_json::json!({ "user_uid": member.uid, "from_chain_uid": from, "to_chain_uid": to, "is_copy": true }),
            Some(&admin.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, after) = user_view(&app, &member, "").await;
    assert_eq!(before["chains"], after["chains"]);
}

#[tokio::test]
async fn transfer_into_the_same_chain_is_rejected() {
    let app = test_app();
    let admin = app.register("Vic", "vic@example.org", None).await;
    let chain_uid = app.create_chain(&admin, "Only").await;
    let member = app.register("Uma", "uma@example.org", None).await;
    app.add_approved(&admin, &member, &chain_uid).await;
    let (_, before) = user_view(&app, &member, "").await;

    let response = app
        .send(json_request(
            "POST",
            "/v2/user/transfer-chain",
            serde_json::json!({ "user_uid": member.uid, "from_chain_uid": chain_uid, "to_chain_uid": chain_uid }),
            Some(&admin.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, after) = user_view(&app, &member, "").await;
    assert_eq!(before["chains"], after["chains"]);
}

#[tokio::test]
async fn transfer_requires_admin_of_destination() {
    let app = test_app();
    let admin = app.register("Yas", "yas@example.org", None).await;
    let from = app.create_chain(&admin, "Mine").await;
    let other = app.register("Zed", "zed@example.org", None).await;
    let to = app.create_chain(&other, "Theirs").await;
    let member = app.register("Abe", "abe@example.org", None).await;
    app.add_approved(&admin, &member, &from).await;

    let response = app
        .send(json_request(
            "POST",
            "/v2/user/transfer-chain",
            serde_json::json!({ "user_uid": member.uid, "from_chain_uid": from, "to_chain_uid": to }),
            Some(&admin.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let root = app.root().await;
    let response = app
        .send(json_request(
            "POST",
            "/v2/user/transfer-chain",
            serde_json::json!({ "user_uid": member.uid, "from_chain_uid": from, "to_chain_uid": to }),
            Some(&root.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let (_, body) = user_view(&app, &member, "").await;
    assert!(membership_in(&body, &from).is_none());
    assert!(membership_in(&body, &to).is_some());
}

#[tokio::test]
async fn withdrawing_legal_acceptance_closes_orphaned_chains() {
    let app = test_app();
    let user = app.register("Bea", "bea@example.org", None).await;
    let sole = app.create_chain(&user, "Sole loop").await;
    let shared = app.create_chain(&user, "Shared loop").await;
    let co_admin = app.register("Col", "col@example.org", None).await;
    app.add_approved(&user, &co_admin, &shared).await;
    app.send(json_request(
        "POST",
        "/v2/chain/add-user",
        serde_json::json!({ "user_uid": co_admin.uid, "chain_uid": shared, "is_chain_admin": true }),
        Some(&user.token),
    ))
    .await;

    let response = app
        .send(json_request(
            "PATCH",
            "/v2/user",
            serde_json::json!({ "accepted_legal": false }),
            Some(&user.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["accepted_legal"], false);
    assert!(
        body["chains"]
            .as_array()
            .expect("chains")
            .iter()
            .all(|m| m["is_chain_admin"] == false)
    );

    let sole_chain = chain(&app, &sole).await;
    assert_eq!(sole_chain["published"], false);
    assert_eq!(sole_chain["open_to_new_members"], false);
    let shared_chain = chain(&app, &shared).await;
    assert_eq!(shared_chain["published"], true);

    let (_, listed) = members(&app, &co_admin, &shared).await;
    for entry in listed.as_array().expect("members") {
        let is_admin = membership_in(entry, &shared).expect("membership")["is_chain_admin"].clone();
        assert_eq!(is_admin, entry["uid"] == co_admin.uid.as_str());
    }

    // No admin is left to publish the orphaned chain again.
    let root = app.root().await;
    let response = app
        .send(json_request(
            "PATCH",
            "/v2/chain",
            serde_json::json!({ "chain_uid": sole, "published": true }),
            Some(&root.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn chain_pause_requires_a_chain() {
    let app = test_app();
    let user = app.register("Dot", "dot@example.org", None).await;
    let response = app
        .send(json_request(
            "PATCH",
            "/v2/user",
            serde_json::json!({ "chain_paused": true }),
            Some(&user.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let chain_uid = app.create_chain(&user, "Dot loop").await;
    let response = app
        .send(json_request(
            "PATCH",
            "/v2/user",
            serde_json::json!({ "user_uid": user.uid, "chain_uid": chain_uid, "chain_paused": true }),
            Some(&user.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(membership_in(&body, &chain_uid).expect("membership")["is_paused"], true);
}

#[tokio::test]
async fn purge_is_self_or_root_and_respects_guards() {
    let app = test_app();
    let owner = app.register("Eda", "eda@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Eda loop").await;
    let member = app.register("Fin", "fin@example.org", None).await;
    app.add_approved(&owner, &member, &chain_uid).await;

    // Chain admins cannot delete members' accounts.
    let response = app
        .send(request(
            "DELETE",
            &format!("/v2/user/purge?user_uid={}", member.uid),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Sole admin with an approved participant left.
    let response = app
        .send(request("DELETE", "/v2/user/purge", Some(&owner.token)))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let (_, view) = user_view(&app, &member, "").await;
    let membership_id = membership_in(&view, &chain_uid).expect("membership")["id"]
        .as_i64()
        .expect("id");
    app.store
        .add_dependent(membership_id, DependentKind::Bag)
        .await
        .expect("bag");
    let response = app
        .send(request("DELETE", "/v2/user/purge", Some(&member.token)))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn purge_dissolves_chains_the_user_ran_alone() {
    let app = test_app();
    let owner = app.register("Gio", "gio@example.org", None).await;
    let chain_uid = app.create_chain(&owner, "Gio loop").await;

    let response = app
        .send(request("DELETE", "/v2/user/purge", Some(&owner.token)))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send(get(&format!("/v2/chain?chain_uid={chain_uid}"), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.send(get("/v2/user", Some(&owner.token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        app.notifier
            .sent()
            .iter()
            .any(|n| n.kind() == "account_deleted")
    );

    // Root may purge anyone.
    let root = app.root().await;
    let other = app.register("Hux", "hux@example.org", None).await;
    let response = app
        .send(request(
            "DELETE",
            &format!("/v2/user/purge?user_uid={}", other.uid),
            Some(&root.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
