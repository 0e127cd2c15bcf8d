mod common;

use std::sync::Arc;

use common::{new_profile, token};
use nostr_directory_bot::{
    commands::Handler,
    config::Config,
    db::Store,
    directory::Directory,
    export::Exporter,
    model::{ChannelId, MessageRef},
    reconcile::PinLedger,
    render::Renderer,
    telegram::{Bot, TelegramChannel, Update},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const GROUP: i64 = -1001;
const SENT_ID: i64 = 500;

struct Bench {
    server: MockServer,
    store: Store,
    handler: Handler,
}

async fn bench(member_status: &str) -> Bench {
    let server = MockServer::start().await;
    let sent = json!({ "message_id": SENT_ID, "chat": { "id": GROUP, "type": "supergroup" } });
    for (api_method, result) in [
        ("sendMessage", sent.clone()),
        ("editMessageText", sent),
        ("pinChatMessage", json!(true)),
        ("answerCallbackQuery", json!(true)),
        ("getChatMember", json!({ "status": member_status })),
    ] {
        Mock::given(method("POST"))
            .and(path(format!("/botTEST/{api_method}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result })),
            )
            .mount(&server)
            .await;
    }

    let config = Arc::new(
        Config::from_lookup(|key| match key {
            "BOT_TOKEN" => Some("TEST".to_owned()),
            "ALLOWED_CHAT_ID" => Some(GROUP.to_string()),
            "EXPORT_PATH" => Some("-".to_owned()),
            _ => None,
        })
        .unwrap(),
    );
    let bot = Bot::with_base_url(&server.uri(), &config.bot_token, 1).unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let exporter = Exporter::new(
        store.clone(),
        config.viewer_base_url.clone(),
        config.export_path.clone(),
        None,
    );
    let directory = Directory::new(
        store.clone(),
        Arc::new(TelegramChannel::new(bot.clone(), config.allowed_thread_id)),
        Renderer::new(config.viewer_base_url.clone(), config.max_chunk_size),
        exporter,
    );
    let handler = Handler::new(bot, store.clone(), directory, config);

    Bench {
        server,
        store,
        handler,
    }
}

impl Bench {
    /// Bodies of every call made to `api_method`, in order.
    async fn calls(&self, api_method: &str) -> Vec<Value> {
        let suffix = format!("/{api_method}");
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|request| request.url.path().ends_with(&suffix))
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }
}

fn text_update(chat_id: i64, user_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 1,
        "message": {
            "message_id": 42,
            "chat": { "id": chat_id, "type": "supergroup" },
            "from": { "id": user_id, "first_name": "Bea", "username": format!("user{user_id}") },
            "text": text,
        }
    }))
    .unwrap()
}

fn consent_update(from: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 2,
        "callback_query": {
            "id": "cb-1",
            "from": { "id": from, "first_name": "Bea" },
            "message": {
                "message_id": 77,
                "chat": { "id": GROUP, "type": "supergroup" },
                "text": "Profile added"
            },
            "data": data,
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn new_token_is_listed_and_pinned() {
    let bench = bench("member").await;

    bench
        .handler
        .handle(text_update(GROUP, 2, &format!("my key: {}", token(2))))
        .await
        .unwrap();

    let profile = bench.store.find_by_owner(2).await.unwrap().unwrap();
    assert_eq!(profile.token, token(2));
    assert!(!profile.public_consent);

    let sends = bench.calls("sendMessage").await;
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0]["reply_parameters"]["message_id"], 42);
    assert_eq!(
        sends[0]["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
        "consent_yes_2"
    );
    assert!(sends[1].get("reply_parameters").is_none());
    assert!(sends[1]["text"].as_str().unwrap().contains("1. @user2"));

    assert_eq!(bench.calls("pinChatMessage").await.len(), 1);
    let current = bench.store.current(ChannelId(GROUP)).await.unwrap().unwrap();
    assert_eq!(current.message, MessageRef(SENT_ID));
}

#[tokio::test]
async fn token_of_another_owner_is_refused_without_refresh() {
    let bench = bench("member").await;
    bench.store.insert_if_absent(&new_profile(1)).await.unwrap();

    bench
        .handler
        .handle(text_update(GROUP, 2, token(1).as_str()))
        .await
        .unwrap();

    let sends = bench.calls("sendMessage").await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0]["reply_parameters"]["message_id"], 42);
    assert!(sends[0]["text"].as_str().unwrap().contains("already registered by another user"));
    assert!(bench.calls("pinChatMessage").await.is_empty());
    assert!(bench.calls("editMessageText").await.is_empty());
    assert!(bench.store.current(ChannelId(GROUP)).await.unwrap().is_none());
    assert!(bench.store.find_by_owner(2).await.unwrap().is_none());
    assert_eq!(bench.store.find_by_owner(1).await.unwrap().unwrap().token, token(1));
}

#[tokio::test]
async fn tokens_outside_the_group_are_ignored() {
    let bench = bench("member").await;

    bench
        .handler
        .handle(text_update(555, 2, token(2).as_str()))
        .await
        .unwrap();

    assert!(bench.server.received_requests().await.unwrap().is_empty());
    assert_eq!(bench.store.count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn consent_answer_from_someone_else_is_refused() {
    let bench = bench("member").await;
    bench.store.insert_if_absent(&new_profile(1)).await.unwrap();

    bench.handler.handle(consent_update(2, "consent_yes_1")).await.unwrap();

    let answers = bench.calls("answerCallbackQuery").await;
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["callback_query_id"], "cb-1");
    assert_eq!(answers[0]["show_alert"], true);
    assert!(bench.calls("editMessageText").await.is_empty());
    assert!(!bench.store.find_by_owner(1).await.unwrap().unwrap().public_consent);
}

#[tokio::test]
async fn owner_consent_is_stored_and_prompt_updated() {
    let bench = bench("member").await;
    bench.store.insert_if_absent(&new_profile(1)).await.unwrap();

    bench.handler.handle(consent_update(1, "consent_yes_1")).await.unwrap();

    assert!(bench.store.find_by_owner(1).await.unwrap().unwrap().public_consent);
    let edits = bench.calls("editMessageText").await;
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0]["message_id"], 77);
    let answers = bench.calls("answerCallbackQuery").await;
    assert_eq!(answers[0]["show_alert"], false);
}

#[tokio::test]
async fn admin_rights_are_checked_in_the_directory_group() {
    let bench = bench("administrator").await;

    bench
        .handler
        .handle(text_update(555, 9, "/directorio@NostrFacilBot"))
        .await
        .unwrap();

    let lookups = bench.calls("getChatMember").await;
    assert_eq!(lookups, vec![json!({ "chat_id": GROUP, "user_id": 9 })]);
    assert_eq!(bench.calls("pinChatMessage").await.len(), 1);
    assert!(bench.store.current(ChannelId(GROUP)).await.unwrap().is_some());
}

#[tokio::test]
async fn admins_of_other_chats_cannot_refresh() {
    let bench = bench("member").await;

    bench
        .handler
        .handle(text_update(555, 9, "/directorio"))
        .await
        .unwrap();

    let lookups = bench.calls("getChatMember").await;
    assert_eq!(lookups[0]["chat_id"], GROUP);
    let sends = bench.calls("sendMessage").await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0]["chat_id"], 555);
    assert!(sends[0]["text"].as_str().unwrap().contains("Only administrators"));
    assert!(bench.calls("pinChatMessage").await.is_empty());
}
