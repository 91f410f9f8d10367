//! End-to-end command tests over a fully wired dispatcher.

mod common;

use attribute_store::{AttributeStore, Scope, TIMEZONE, TIME_FORMAT};
use chat_bot::commands;
use chat_bot::Bot;
use chat_dispatch::{Dispatch, Envelope, Privilege, GENERIC_FAILURE};
use common::{test_config, texts, Harness};
use relay_client::{ChatLine, RelayClient, SenderPrivilege};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---- clock ----

#[tokio::test]
async fn test_settz_and_gettz() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".settz America/New_York").await;
    assert_eq!(reply, vec!["I now have you in the America/New_York time zone."]);

    let reply = h.say("alice", "#chan", ".gettz").await;
    assert_eq!(reply, vec!["alice's time zone is America/New_York."]);

    let reply = h.say("alice", "#chan", ".gettz bob").await;
    assert_eq!(reply, vec!["bob has not set their time zone."]);
}

#[tokio::test]
async fn test_settz_short_name_warns() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".settz UTC").await;
    assert_eq!(
        reply,
        vec!["Okay, alice, but you should use a region/city name like Europe/Berlin if you use DST."]
    );
    assert_eq!(
        h.store.get(Scope::User, "alice", TIMEZONE).await.as_deref(),
        Some("UTC")
    );
}

#[tokio::test]
async fn test_settz_invalid_zone() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".settz Mars/Olympus").await;
    assert_eq!(
        reply,
        vec!["I don't know the time zone Mars/Olympus. Try a name like America/New_York."]
    );
    assert!(h.store.get(Scope::User, "alice", TIMEZONE).await.is_none());
}

#[tokio::test]
async fn test_user_format_and_time() {
    let h = Harness::new().await;

    h.say("alice", "#chan", ".settz Asia/Tokyo").await;
    let reply = h.say("alice", "#chan", ".settf %Z").await;
    assert_eq!(
        reply,
        vec!["Got it. Your time will now appear as JST. (If the timezone is wrong, try .settz)"]
    );

    assert_eq!(h.say("alice", "#chan", ".t").await, vec!["JST"]);
    assert_eq!(h.say("alice", "#chan", ".gettf").await, vec!["alice's time format is %Z."]);

    // An explicit zone wins over the stored one.
    assert_eq!(h.say("alice", "#chan", ".t Asia/Kolkata").await, vec!["IST"]);
}

#[tokio::test]
async fn test_time_for_nick() {
    let h = Harness::new().await;

    h.say("bob", "#chan", ".settz Asia/Kolkata").await;
    h.say("alice", "#chan", ".settz Asia/Tokyo").await;
    h.say("alice", "#chan", ".settf %Z").await;

    // Bob's zone, alice's format.
    assert_eq!(h.say("alice", "#chan", ".t BOB").await, vec!["IST"]);
}

#[tokio::test]
async fn test_time_unknown_argument_falls_back() {
    let h = Harness::new().await;

    h.say("alice", "#chan", ".settz Asia/Tokyo").await;
    h.say("alice", "#chan", ".settf %Z").await;

    let reply = h.say("alice", "#chan", ".t nowhere").await;
    assert_eq!(reply.len(), 2);
    assert_eq!(reply[0], "JST");
    assert_eq!(
        reply[1],
        "nowhere is not a valid timezone and has not used .settz, falling back to your defaults."
    );
}

#[tokio::test]
async fn test_settf_rejects_bad_format() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".settf %Q").await;
    assert_eq!(reply.len(), 1);
    assert!(reply[0].starts_with("That format doesn't work."));
}

#[tokio::test]
async fn test_channel_zone_and_format() {
    let h = Harness::new().await;

    let reply = h.say_as_op("op", "#india", ".setctz Asia/Kolkata").await;
    assert_eq!(reply, vec!["#india is now in the Asia/Kolkata time zone."]);

    let reply = h.say_as_op("op", "#india", ".setctf %Z").await;
    assert_eq!(
        reply,
        vec!["Got it. Times in #india will now appear as IST. (If the timezone is wrong, try .setctz)"]
    );

    // No user settings: the channel's apply.
    assert_eq!(h.say("carol", "#india", ".t").await, vec!["IST"]);

    // User zone first, channel format next.
    h.say("alice", "#india", ".settz Asia/Tokyo").await;
    assert_eq!(h.say("alice", "#india", ".t").await, vec!["JST"]);

    // Elsewhere the configured default format applies.
    let reply = h.say("carol", "#elsewhere", ".t").await;
    assert!(reply[0].ends_with("UTC"), "{reply:?}");

    assert_eq!(
        h.say("carol", "#india", ".getctz").await,
        vec!["#india's time zone is Asia/Kolkata."]
    );
    assert_eq!(
        h.say("carol", "#india", ".getctz #nowhere").await,
        vec!["#nowhere has no preferred time zone."]
    );
}

#[tokio::test]
async fn test_setctz_requires_operator_in_channel() {
    let h = Harness::new().await;

    // Non-operators fall through to the line collector.
    let result = h
        .dispatch(&Envelope::channel("carol", "#chan"), ".setctz Asia/Tokyo")
        .await;
    assert_eq!(result.route(), Some("quote.collect"));
    assert!(result.reply().unwrap().is_empty());

    let private = Envelope::private("op").with_privilege(Privilege::Operator);
    let result = h.dispatch(&private, ".setctz Asia/Tokyo").await;
    assert!(matches!(result, Dispatch::NoMatch));

    assert!(h.store.get(Scope::Channel, "#chan", TIMEZONE).await.is_none());
}

#[tokio::test]
async fn test_private_lines_ignore_channel_settings() {
    let h = Harness::new().await;

    h.say_as_op("op", "#india", ".setctz Asia/Kolkata").await;

    assert_eq!(h.pm("carol", ".getctz").await, vec!["Which channel?"]);

    let reply = h.pm("carol", ".t").await;
    assert!(reply[0].ends_with("UTC"), "{reply:?}");
}

#[tokio::test]
async fn test_time_for_channel_and_any_case_zone() {
    let h = Harness::new().await;

    h.say_as_op("op", "#india", ".setctz Asia/Kolkata").await;
    h.say("alice", "#chan", ".settf %Z").await;

    assert_eq!(h.say("alice", "#chan", ".t #india").await, vec!["IST"]);
    assert_eq!(h.say("alice", "#chan", ".t #INDIA").await, vec!["IST"]);
    assert_eq!(h.say("alice", "#chan", ".t utc").await, vec!["UTC"]);
    assert_eq!(h.say("alice", "#chan", ".t asia/tokyo").await, vec!["JST"]);

    h.say("bob", "#chan", ".settz asia/tokyo").await;
    assert_eq!(
        h.store.get(Scope::User, "bob", TIMEZONE).await.as_deref(),
        Some("Asia/Tokyo")
    );
}

#[tokio::test]
async fn test_settf_rejects_multiline_format() {
    let h = Harness::new().await;

    h.say("alice", "#chan", ".settf %Z").await;

    let reply = h.say("alice", "#chan", ".settf %Y%n%H").await;
    assert_eq!(
        reply,
        vec!["That format doesn't fit on one line. Try a strftime format like %Y-%m-%d %H:%M."]
    );
    assert_eq!(
        h.store.get(Scope::User, "alice", TIME_FORMAT).await.as_deref(),
        Some("%Z")
    );
}

#[tokio::test]
async fn test_guesstz_with_date_string() {
    let h = Harness::new().await;
    let admin = Envelope::channel("root", "#chan").with_privilege(Privilege::Admin);

    let reply = texts(
        h.dispatch(&admin, ".guesstz bob 2024-01-15 21:00:00 +0900")
            .await,
    );
    assert_eq!(reply, vec!["Set the time zone of bob to Asia/Tokyo."]);
    assert_eq!(
        h.store.get(Scope::User, "Bob", TIMEZONE).await.as_deref(),
        Some("Asia/Tokyo")
    );

    let reply = texts(h.dispatch(&admin, ".guesstz bob whenever").await);
    assert_eq!(reply, vec!["Cannot parse bob's date string whenever."]);

    let reply = texts(
        h.dispatch(&admin, ".guesstz bob 2024-01-15 13:15:00 +0115")
            .await,
    );
    assert_eq!(reply, vec!["Could not find a time zone for UTC offset +01:15."]);
}

#[tokio::test]
async fn test_guesstz_for_someone_else_needs_admin() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".guesstz bob").await;
    assert_eq!(reply, vec!["Only admins can guess someone else's time zone."]);
    assert!(!h.time_requests.is_pending("bob"));
}

#[tokio::test]
async fn test_guesstz_asks_client_time() {
    let h = Harness::new().await;

    let result = h
        .dispatch(&Envelope::channel("alice", "#chan"), ".guesstz")
        .await;
    let sent: Vec<(String, String)> = result
        .reply()
        .unwrap()
        .addressed("#chan")
        .map(|(t, m)| (t.to_string(), m.to_string()))
        .collect();
    assert_eq!(
        sent,
        vec![
            ("#chan".to_string(), "Sending CTCP TIME to alice.".to_string()),
            ("alice".to_string(), "\x01TIME\x01".to_string()),
        ]
    );
    assert!(h.time_requests.is_pending("Alice"));

    // The client's answer is announced where the request was made.
    let answer = h
        .dispatch(
            &Envelope::private("alice"),
            "\x01TIME 2024-01-15 17:30:00 +0530\x01",
        )
        .await;
    assert_eq!(answer.route(), Some("clock.timeanswer"));
    let announced: Vec<(String, String)> = answer
        .reply()
        .unwrap()
        .addressed("alice")
        .map(|(t, m)| (t.to_string(), m.to_string()))
        .collect();
    assert_eq!(
        announced,
        vec![(
            "#chan".to_string(),
            "Set the time zone of alice to Asia/Calcutta.".to_string()
        )]
    );
    assert_eq!(
        h.store.get(Scope::User, "alice", TIMEZONE).await.as_deref(),
        Some("Asia/Calcutta")
    );
    assert!(!h.time_requests.is_pending("alice"));
}

#[tokio::test]
async fn test_unrequested_time_answer_is_ignored() {
    let h = Harness::new().await;

    let reply = h.pm("mallory", "\x01TIME 2024-01-15 21:00:00 +0900\x01").await;
    assert!(reply.is_empty());
    assert!(h.store.get(Scope::User, "mallory", TIMEZONE).await.is_none());
}

#[tokio::test]
async fn test_settings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("attributes.json");
    let config = test_config();

    {
        let specs = commands::attribute_specs(&config).unwrap();
        let store = AttributeStore::open(&file, specs).await.unwrap();
        let h = Harness::with_store(config.clone(), store).await;
        h.say("alice", "#chan", ".settz Asia/Tokyo").await;
    }

    let specs = commands::attribute_specs(&config).unwrap();
    let store = AttributeStore::open(&file, specs).await.unwrap();
    assert_eq!(
        store.get(Scope::User, "Alice", TIMEZONE).await.as_deref(),
        Some("Asia/Tokyo")
    );
}

// ---- help ----

#[tokio::test]
async fn test_help_lists_groups() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".help").await;
    assert!(reply.iter().any(|l| l.starts_with("CLOCK   t  settz")), "{reply:?}");
    assert!(reply.iter().any(|l| l.starts_with("QUOTE   quote add")), "{reply:?}");
    assert_eq!(
        reply.last().unwrap(),
        "You can see more info about any of these commands by doing .help <command> (e.g. .help time)"
    );
}

#[tokio::test]
async fn test_help_for_command() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".help settz").await;
    assert_eq!(
        reply,
        vec![
            "Set your preferred time zone.",
            "Use a region/city name from the IANA tz database.",
            "e.g. .settz America/New_York",
        ]
    );

    let reply = h.say("alice", "#chan", ".help nosuch").await;
    assert_eq!(reply, vec!["I don't know a command called nosuch."]);
}

#[tokio::test]
async fn test_long_help_goes_private() {
    let h = Harness::new().await;

    let result = h
        .dispatch(&Envelope::channel("alice", "#chan"), ".help quote add")
        .await;
    let reply = result.reply().unwrap();
    let lines: Vec<_> = reply.addressed("#chan").collect();

    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0].0, "#chan");
    assert!(lines[1..].iter().all(|(target, _)| *target == "alice"));
    assert_eq!(lines[4].1, "e.g. .quote add Skye: are you a goddess?");

    // Asked privately, the doc comes back directly.
    let reply = h.pm("alice", ".help quote add").await;
    assert_eq!(reply.len(), 4);
}

#[tokio::test]
async fn test_addressed_help_and_version() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", "quotebot: help gettz").await;
    assert_eq!(
        reply,
        vec![
            "Gets a user's preferred time zone, yours if no nick is given.",
            "e.g. .gettz [nick]",
        ]
    );

    let reply = h.say("alice", "#chan", ".version").await;
    assert_eq!(
        reply,
        vec![format!("quotebot - version {}", env!("CARGO_PKG_VERSION"))]
    );
}

#[tokio::test]
async fn test_info() {
    let h = Harness::new().await;

    let reply = h.say("alice", "#chan", ".info").await;
    assert_eq!(reply.len(), 2);
    assert!(reply[0].starts_with(&format!("quotebot - version {} - ", env!("CARGO_PKG_VERSION"))));
    assert_eq!(reply[1], "For a list of commands, use '.commands' with no parameters.");

    assert_eq!(h.say("alice", "#chan", ".help info").await.len(), 2);
}

// ---- quote ----

#[tokio::test]
async fn test_quote_add_show_info_delete() {
    let h = Harness::new().await;

    h.say("bob", "#chan", "pizza is the best food").await;

    let reply = h.say("alice", "#chan", ".quote add bob: pizza is _").await;
    assert_eq!(reply, vec!["Quote #1 added: pizza is _"]);

    assert_eq!(h.say("alice", "#chan", ".quote show 1").await, vec!["[1] pizza is _"]);

    let reply = h.say("alice", "#chan", ".quote info 1").await;
    assert_eq!(reply.len(), 2);
    assert!(reply[0].starts_with("Quote #1 by bob in #chan, added by alice on "));
    assert_eq!(reply[1], "Original line: pizza is the best food");

    assert_eq!(h.say("alice", "#chan", ".quote delete 1").await, vec!["Deleted quote #1."]);
    assert_eq!(h.say("alice", "#chan", ".quote show 1").await, vec!["There is no quote #1."]);
}

#[tokio::test]
async fn test_quote_add_requires_recent_line() {
    let h = Harness::new().await;

    h.say("bob", "#chan", "i like trains").await;
    // Lines in another channel do not count.
    h.say("bob", "#other", "i hate trains").await;

    let reply = h.say("alice", "#chan", ".quote add bob: i hate trains").await;
    assert_eq!(reply, vec!["I cannot validate bob said i hate trains"]);
    assert_eq!(h.quotes.ledger().count().await.unwrap(), 0);

    // Commands are not collected as quotable lines.
    h.say("bob", "#chan", ".help").await;
    let reply = h.say("alice", "#chan", ".quote add bob: .help").await;
    assert_eq!(reply, vec!["I cannot validate bob said .help"]);
}

#[tokio::test]
async fn test_quote_random_list_and_empty() {
    let h = Harness::new().await;

    assert_eq!(
        h.say("alice", "#chan", ".quote random").await,
        vec!["There are no quotes in the database."]
    );

    h.say("bob", "#chan", "hello world").await;
    h.say("bob", "#chan", "goodbye world").await;
    h.say("alice", "#chan", ".quote add bob: hello world").await;
    h.say("alice", "#chan", ".quote add bob: goodbye world").await;

    let reply = h.say("alice", "#chan", ".quote random bob").await;
    assert!(
        reply == vec!["[1] hello world"] || reply == vec!["[2] goodbye world"],
        "{reply:?}"
    );

    assert_eq!(
        h.say("alice", "#chan", ".quote random carol").await,
        vec!["There are no quotes from carol in the database."]
    );

    assert_eq!(
        h.say("alice", "#chan", ".quote list").await,
        vec!["[1] hello world, [2] goodbye world"]
    );
}

#[tokio::test]
async fn test_quote_find_most_recent() {
    let h = Harness::new().await;

    h.say("bob", "#chan", "the cake is a lie").await;
    h.say("alice", "#chan", ".quote add bob: the cake is a lie").await;
    h.say("bob", "#chan", "cake for everyone").await;
    h.say("alice", "#chan", ".quote add bob: cake for everyone").await;

    assert_eq!(
        h.say("alice", "#chan", ".quote find cake").await,
        vec!["[2] cake for everyone"]
    );
    assert_eq!(
        h.say("alice", "#chan", ".quote find pie").await,
        vec!["No quote matches pie."]
    );
}

#[tokio::test]
async fn test_quote_show_bad_id() {
    let h = Harness::new().await;

    assert_eq!(h.say("alice", "#chan", ".quote show abc").await, vec![GENERIC_FAILURE]);
}

#[tokio::test]
async fn test_forceadd_needs_admin() {
    let h = Harness::new().await;

    let result = h
        .dispatch(&Envelope::channel("alice", "#chan"), ".quote forceadd bob: never said")
        .await;
    assert_eq!(result.route(), Some("quote.collect"));
    assert_eq!(h.quotes.ledger().count().await.unwrap(), 0);

    let admin = Envelope::channel("root", "#chan").with_privilege(Privilege::Admin);
    let reply = texts(h.dispatch(&admin, ".quote forceadd bob: never said").await);
    assert_eq!(reply, vec!["Quote #1 added: never said"]);
}

#[tokio::test]
async fn test_import_from_other_bot() {
    let old = Harness::new().await;
    let new = Harness::new().await;

    old.say("bob", "#chan", "first!").await;
    old.say("alice", "#chan", ".quote add bob: first!").await;
    old.say("carol", "#chan", "second").await;
    old.say("alice", "#chan", ".quote add carol: second").await;

    // The new bot's admin opens the import.
    let admin = Envelope::private("root").with_privilege(Privilege::Admin);
    let result = new.dispatch(&admin, ".quote importfrom oldbot").await;
    let request: Vec<(String, String)> = result
        .reply()
        .unwrap()
        .addressed("root")
        .map(|(t, m)| (t.to_string(), m.to_string()))
        .collect();
    assert_eq!(
        request,
        vec![
            ("oldbot".to_string(), ".quote exportlistto quotebot".to_string()),
            ("root".to_string(), "Asked oldbot to send me their quotes.".to_string()),
        ]
    );
    assert!(new.quotes.is_importing("OldBot"));

    // The old bot answers the request privately.
    let export = old.dispatch(&Envelope::private("quotebot"), &request[0].1).await;
    let export: Vec<(String, String)> = export
        .reply()
        .unwrap()
        .addressed("quotebot")
        .map(|(t, m)| (t.to_string(), m.to_string()))
        .collect();
    assert_eq!(export.len(), 3);
    assert!(export.iter().all(|(target, _)| target == "quotebot"));

    // And the new bot receives the lines from oldbot.
    let mut last = Vec::new();
    for (_, line) in &export {
        last = new.pm("oldbot", line).await;
    }
    assert_eq!(last, vec!["Imported 2 quotes."]);
    assert!(!new.quotes.is_importing("oldbot"));

    assert_eq!(new.say("alice", "#chan", ".quote show 2").await, vec!["[2] second"]);
    let info = new.say("alice", "#chan", ".quote info 1").await;
    assert!(info[0].starts_with("Quote #1 by bob in #chan, added by alice"));
}

#[tokio::test]
async fn test_import_without_session_is_rejected() {
    let h = Harness::new().await;

    let record = r##"{"user":"bob","channel":"#chan","quote_text":"x","source_text":"x","submitter":"eve","timestamp":"2024-01-01T00:00:00Z"}"##;
    let reply = h.pm("mallory", &format!(".quote import {record}")).await;
    assert_eq!(reply, vec!["mallory is not an importer"]);

    let reply = h.pm("mallory", ".quote importdone").await;
    assert_eq!(reply, vec!["mallory is not an importer"]);

    assert_eq!(h.quotes.ledger().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_import_session_expires() {
    let h = Harness::new().await;

    let admin = Envelope::private("root").with_privilege(Privilege::Admin);
    h.dispatch(&admin, ".quote importfrom oldbot").await;
    assert!(h.quotes.is_importing("oldbot"));

    // A record arriving after the session timed out is refused.
    let record = r##"{"user":"bob","channel":"#chan","quote_text":"x","source_text":"x","submitter":"eve","timestamp":"2024-01-01T00:00:00Z"}"##;
    let late = Envelope::private("oldbot").with_received_at(chrono::Utc::now() + chrono::Duration::hours(1));
    let reply = texts(h.dispatch(&late, &format!(".quote import {record}")).await);
    assert_eq!(reply, vec!["oldbot is not an importer"]);
    assert_eq!(h.quotes.ledger().count().await.unwrap(), 0);

    // The cleanup drops the session and idle line history.
    h.say("bob", "#chan", "hello").await;
    assert!(!h.quotes.recent().is_empty());
    assert_eq!(h.quotes.expire(chrono::Utc::now() + chrono::Duration::days(2)), 1);
    assert!(!h.quotes.is_importing("oldbot"));
    assert!(h.quotes.recent().is_empty());
}

// ---- query ----

#[tokio::test]
async fn test_query_command() {
    let h = Harness::new().await;

    assert_eq!(h.say("alice", "#chan", ".wa 6*7").await, vec!["42"]);
    assert_eq!(h.pm("alice", ".wolfram 6*7").await, vec!["42"]);
    assert_eq!(h.say("alice", "#chan", ".wa").await, vec!["No question received."]);
}

// ---- bot over the relay ----

fn line(sender: &str, channel: Option<&str>, text: &str) -> ChatLine {
    ChatLine {
        sender: sender.to_string(),
        text: text.to_string(),
        received_at: chrono::Utc::now(),
        channel: channel.map(String::from),
        privilege: SenderPrivilege::None,
    }
}

async fn bot_for(server: &MockServer) -> Bot {
    let Harness {
        dispatcher, config, ..
    } = Harness::new().await;
    let relay = RelayClient::new(&server.uri(), "quotebot", Duration::from_secs(5)).unwrap();
    Bot::new(Arc::new(dispatcher), Arc::new(relay), config.bot.admin_list())
}

#[tokio::test]
async fn test_bot_configured_admin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(body_json(serde_json::json!({
            "target": "#chan",
            "message": "Quote #1 added: hi"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let bot = bot_for(&server).await;

    let envelope = bot.envelope_for(&line("ROOT", Some("#chan"), "x"));
    assert_eq!(envelope.privilege, Privilege::Admin);

    let sent = bot
        .handle_line(&line("root", Some("#chan"), ".quote forceadd bob: hi"))
        .await;
    assert_eq!(sent, 1);
}

#[tokio::test]
async fn test_bot_private_reply_goes_to_sender() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(body_string_contains(r#""target":"alice""#))
        .and(body_string_contains("JST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let bot = bot_for(&server).await;
    let sent = bot.handle_line(&line("alice", None, ".t Asia/Tokyo")).await;
    assert_eq!(sent, 1);

    // Unmatched private lines send nothing.
    assert_eq!(bot.handle_line(&line("alice", None, "hello")).await, 0);
}

#[tokio::test]
async fn test_bot_relay_privilege_mapping() {
    let server = MockServer::start().await;
    let bot = bot_for(&server).await;

    let mut voiced = line("v", Some("#chan"), "x");
    voiced.privilege = SenderPrivilege::Voice;
    assert_eq!(bot.envelope_for(&voiced).privilege, Privilege::None);

    let mut op = line("o", Some("#chan"), "x");
    op.privilege = SenderPrivilege::Operator;
    assert_eq!(bot.envelope_for(&op).privilege, Privilege::Operator);

    let mut earlier = line("o", None, "x");
    earlier.received_at -= chrono::Duration::minutes(3);
    assert_eq!(bot.envelope_for(&earlier).received_at, earlier.received_at);
}

#[tokio::test]
async fn test_serve_stops_while_workers_are_busy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let bot = Arc::new(bot_for(&server).await);
    let permits = Arc::new(Semaphore::new(1));
    let lines = tokio_stream::iter(vec![
        line("alice", None, ".t"),
        line("bob", None, ".t"),
    ])
    .chain(tokio_stream::pending());
    let shutdown = tokio::time::sleep(Duration::from_millis(200));

    let taken = tokio::time::timeout(
        Duration::from_secs(2),
        bot.serve(lines, permits.clone(), shutdown),
    )
    .await
    .expect("serve ignored the shutdown");

    // The first line is still being sent when the loop stops.
    assert_eq!(taken, 1);
    assert_eq!(permits.available_permits(), 0);
}
