//! Hot reload: filter swaps, settings, new bot apps and the file watcher.

mod common;

use common::*;
use onebot_filter::config::ConfigWatcher;
use onebot_filter::lifecycle::ReloadCoordinator;
use onebot_filter::link::LinkState;
use std::fs;
use std::time::Duration;
use tokio::time::timeout;

fn blocking(word: &str) -> String {
    format!(
        r#"
        [[bot-apps]]
        name = "a"
        uri = "ws://127.0.0.1:1/"

        [bot-apps.private-message]
        mode = "blacklist"
        filters = ["{}"]
        "#,
        word
    )
}

#[tokio::test]
async fn reload_swaps_filter_for_next_frame() {
    let config = config(&blocking("spam"));
    let (relay, _dialer, mut peers) = relay(&config);
    let mut handles = relay.start_all(&config).unwrap();
    let (_, mut link) = next_peer(&mut peers).await;
    wait_for_state(&mut handles[0].state, LinkState::Connected).await;
    let upstream = attach_upstream(&relay);

    upstream.tx.send(private_message(1, "spam")).await.unwrap();
    assert_silent(&mut link).await;

    let outcome = ReloadCoordinator::new(relay.clone()).apply(&self::config(&blocking("eggs")));
    assert_eq!(outcome.recompiled, 1);
    assert!(outcome.started.is_empty());

    let spam = private_message(1, "spam");
    upstream.tx.send(spam.clone()).await.unwrap();
    assert_eq!(recv(&mut link).await, spam);
    upstream.tx.send(private_message(1, "eggs")).await.unwrap();
    assert_silent(&mut link).await;

    // Same link, no reconnect.
    assert!(peers.try_recv().is_err());
    relay.shutdown();
}

#[tokio::test]
async fn invalid_reload_changes_nothing() {
    let config = config(&blocking("spam"));
    let (relay, _dialer, mut peers) = relay(&config);
    let mut handles = relay.start_all(&config).unwrap();
    let (_, mut link) = next_peer(&mut peers).await;
    wait_for_state(&mut handles[0].state, LinkState::Connected).await;
    let upstream = attach_upstream(&relay);

    let mut broken = config.clone();
    broken.server.sleep_time = 9.0;
    broken.bot_apps[0].private_message.as_mut().unwrap().mode = "sometimes".into();

    let outcome = ReloadCoordinator::new(relay.clone()).apply(&broken);
    assert_eq!(outcome.recompiled, 0);
    assert_eq!(relay.settings().reconnect_interval, config.server.reconnect_interval());

    upstream.tx.send(private_message(1, "spam")).await.unwrap();
    assert_silent(&mut link).await;
    relay.shutdown();
}

#[tokio::test]
async fn new_bot_apps_start_and_removed_ones_keep_running() {
    let config = config(&blocking("spam"));
    let (relay, _dialer, mut peers) = relay(&config);
    let mut handles = relay.start_all(&config).unwrap();
    let (_, mut first) = next_peer(&mut peers).await;
    wait_for_state(&mut handles[0].state, LinkState::Connected).await;

    let replacement = self::config(
        r#"
        [[bot-apps]]
        name = "b"
        uri = "ws://127.0.0.1:1/b"
        "#,
    );
    let mut outcome = ReloadCoordinator::new(relay.clone()).apply(&replacement);
    assert_eq!(outcome.started.len(), 1);
    assert_eq!(outcome.started[0].name, "b");

    let (target, mut second) = next_peer(&mut peers).await;
    assert_eq!(target.name, "b");
    wait_for_state(&mut outcome.started[0].state, LinkState::Connected).await;

    let mut names = relay.hub().link_names();
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

    let upstream = attach_upstream(&relay);
    let hello = private_message(1, "hello");
    upstream.tx.send(hello.clone()).await.unwrap();
    assert_eq!(recv(&mut first).await, hello);
    assert_eq!(recv(&mut second).await, hello);

    relay.shutdown();
}

#[tokio::test]
async fn reload_replaces_link_settings() {
    let config = config(&blocking("spam"));
    let (relay, _dialer, _peers) = relay(&config);
    assert!(relay.settings().debug);

    let mut updated = config.clone();
    updated.server.debug = false;
    updated.server.sleep_time = 1.5;
    updated.server.queue_capacity = 4;
    ReloadCoordinator::new(relay.clone()).apply(&updated);

    let settings = relay.settings();
    assert!(!settings.debug);
    assert_eq!(settings.reconnect_interval, Duration::from_millis(1500));
    assert_eq!(settings.queue_capacity, 4);
}

#[tokio::test]
async fn watcher_forwards_valid_changes_only() {
    let dir = std::env::temp_dir().join(format!("onebot-filter-watch-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    fs::write(&path, "[server]\nbot-id = \"1\"\n").unwrap();

    let (watcher, mut updates) = ConfigWatcher::new(&path);
    let _guard = watcher.run().unwrap();

    fs::write(&path, "[server]\nport = 0\n").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(&path, "[server]\nbot-id = \"2\"\n").unwrap();

    let config = loop {
        let config = timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("no update in time")
            .unwrap();
        if config.server.bot_id == "2" {
            break config;
        }
        assert_eq!(config.server.bot_id, "1");
    };
    assert_eq!(config.server.port, 5700);

    fs::remove_dir_all(&dir).unwrap_or_default();
}
