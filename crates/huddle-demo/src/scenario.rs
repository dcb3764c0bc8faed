//! The scripted scenarios the demo replays against the in-memory backend

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use huddle_core::{
    AuthUser, Coordinate, MemoryStore, PositionSample, PresenceConfig, ScriptedPositionProvider,
    StaticAuth, Table,
};
use huddle_presence::{PresenceSession, SessionDeps, SessionHandle};
use huddle_social::SocialClient;
use serde_json::json;
use tracing::info;

use crate::console::{ConsoleNotifier, ConsolePresenter};

/// Meters per degree of latitude on the mean-radius sphere
const METERS_PER_DEGREE: f64 = 111_195.0;

/// Where the walk starts
const START: (f64, f64) = (52.5200, 13.4050);

/// Defaults, then the TOML file if given, then `HUDDLE_*` overrides
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PresenceConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            PresenceConfig::from_toml_str(&text)?
        }
        None => PresenceConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn seed_friends(store: &MemoryStore) {
    let now = Utc::now();
    store.seed(
        Table::Profiles,
        [
            json!({ "id": "alice", "username": "Alice", "email": "alice@example.com" }),
            json!({
                "id": "bob",
                "username": "Bob",
                "email": "bob@example.com",
                "is_online": true,
            }),
            json!({
                "id": "carol",
                "username": "Carol",
                "email": "carol@example.com",
                "is_online": true,
            }),
        ],
    );
    store.seed(
        Table::Friendships,
        ["bob", "carol"].map(|friend| {
            json!({
                "user_id": "alice",
                "friend_id": friend,
                "status": "accepted",
                "created_at": now,
            })
        }),
    );
    // Bob waits 30 m north of the start, Carol 150 m east
    store.seed(
        Table::UserLocations,
        [
            json!({
                "user_id": "bob",
                "latitude": START.0 + 30.0 / METERS_PER_DEGREE,
                "longitude": START.1,
                "updated_at": now,
            }),
            json!({
                "user_id": "carol",
                "latitude": START.0,
                "longitude": START.1 + 150.0 / (METERS_PER_DEGREE * START.0.to_radians().cos()),
                "updated_at": now,
            }),
        ],
    );
}

/// Walk north one fix at a time, printing the nearest friend after each
pub async fn walk(
    steps: u32,
    step_meters: f64,
    pace: Duration,
    mut config: PresenceConfig,
) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    seed_friends(&store);
    let positions = Arc::new(ScriptedPositionProvider::new());
    let auth = Arc::new(StaticAuth::signed_in(AuthUser::new("alice", "alice@example.com")));

    // Publish every fix so friends would see each step
    config = config.with_location_update_interval(pace.max(Duration::from_millis(1)));

    let start = Coordinate::new(START.0, START.1)?;
    positions.queue_current(Ok(PositionSample::new(start, Utc::now())));

    let deps = SessionDeps::new(
        auth,
        store,
        positions.clone(),
        Arc::new(ConsoleNotifier),
        Arc::new(ConsolePresenter),
    );
    println!(
        "Walking {} x {:.0}m north, alert threshold {:.0}m",
        steps, step_meters, config.max_distance_alert_m
    );
    let handle = PresenceSession::start(deps, config).await?;
    wait_for_fix(&handle, start).await?;
    print_nearest(&handle, 0, 0.0);

    for step in 1..=steps {
        tokio::time::sleep(pace).await;
        let walked = f64::from(step) * step_meters;
        let here = Coordinate::new(START.0 + walked / METERS_PER_DEGREE, START.1)?;
        positions.push(Ok(PositionSample::new(here, Utc::now())));
        wait_for_fix(&handle, here).await?;
        print_nearest(&handle, step, walked);
    }

    let snapshot = handle.snapshot();
    println!();
    println!("Friends:");
    for row in snapshot.friends_list() {
        println!("  {:<8} {}", row.identity.display_name, row.status_text);
    }
    println!("Alerts raised: {}", snapshot.alerts_raised);

    handle.shutdown().await?;
    info!("Walk finished");
    Ok(())
}

async fn wait_for_fix(handle: &SessionHandle, at: Coordinate) -> anyhow::Result<()> {
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if rx
                .borrow_and_update()
                .local
                .as_ref()
                .is_some_and(|local| local.coordinate == at)
            {
                return anyhow::Ok(());
            }
            rx.changed().await?;
        }
    })
    .await
    .context("session did not pick up the fix")?
}

fn print_nearest(handle: &SessionHandle, step: u32, walked: f64) {
    let rows = handle.snapshot().friends_list();
    match rows.first() {
        Some(row) if row.distance_meters.is_some() => println!(
            "step {:>2}: {:>5.0}m walked, nearest {} ({})",
            step, walked, row.identity.display_name, row.status_text
        ),
        _ => println!("step {:>2}: {:>5.0}m walked, no friends on the map", step, walked),
    }
}

/// Alice creates a group, Bob joins it with the code
pub async fn group(name: &str) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    seed_friends(&store);
    let auth = Arc::new(StaticAuth::signed_in(AuthUser::new("alice", "alice@example.com")));
    let social = SocialClient::new(auth.clone(), store, Arc::new(ConsoleNotifier));

    let created = social.create_group(name).await?;
    auth.sign_in(AuthUser::new("bob", "bob@example.com"));
    social.join_by_code(&created.code).await?;

    println!("Group {} expires {}", created.code, created.expires_at.format("%H:%M:%S"));
    for member in social.members(&created.id).await? {
        println!("  {} joined {}", member.user_id, member.joined_at.format("%H:%M:%S"));
    }
    Ok(())
}
