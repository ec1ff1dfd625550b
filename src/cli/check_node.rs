use super::services::{load_config, open_store};
use chrono::{DateTime, Utc};
use nodegate::gatekeeper::{validate_node_id, Windows};
use nodegate::store::NodeRecord;

/// Print the latest record for a node and how it fares under both windows
///
/// Read-only: nothing is linked or changed.
pub async fn execute(
    node_id: String,
    config: Option<String>,
    store_key_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let node_id = validate_node_id(&node_id)?.to_string();
    let (config_path, config) = load_config(config)?;
    let store = open_store(&config_path, &config, store_key_file).await?;

    match store.latest_for_node(&node_id).await? {
        Some(record) => {
            let windows = config.gate_settings().windows;
            println!("{}", describe(&record, windows, Utc::now()));
        }
        None => println!("❌ No records for node {}", node_id),
    }

    Ok(())
}

fn describe(record: &NodeRecord, windows: Windows, now: DateTime<Utc>) -> String {
    let verdict = |window| {
        if record.is_fresh(now, window) {
            "✅ fresh"
        } else {
            "❌ stale"
        }
    };
    let age = (now - record.timestamp)
        .to_std()
        .map(|age| {
            humantime::format_duration(std::time::Duration::from_secs(age.as_secs())).to_string()
        })
        .unwrap_or_else(|_| "in the future".to_string());

    let mut lines = vec![
        format!("Node:         {}", record.node_id),
        format!("Last seen:    {} ({} ago)", record.timestamp.to_rfc3339(), age),
        format!(
            "Linked user:  {}",
            record.discord_user_id.as_deref().unwrap_or("(none)")
        ),
    ];
    if let Some(version) = &record.version {
        lines.push(format!("Version:      {}", version));
    }
    if let Some(peers) = record.peer_count {
        lines.push(format!("Peers:        {}", peers));
    }
    lines.push(format!(
        "Verification: {} (window {})",
        verdict(windows.verification),
        humantime::format_duration(windows.verification)
    ));
    lines.push(format!(
        "Activity:     {} (window {})",
        verdict(windows.activity),
        humantime::format_duration(windows.activity)
    ));
    lines.join("\n")
}
