//! CLI commands implementation

use anyhow::{Context, Result};
use gpushare_core::{detect_gpus, DecisionView};
use gpushare_scheduler::{DecisionBuilder, JobRegistry};
use gpushare_store::{render_decision, DecisionFile};
use gpushare_watcher::Snapshot;
use std::collections::BTreeSet;
use std::path::Path;

/// Print a published decision file
pub async fn show(path: &Path) -> Result<()> {
    let file = DecisionFile::new(path.to_path_buf());
    match file.read().await? {
        Some(view) => {
            for line in format_decision(&view) {
                println!("{}", line);
            }
        }
        None => eprintln!("No decision published at {}", path.display()),
    }
    Ok(())
}

/// Dry-run the allocator against a snapshot file
pub async fn plan(snapshot_path: &Path, table: bool) -> Result<()> {
    let snapshot = Snapshot::from_file(snapshot_path)
        .await
        .with_context(|| format!("failed to load snapshot {}", snapshot_path.display()))?;
    let view = plan_snapshot(snapshot);

    if table {
        for line in format_decision(&view) {
            println!("{}", line);
        }
    } else {
        println!("{}", render_decision(&view)?);
    }
    Ok(())
}

/// Show GPU information
pub fn gpus() {
    let gpu_info = detect_gpus();
    println!("GPUs: {} detected", gpu_info.count());

    if !gpu_info.devices.is_empty() {
        println!();
        for device in &gpu_info.devices {
            let sm = device
                .utilization
                .map(|u| format!("{}%", u))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] {} - {}MB total - mem {:.1}% - sm {}",
                device.index,
                device.name,
                device.memory_total_mb(),
                device.memory_utilization(),
                sm
            );
        }
    }
}

/// Decision a fresh coordinator would publish for a snapshot
pub fn plan_snapshot(snapshot: Snapshot) -> DecisionView {
    let mut registry = JobRegistry::new();
    registry.update(snapshot.jobs, snapshot.gpus);
    DecisionBuilder::default().build(&registry)
}

/// Render a decision as a per-GPU table
pub fn format_decision(view: &DecisionView) -> Vec<String> {
    let mut lines = vec![format!(
        "Version: {} ({} jobs)",
        view.version,
        view.len()
    )];

    let devices: BTreeSet<u32> = view
        .per_gpu_allocation
        .values()
        .map(|a| a.host_device_index)
        .collect();

    for device in devices {
        lines.push(String::new());
        lines.push(format!(
            "GPU {} - {}MB granted",
            device,
            view.granted_on(device)
        ));
        lines.push(format!("  {:<40} {:<10} {:>12}", "JOB", "PRIORITY", "LIMIT (MB)"));
        for (name, allocation) in view.on_device(device) {
            lines.push(format!(
                "  {:<40} {:<10} {:>12}",
                name,
                allocation.priority.to_string(),
                allocation.max_device_mem_mb
            ));
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "gpus": [
            { "index": 0, "total_memory_mb": 8000 },
            { "index": 1, "total_memory_mb": 16000 }
        ],
        "jobs": [
            { "name": "train", "priority": 0, "device_index": 0, "required_memory_mb": 6000 },
            { "name": "notebook", "priority": 1, "device_index": 0, "required_memory_mb": 4000 },
            { "name": "serve", "priority": 1, "device_index": 1, "required_memory_mb": 4000 },
            { "name": "stray", "priority": 1, "device_index": 5, "required_memory_mb": 1000 }
        ]
    }"#;

    #[test]
    fn test_plan_snapshot() {
        let view = plan_snapshot(Snapshot::from_json(SNAPSHOT).unwrap());

        assert_eq!(view.len(), 3);
        assert_eq!(view.get("train").unwrap().max_device_mem_mb, 6000);
        assert_eq!(view.get("notebook").unwrap().max_device_mem_mb, 2000);
        assert_eq!(view.get("serve").unwrap().max_device_mem_mb, 4000);
        assert_eq!(view.get("serve").unwrap().host_device_index, 1);
        assert!(view.get("stray").is_none());
    }

    #[test]
    fn test_format_decision() {
        let view = plan_snapshot(Snapshot::from_json(SNAPSHOT).unwrap());
        let lines = format_decision(&view);

        assert!(lines[0].ends_with("(3 jobs)"));
        assert!(lines.contains(&"GPU 0 - 8000MB granted".to_string()));
        assert!(lines.contains(&"GPU 1 - 4000MB granted".to_string()));
        assert!(lines
            .iter()
            .any(|l| l.contains("notebook") && l.contains("low") && l.ends_with("2000")));
    }

    #[test]
    fn test_format_empty_decision() {
        let lines = format_decision(&DecisionView::new(7));
        assert_eq!(lines, vec!["Version: 7 (0 jobs)".to_string()]);
    }

    #[tokio::test]
    async fn test_show_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(show(&dir.path().join("gpu_config.json")).await.is_ok());
    }
}
