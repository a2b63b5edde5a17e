// System status display: DB stats, configured tenants, recent enforcements.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;
use crate::output::terminal;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display_path: &str) -> Result<()> {
    if !Path::new(db_display_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `sentinel init` to set up the database.");
        return Ok(());
    }

    // Database file size
    let file_size = std::fs::metadata(db_display_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);

    let tenants = db.tenant_ids().await?;
    if tenants.is_empty() {
        println!("Tenants: none configured yet");
        println!("  Policies are created on the first event for a tenant");
    } else {
        println!("Tenants: {}", tenants.len());
        for tenant in tenants.iter().take(10) {
            println!("  {tenant}");
        }
        if tenants.len() > 10 {
            println!("  ... and {} more", tenants.len() - 10);
        }
    }

    let recent = db.recent_enforcements(None, 10).await?;
    terminal::display_enforcements(&recent);

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
