//! Command implementations for the forge admin CLI.
//!
//! Each command returns `Ok(())` for exit code 0 and an error message for
//! exit code 1; `main` owns the process exit. Output is plain text tables,
//! matching what an operator expects from a local admin tool.

use std::path::{Path, PathBuf};

use forge::dbadmin::StoreAdmin;

/// Builds the admin over the current working directory and config.
pub fn admin(base_dir: &Path) -> StoreAdmin {
    let settings = config::ConfigHandle::from_default_location().current();
    StoreAdmin::new(base_dir, &settings)
}

pub fn cmd_list(admin: &StoreAdmin) -> Result<(), String> {
    let stores = admin.discover();
    if stores.is_empty() {
        println!("no persisted stores found");
        return Ok(());
    }
    println!("{:<24} {:<18} {:<10} {:<9} path", "name", "type", "size", "records");
    for store in stores {
        println!(
            "{:<24} {:<18} {:<10} {:<9} {}",
            store.name,
            store.kind.as_str(),
            StoreAdmin::format_size(store.size_bytes),
            store
                .record_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            store.path.display()
        );
    }
    Ok(())
}

pub fn cmd_stats(admin: &StoreAdmin) -> Result<(), String> {
    let stats = admin.statistics();
    println!("stores:  {}", stats["total_stores"]);
    println!("size:    {}", stats["total_size_formatted"].as_str().unwrap_or("-"));
    println!("records: {}", stats["total_records"]);
    Ok(())
}

pub fn cmd_backup(
    admin: &StoreAdmin,
    all: bool,
    database: Option<&str>,
    name: Option<&str>,
) -> Result<(), String> {
    if all {
        let results = admin.backup_all();
        if results.is_empty() {
            println!("no persisted stores found");
            return Ok(());
        }
        let mut failed = 0;
        for (store, result) in results {
            match result {
                Ok(path) => println!("{}: {}", store, path.display()),
                Err(e) => {
                    eprintln!("{}: {}", store, e);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(format!("{} backups failed", failed));
        }
        return Ok(());
    }
    let database = database.ok_or("specify a database name or use --all")?;
    let path = admin.backup(database, name).map_err(|e| e.to_string())?;
    println!("backup created: {}", path.display());
    Ok(())
}

pub fn cmd_restore(
    admin: &StoreAdmin,
    backup: &Path,
    database: Option<&str>,
) -> Result<(), String> {
    admin.restore(backup, database).map_err(|e| e.to_string())?;
    println!("restored from {}", backup.display());
    Ok(())
}

pub fn cmd_cleanup(admin: &StoreAdmin, days: i64, execute: bool) -> Result<(), String> {
    let plan = admin
        .cleanup_conversations(days, execute)
        .map_err(|e| e.to_string())?;
    if plan.dry_run {
        println!(
            "dry run: {} conversations older than {} days would be deleted (use --execute)",
            plan.candidates.len(),
            days
        );
        for name in &plan.candidates {
            println!("  {}", name);
        }
    } else {
        println!("deleted {} conversations older than {} days", plan.deleted, days);
    }
    Ok(())
}

/// Resolves the base directory for store discovery (cwd unless overridden).
pub fn base_dir(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_admin(base: &Path) -> StoreAdmin {
        let settings = config::Settings::default();
        let conversations = base.join("output").join("conversations");
        std::fs::create_dir_all(&conversations).unwrap();
        std::fs::write(conversations.join("c1.json"), "{}").unwrap();
        StoreAdmin::new(base, &settings)
    }

    #[test]
    fn list_and_stats_succeed_on_seeded_dir() {
        let dir = tempfile::tempdir().unwrap();
        let admin = seeded_admin(dir.path());
        assert!(cmd_list(&admin).is_ok());
        assert!(cmd_stats(&admin).is_ok());
    }

    #[test]
    fn backup_requires_target_or_all() {
        let dir = tempfile::tempdir().unwrap();
        let admin = seeded_admin(dir.path());
        assert!(cmd_backup(&admin, false, None, None).is_err());
        assert!(cmd_backup(&admin, false, Some("conversations"), None).is_ok());
    }

    #[test]
    fn cleanup_defaults_to_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let admin = seeded_admin(dir.path());
        assert!(cmd_cleanup(&admin, 0, false).is_ok());
        assert!(dir.path().join("output/conversations/c1.json").exists());
        assert!(cmd_cleanup(&admin, 0, true).is_ok());
        assert!(!dir.path().join("output/conversations/c1.json").exists());
    }

    #[test]
    fn restore_unknown_backup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let admin = seeded_admin(dir.path());
        assert!(cmd_restore(&admin, Path::new("/nope"), None).is_err());
    }
}
