//! `config show` / `config set`: raw access to the workflow config file.

use clap::Args;
use serde_json::Value;

use swarm_core::SWARM_CONFIG_REL;

use crate::context::AppContext;
use crate::failure::Failure;

#[derive(Debug, Args)]
pub struct ConfigSetOpts {
    /// Dotted key path, e.g. tasks.verify.required_tags
    pub key: String,
    /// New value (a raw string unless --json)
    pub value: String,
    /// Parse the value as JSON
    #[arg(long)]
    pub json: bool,
}

fn config_path(ctx: &AppContext) -> std::path::PathBuf {
    ctx.repo.root.join(SWARM_CONFIG_REL)
}

fn load_raw_config(ctx: &AppContext) -> Result<Value, Failure> {
    let path = config_path(ctx);
    let body = std::fs::read_to_string(&path)
        .map_err(|err| Failure::msg(format!("failed to read {}: {err}", path.display())))?;
    serde_json::from_str(&body)
        .map_err(|err| Failure::msg(format!("Invalid JSON in {}: {err}", path.display())))
}

pub fn cmd_config_show(ctx: &AppContext) -> Result<(), Failure> {
    let data = load_raw_config(ctx)?;
    let output = serde_json::to_string_pretty(&data).map_err(|err| Failure::msg(err.to_string()))?;
    println!("{output}");
    Ok(())
}

pub fn parse_config_key_path(raw: &str) -> Result<Vec<String>, Failure> {
    let parts: Vec<String> = raw
        .split('.')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    if parts.is_empty() {
        return Err(Failure::policy(
            "Config key path must be non-empty (example: tasks.verify.required_tags)",
        ));
    }
    Ok(parts)
}

pub fn set_config_value(data: &mut Value, path: &[String], value: Value) -> Result<(), Failure> {
    let conflict = |key: &str| {
        Failure::policy(format!(
            "Config path conflict: {} (segment '{key}' is not an object)",
            path.join(".")
        ))
    };
    let mut target = data;
    for key in &path[..path.len() - 1] {
        let map = target.as_object_mut().ok_or_else(|| conflict(key))?;
        let entry = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Default::default()));
        if !entry.is_object() {
            return Err(conflict(key));
        }
        target = entry;
    }
    let last = path.last().expect("non-empty path");
    let map = target.as_object_mut().ok_or_else(|| conflict(last))?;
    map.insert(last.clone(), value);
    Ok(())
}

pub fn cmd_config_set(ctx: &AppContext, opts: &ConfigSetOpts) -> Result<(), Failure> {
    let mut data = load_raw_config(ctx)?;
    let path = parse_config_key_path(&opts.key)?;
    let value = if opts.json {
        serde_json::from_str(&opts.value)
            .map_err(|err| Failure::policy(format!("Invalid JSON for --json value: {err}")))?
    } else {
        Value::String(opts.value.clone())
    };
    set_config_value(&mut data, &path, value)?;
    let body = serde_json::to_string_pretty(&data).map_err(|err| Failure::msg(err.to_string()))?;
    let target = config_path(ctx);
    std::fs::write(&target, body + "\n").map_err(|err| Failure::msg(err.to_string()))?;
    println!("✅ updated {} ({})", target.display(), path.join("."));
    Ok(())
}

/// `quickstart`: the usage crib sheet, overridable via the configured
/// docs file.
pub fn cmd_quickstart(ctx: &AppContext) -> Result<(), Failure> {
    if ctx.paths.docs_path.exists() {
        let text = std::fs::read_to_string(&ctx.paths.docs_path)
            .map_err(|err| Failure::msg(err.to_string()))?;
        println!("{}", text.trim_end());
        return Ok(());
    }
    let docs_rel = ctx
        .paths
        .docs_path
        .strip_prefix(&ctx.repo.root)
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|_| ctx.paths.docs_path.display().to_string());
    println!(
        "agentctl quickstart\n\
         \n\
         This repo uses agentctl to manage the task snapshot safely (no manual edits).\n\
         \n\
         Common commands:\n\
         \x20 agentctl task list\n\
         \x20 agentctl task show <task-id>\n\
         \x20 agentctl task lint\n\
         \x20 agentctl ready <task-id>\n\
         \x20 agentctl start <task-id> --author CODER --body \"Start: ...\"\n\
         \x20 agentctl verify <task-id>\n\
         \x20 agentctl guard commit <task-id> -m \"✨ <task-id> ...\" --allow <path-prefix>\n\
         \x20 agentctl finish <task-id> --commit <git-rev> --author REVIEWER --body \"Verified: ...\"\n\
         \n\
         Tip: create {docs_rel} to override this output."
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_paths_split_on_dots() {
        assert_eq!(
            parse_config_key_path("tasks.verify.required_tags").unwrap(),
            vec!["tasks", "verify", "required_tags"]
        );
        assert!(parse_config_key_path(" . . ").is_err());
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut data = json!({ "schema_version": 1 });
        set_config_value(
            &mut data,
            &[
                "tasks".to_string(),
                "doc".to_string(),
                "sections".to_string(),
            ],
            json!(["Summary"]),
        )
        .unwrap();
        assert_eq!(data["tasks"]["doc"]["sections"], json!(["Summary"]));
    }

    #[test]
    fn set_rejects_scalar_segments() {
        let mut data = json!({ "tasks": 7 });
        let err = set_config_value(
            &mut data,
            &["tasks".to_string(), "doc".to_string()],
            json!(1),
        )
        .expect_err("scalar in the way");
        assert!(err.message.contains("Config path conflict"));
    }
}
