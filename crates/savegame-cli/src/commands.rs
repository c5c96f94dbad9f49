use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use savegame_archive::{PropertyValue, SAVEGAME_VERSION_ID};
use savegame_core::{SaveGameSettings, SnapshotSummary};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Inspect(args) => cmd_inspect(args, format),
        Command::Export(args) => cmd_export(args),
        Command::Versions(args) => cmd_versions(args, format),
        Command::CheckConfig(args) => cmd_check_config(args, format),
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<SnapshotSummary> {
    let blob = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    debug!(path = %path.display(), bytes = blob.len(), "read snapshot file");
    SnapshotSummary::decode(&blob).with_context(|| format!("decoding {}", path.display()))
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let summary = read_snapshot(&args.file)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print!("{}", render_summary(&summary, args.properties)),
    }
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let summary = read_snapshot(&args.file)?;
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            println!(
                "{} Exported {} objects to {}",
                "✓".green().bold(),
                summary.objects.len(),
                path.display().to_string().bold()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_versions(args: VersionsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let summary = read_snapshot(&args.file)?;
    let names = match &args.settings {
        Some(path) => version_names(&SaveGameSettings::load(path)?),
        None => version_names(&SaveGameSettings::default()),
    };

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = summary
                .versions
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "id": v.id,
                        "tag": names.get(&v.id.to_string()),
                        "version": v.version,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => print!("{}", render_versions(&summary, &names)),
    }
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let settings = SaveGameSettings::load(&args.path)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        OutputFormat::Text => {
            println!("{} {} is valid", "✓".green().bold(), args.path.display());
            println!("  Compression level: {}", settings.compression_level);
            println!("  Text snapshot: {}", yes_no(settings.write_text_snapshot));
            println!("  Strict resolution: {}", yes_no(settings.strict_object_resolution));
            for info in &settings.versions {
                println!(
                    "  Version {} = {} ({})",
                    info.tag.bold(),
                    info.latest,
                    info.resolved_id().to_string().dimmed()
                );
            }
            for r in &settings.field_redirects {
                println!("  Rename {}.{} → {}", r.type_name, r.old_name.yellow(), r.new_name.green());
            }
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Tag names by version id, including the snapshot format's own tag.
fn version_names(settings: &SaveGameSettings) -> HashMap<String, String> {
    let mut names: HashMap<String, String> = settings
        .versions
        .iter()
        .map(|info| (info.resolved_id().to_string(), info.tag.clone()))
        .collect();
    names.insert(SAVEGAME_VERSION_ID.to_string(), "SaveGame".into());
    names
}

fn short_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Bool(b) => b.to_string(),
        PropertyValue::Int(i) => i.to_string(),
        PropertyValue::Float(f) => f.to_string(),
        PropertyValue::Str(s) => format!("{s:?}"),
        PropertyValue::Name(n) => n.clone(),
        PropertyValue::Vector([x, y, z]) => format!("({x}, {y}, {z})"),
        PropertyValue::Object(r) if r.is_null() => "None".into(),
        PropertyValue::Object(r) => r.path.to_string(),
        PropertyValue::Array(items) => format!("[{} items]", items.len()),
        PropertyValue::Struct(fields) => format!("{{{} fields}}", fields.len()),
    }
}

fn render_summary(summary: &SnapshotSummary, with_properties: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Map: {}", summary.map.bold());
    let _ = writeln!(
        out,
        "Size: {} bytes, versions at {}",
        summary.uncompressed_size, summary.versions_offset
    );

    let _ = writeln!(out, "\nObjects ({}):", summary.objects.len());
    for entry in &summary.objects {
        let origin = match &entry.class {
            Some(class) => format!("spawned {}", class).cyan().to_string(),
            None => "level".dimmed().to_string(),
        };
        let _ = write!(out, "  {} [{}] {} bytes", entry.name.yellow(), origin, entry.data_size);
        if let Some(id) = &entry.spawn_id {
            let _ = write!(out, " id {}", id);
        }
        out.push('\n');
        if with_properties {
            for (name, value) in &entry.properties {
                let _ = writeln!(out, "    {} = {}", name, short_value(value));
            }
            for name in &entry.custom_fields {
                let _ = writeln!(out, "    {} (custom)", name);
            }
        }
    }

    let _ = writeln!(out, "\nDestroyed ({}):", summary.destroyed.len());
    for name in &summary.destroyed {
        let _ = writeln!(out, "  {}", name.red());
    }
    out
}

fn render_versions(summary: &SnapshotSummary, names: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for v in &summary.versions {
        let id = v.id.to_string();
        let tag = names.get(&id).map(String::as_str).unwrap_or("?");
        let _ = writeln!(out, "{}  {:<16} {}", id.dimmed(), tag.bold(), v.version);
    }
    out
}
